//! Sample Portfolio Generator
//!
//! Writes a random CSV portfolio of healthy and distressed companies to
//! stdout for exercising the batch audit endpoint.
//!
//! Usage: sample_portfolio [count] [distress_rate] [blank_rate]

use rand::Rng;
use tracing::info;

const COLUMNS: [&str; 6] = [
    "Company",
    "Borrowing dependency",
    "Continuous interest rate (after tax)",
    "Net worth/Assets",
    "Persistent EPS in the Last Four Seasons",
    "Liability to Equity",
];

/// Company generator
struct CompanyGenerator {
    rng: rand::rngs::ThreadRng,
    company_counter: u64,
}

impl CompanyGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            company_counter: 0,
        }
    }

    fn next_name(&mut self) -> String {
        self.company_counter += 1;
        let suffix = self.random_choice(&["Holdings", "Industries", "Group", "Corp", "Ltd"]);
        format!("Company {:05} {}", self.company_counter, suffix)
    }

    /// Ratios near the training population means
    fn generate_healthy(&mut self) -> Vec<f64> {
        vec![
            self.rng.gen_range(0.33..0.40),
            self.rng.gen_range(0.77..0.79),
            self.rng.gen_range(0.85..0.95),
            self.rng.gen_range(0.21..0.26),
            self.rng.gen_range(0.27..0.29),
        ]
    }

    /// Heavy borrowing, thin equity, weak earnings
    fn generate_distressed(&mut self) -> Vec<f64> {
        vec![
            self.rng.gen_range(0.55..0.95),
            self.rng.gen_range(0.05..0.70),
            self.rng.gen_range(0.01..0.60),
            self.rng.gen_range(0.01..0.15),
            self.rng.gen_range(0.40..0.95),
        ]
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the CSV
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_portfolio=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let count: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let distress_rate: f64 = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.1_f64)
        .clamp(0.0, 1.0);
    let blank_rate: f64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0_f64)
        .clamp(0.0, 1.0);

    info!(count, distress_rate, blank_rate, "Generating portfolio");

    let mut generator = CompanyGenerator::new();
    let mut rng = rand::thread_rng();
    let mut writer = csv::Writer::from_writer(std::io::stdout().lock());
    writer.write_record(COLUMNS)?;

    let mut healthy_count = 0;
    let mut distressed_count = 0;

    for _ in 0..count {
        let ratios = if rng.gen_bool(distress_rate) {
            distressed_count += 1;
            generator.generate_distressed()
        } else {
            healthy_count += 1;
            generator.generate_healthy()
        };

        let mut row: Vec<String> = ratios.iter().map(|v| format!("{:.4}", v)).collect();
        // Blank one cell so the audit reports a row failure
        if rng.gen_bool(blank_rate) {
            let i = rng.gen_range(0..row.len());
            row[i].clear();
        }
        row.insert(0, generator.next_name());
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(
        "Completed! Generated {} companies ({} healthy, {} distressed)",
        count, healthy_count, distressed_count
    );

    Ok(())
}
