//! Feature schema: validation of raw records into model-ready vectors.
//!
//! The schema's feature order is the model artifact's order and is used
//! everywhere a canonical order matters (scoring input, CSV template,
//! attribution tie-breaks).

use crate::error::SchemaError;
use crate::models::loader::{FeatureSpec, LoadedModel};
use crate::types::record::{FeatureVector, RangeWarning, RawRecord, RawValue};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Catalogue entry for one feature
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeatureInfo {
    pub name: String,
    /// Neutral default (the reference value)
    pub default: f64,
    pub min: f64,
    pub max: f64,
}

/// Fixed set of required features, in canonical order.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    names: Arc<[String]>,
    specs: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn new(specs: Vec<FeatureSpec>) -> Self {
        let names: Arc<[String]> = specs.iter().map(|s| s.name.clone()).collect();
        Self { names, specs }
    }

    pub fn from_model(model: &LoadedModel) -> Self {
        Self::new(model.features.clone())
    }

    /// Validate a raw record.
    ///
    /// Unknown keys are ignored. Values outside the expected range are kept
    /// as-is and reported as warnings on the vector.
    pub fn validate(&self, raw: &RawRecord) -> Result<FeatureVector, SchemaError> {
        let mut values = Vec::with_capacity(self.specs.len());
        let mut warnings = Vec::new();

        for spec in &self.specs {
            let raw_value = raw.get(&spec.name).ok_or_else(|| SchemaError::MissingFeature {
                feature: spec.name.clone(),
            })?;
            let value = parse_value(&spec.name, raw_value)?;

            if value < spec.min || value > spec.max {
                debug!(
                    feature = %spec.name,
                    value,
                    min = spec.min,
                    max = spec.max,
                    "Value outside expected range, passing through"
                );
                warnings.push(RangeWarning {
                    feature: spec.name.clone(),
                    value,
                    min: spec.min,
                    max: spec.max,
                });
            }
            values.push(value);
        }

        Ok(FeatureVector::new(self.names.clone(), values, warnings))
    }

    /// Get the number of required features.
    pub fn feature_count(&self) -> usize {
        self.specs.len()
    }

    /// Feature names in canonical order.
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Reference values in canonical order
    pub fn reference(&self) -> Vec<f64> {
        self.specs.iter().map(|s| s.reference).collect()
    }

    /// Catalogue of features with defaults and expected ranges
    pub fn catalogue(&self) -> Vec<FeatureInfo> {
        self.specs
            .iter()
            .map(|s| FeatureInfo {
                name: s.name.clone(),
                default: s.reference,
                min: s.min,
                max: s.max,
            })
            .collect()
    }

    /// Header-only CSV listing the required columns in canonical order.
    pub fn csv_template(&self) -> anyhow::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.names.iter())?;
        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV header: {}", e))?;
        Ok(String::from_utf8(bytes)?)
    }
}

fn parse_value(feature: &str, raw: &RawValue) -> Result<f64, SchemaError> {
    let invalid = || SchemaError::InvalidValue {
        feature: feature.to_string(),
        value: raw.to_string(),
    };

    let value = match raw {
        RawValue::Number(v) => *v,
        RawValue::Text(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        RawValue::Null | RawValue::Other(_) => return Err(invalid()),
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelLoader;

    fn schema() -> FeatureSchema {
        FeatureSchema::from_model(&ModelLoader::new().load_bundled().unwrap())
    }

    fn full_record() -> RawRecord {
        [
            ("Borrowing dependency", 0.9),
            ("Liability to Equity", 0.85),
            ("Continuous interest rate (after tax)", 0.1),
            ("Net worth/Assets", 0.05),
            ("Persistent EPS in the Last Four Seasons", 0.05),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_valid_record_in_canonical_order() {
        let vector = schema().validate(&full_record()).unwrap();

        assert_eq!(vector.len(), 5);
        assert_eq!(vector.names()[0], "Borrowing dependency");
        assert_eq!(vector.values()[0], 0.9);
        assert_eq!(vector.get("Liability to Equity"), Some(0.85));
        assert!(vector.warnings().is_empty());
    }

    #[test]
    fn test_missing_feature() {
        let mut record = full_record();
        record.remove("Net worth/Assets");

        let err = schema().validate(&record).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingFeature {
                feature: "Net worth/Assets".into()
            }
        );
    }

    #[test]
    fn test_non_numeric_values_rejected() {
        for bad in [
            RawValue::Text("abc".into()),
            RawValue::Text("".into()),
            RawValue::Text("NaN".into()),
            RawValue::Text("inf".into()),
            RawValue::Null,
            RawValue::Other("true".into()),
            RawValue::Number(f64::INFINITY),
        ] {
            let record = full_record().with("Liability to Equity", bad.clone());
            let err = schema().validate(&record).unwrap_err();
            assert!(
                matches!(&err, SchemaError::InvalidValue { feature, .. } if feature == "Liability to Equity"),
                "{:?} should be invalid, got {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_text_values_are_trimmed_and_parsed() {
        let record = full_record().with("Borrowing dependency", " 0.42 ");
        let vector = schema().validate(&record).unwrap();
        assert_eq!(vector.get("Borrowing dependency"), Some(0.42));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let record = full_record().with("Company", "Acme Corp");
        assert!(schema().validate(&record).is_ok());
    }

    #[test]
    fn test_out_of_range_passes_with_warning() {
        let record = full_record().with("Liability to Equity", 3.5);
        let vector = schema().validate(&record).unwrap();

        assert_eq!(vector.get("Liability to Equity"), Some(3.5));
        assert_eq!(vector.warnings().len(), 1);
        assert_eq!(vector.warnings()[0].feature, "Liability to Equity");
    }

    #[test]
    fn test_csv_template_matches_schema() {
        let schema = schema();
        let template = schema.csv_template().unwrap();

        let mut reader = csv::Reader::from_reader(template.as_bytes());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, schema.feature_names());
        assert_eq!(reader.records().count(), 0);
    }

    #[test]
    fn test_csv_template_quotes_awkward_names() {
        let spec = |name: &str| FeatureSpec {
            name: name.to_string(),
            reference: 0.5,
            min: 0.0,
            max: 1.0,
        };
        let schema = FeatureSchema::new(vec![spec("Debt, total"), spec("Cash \"free\"")]);

        let template = schema.csv_template().unwrap();
        assert_eq!(template, "\"Debt, total\",\"Cash \"\"free\"\"\"\n");
    }

    #[test]
    fn test_catalogue_uses_reference_defaults() {
        let catalogue = schema().catalogue();
        assert_eq!(catalogue.len(), 5);
        assert_eq!(catalogue[2].name, "Net worth/Assets");
        assert_eq!(catalogue[2].default, 0.8882);
        assert_eq!((catalogue[2].min, catalogue[2].max), (0.0, 1.0));
    }
}
