//! JSON Schema generation for request, result and configuration documents.
//!
//! These schemas document the files `geohis` reads and writes, so callers
//! can validate inputs before submitting them and generate bindings for the
//! results.
//!
//! # Usage
//!
//! ```bash
//! # List available schema types
//! geohis schema --list
//!
//! # Generate schema for a specific type
//! geohis schema AnalysisResult
//!
//! # Generate all schemas
//! geohis schema --all
//! ```

use schemars::schema_for;
use serde_json::Value;
use std::collections::BTreeMap;

pub use crate::coordinator::AnalysisFailure;
pub use crate::frequency_ratio::FrClassEntry;
pub use crate::request::{AnalysisInput, AnalysisRequest, WeightsOverride};
pub use crate::result::{AnalysisResult, CombinedRisk, SusceptibilityScore};
pub use crate::validation::ValidationReport;
pub use geohis_common::{ErrorRecord, StructuredError};
pub use geohis_config::{ConfigSnapshot, EngineConfig};

/// Available schema types with their descriptions.
pub fn available_schemas() -> Vec<(&'static str, &'static str)> {
    vec![
        // Inputs
        ("AnalysisInput", "Input document read by `geohis analyze`"),
        ("AnalysisRequest", "Typed engine request"),
        ("WeightsOverride", "Caller-supplied flood/landslide weights"),
        ("EngineConfig", "Engine configuration file"),
        // Outputs
        ("AnalysisResult", "Complete analysis result"),
        ("SusceptibilityScore", "SI, band and interval of one point"),
        ("CombinedRisk", "Fused flood/landslide band of one point"),
        ("FrClassEntry", "Frequency ratio of one factor class"),
        ("ValidationReport", "AUC, confusion matrix and fold scores"),
        ("ConfigSnapshot", "Configuration provenance"),
        // Errors
        ("ErrorRecord", "Entry of a result's error vector"),
        ("AnalysisFailure", "Terminal analysis failure"),
        ("StructuredError", "Error emitted on stderr"),
    ]
}

/// Generate JSON Schema for a type by name.
///
/// Returns `None` for unknown names.
pub fn generate_schema(type_name: &str) -> Option<Value> {
    let schema = match type_name {
        "AnalysisInput" => schema_for!(AnalysisInput),
        "AnalysisRequest" => schema_for!(AnalysisRequest),
        "WeightsOverride" => schema_for!(WeightsOverride),
        "EngineConfig" => schema_for!(EngineConfig),
        "AnalysisResult" => schema_for!(AnalysisResult),
        "SusceptibilityScore" => schema_for!(SusceptibilityScore),
        "CombinedRisk" => schema_for!(CombinedRisk),
        "FrClassEntry" => schema_for!(FrClassEntry),
        "ValidationReport" => schema_for!(ValidationReport),
        "ConfigSnapshot" => schema_for!(ConfigSnapshot),
        "ErrorRecord" => schema_for!(ErrorRecord),
        "AnalysisFailure" => schema_for!(AnalysisFailure),
        "StructuredError" => schema_for!(StructuredError),
        _ => return None,
    };

    serde_json::to_value(schema).ok()
}

/// Generate all schemas as a map from type name to schema.
pub fn generate_all_schemas() -> BTreeMap<String, Value> {
    available_schemas()
        .into_iter()
        .filter_map(|(name, _)| generate_schema(name).map(|s| (name.to_string(), s)))
        .collect()
}

/// Schema output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaFormat {
    /// Pretty-printed JSON (default)
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

/// Format a schema value for output.
pub fn format_schema(schema: &Value, format: SchemaFormat) -> Result<String, serde_json::Error> {
    match format {
        SchemaFormat::Json => serde_json::to_string_pretty(schema),
        SchemaFormat::JsonCompact => serde_json::to_string(schema),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schemas_generate() {
        for (name, _desc) in available_schemas() {
            assert!(
                generate_schema(name).is_some(),
                "Schema for '{}' should generate",
                name
            );
        }
    }

    #[test]
    fn test_unknown_schema_returns_none() {
        assert!(generate_schema("Plan").is_none());
        assert!(generate_schema("").is_none());
    }

    #[test]
    fn test_result_schema_names_core_fields() {
        let schema = generate_schema("AnalysisResult").unwrap();
        let text = serde_json::to_string(&schema).unwrap();
        for field in ["flood_scores", "landslide_scores", "combined_risk", "config_hash"] {
            assert!(text.contains(field), "missing {}", field);
        }
    }

    #[test]
    fn test_generate_all_schemas() {
        let all = generate_all_schemas();
        assert_eq!(all.len(), available_schemas().len());
        assert!(all.contains_key("EngineConfig"));
    }

    #[test]
    fn test_format_schema() {
        let schema = generate_schema("CombinedRisk").unwrap();
        let pretty = format_schema(&schema, SchemaFormat::Json).unwrap();
        let compact = format_schema(&schema, SchemaFormat::JsonCompact).unwrap();
        assert!(pretty.contains('\n'));
        assert!(!compact.contains('\n'));
    }
}
