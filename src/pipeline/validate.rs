//! Per-circuit input validation
//!
//! Malformed inputs are rejected before they reach admission, the cache,
//! or a worker. Circuits without a registered schema only require a JSON
//! object; the registry rejects unknown circuit names separately.

use std::collections::HashMap;

use jsonschema::JSONSchema;
use serde_json::json;

use crate::infra::{PipelineError, Result};

/// Compiled input schemas keyed by circuit name.
pub struct InputValidator {
    schemas: HashMap<&'static str, JSONSchema>,
}

impl InputValidator {
    pub fn new() -> Self {
        let mut schemas = HashMap::new();

        let eligibility = json!({
            "type": "object",
            "properties": {
                "country": {"type": "string", "minLength": 2, "maxLength": 2},
                "dob": {"type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$"},
                "residency": {"type": "string", "minLength": 1}
            },
            "required": ["country", "dob", "residency"],
            "additionalProperties": false
        });

        let voice = json!({
            "type": "object",
            "properties": {
                "election_id": {"type": "integer", "minimum": 0},
                "option": {"type": "integer", "minimum": 0},
                "credits": {"type": "integer", "minimum": 1, "maximum": 10000}
            },
            "required": ["election_id", "option", "credits"],
            "additionalProperties": false
        });

        let batch_tally = json!({
            "type": "object",
            "properties": {
                "election_id": {"type": "integer", "minimum": 0},
                "vote_counts": {
                    "type": "array",
                    "items": {"type": "integer", "minimum": 0},
                    "minItems": 1
                },
                "credit_sqrts": {
                    "type": "array",
                    "items": {"type": "integer", "minimum": 0},
                    "minItems": 1
                }
            },
            "required": ["election_id", "vote_counts", "credit_sqrts"],
            "additionalProperties": false
        });

        for (name, schema) in [
            ("eligibility", eligibility),
            ("voice", voice),
            ("batch_tally", batch_tally),
        ] {
            let compiled = JSONSchema::compile(&schema).expect("static schema compiles");
            schemas.insert(name, compiled);
        }

        Self { schemas }
    }

    /// Validate inputs for a circuit, surfacing the first violation.
    pub fn validate(&self, circuit: &str, inputs: &serde_json::Value) -> Result<()> {
        if !inputs.is_object() {
            return Err(PipelineError::MalformedInput(
                "inputs must be a JSON object".into(),
            ));
        }

        if let Some(schema) = self.schemas.get(circuit) {
            if let Err(mut errors) = schema.validate(inputs) {
                let first = errors
                    .next()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "schema validation failed".into());
                return Err(PipelineError::MalformedInput(first));
            }
        }

        Ok(())
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}
