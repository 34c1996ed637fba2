//! JSON result documents printed on stdout

use clap::ValueEnum;
use helmpeek_core::ChartData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Which chart document a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Default values (`values.yaml`)
    Values,
    /// Chart metadata (`Chart.yaml`)
    Metadata,
}

impl Operation {
    fn key(self) -> &'static str {
        match self {
            Operation::Values => "values",
            Operation::Metadata => "metadata",
        }
    }
}

/// `{"success": true, "<operation>": <document or {}>}`
pub fn success(operation: Operation, data: &ChartData) -> Value {
    let document = match operation {
        Operation::Values => data.values.clone(),
        Operation::Metadata => data.metadata.clone(),
    };

    let mut result = Map::new();
    result.insert("success".to_string(), Value::Bool(true));
    result.insert(
        operation.key().to_string(),
        document.unwrap_or_else(|| Value::Object(Map::new())),
    );
    Value::Object(result)
}

/// `{"success": false, "error": <message>}`
pub fn failure(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

pub fn print(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}
