//! Argument and flag declarations for invowkfile commands.

use serde::{Deserialize, Serialize};

/// Value type of an argument or flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    String,
    Int,
    Float,
    Bool,
    Enum,
}

impl ValueType {
    /// Check a raw token against this type. `choices` applies to enums and
    /// to any declaration that lists explicit values.
    pub fn check(&self, raw: &str, choices: &[String]) -> Result<(), String> {
        match self {
            ValueType::String => {}
            ValueType::Int => {
                raw.parse::<i64>()
                    .map_err(|_| format!("expected an integer, got '{raw}'"))?;
            }
            ValueType::Float => {
                raw.parse::<f64>()
                    .map_err(|_| format!("expected a number, got '{raw}'"))?;
            }
            ValueType::Bool => {
                if !matches!(raw, "true" | "false" | "1" | "0" | "yes" | "no") {
                    return Err(format!("expected a boolean, got '{raw}'"));
                }
            }
            ValueType::Enum => {
                if choices.is_empty() {
                    return Err("enum declaration has no values".to_string());
                }
            }
        }
        if !choices.is_empty() && !choices.iter().any(|c| c == raw) {
            return Err(format!(
                "expected one of [{}], got '{raw}'",
                choices.join(", ")
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::Enum => "enum",
        };
        write!(f, "{s}")
    }
}

/// A declared positional argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub default: Option<String>,
    /// Allowed values (enum declarations; optional otherwise).
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A declared flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagSpec {
    pub name: String,
    #[serde(default)]
    pub short: Option<char>,
    #[serde(default, rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub default: Option<String>,
    /// Allowed values (choices).
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}
