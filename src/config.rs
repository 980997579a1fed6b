use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happens to inference variables still unbound once an expression is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeTypeVarBindingPolicy {
    /// Report the expression as ambiguous and give it the error type.
    #[default]
    BindToErrorType,
    /// Leave the variables free for an enclosing context to bind.
    KeepFree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the module the input files are parsed into.
    pub module_name: String,
    pub free_var_binding_policy: FreeTypeVarBindingPolicy,
    /// Report `return;` in functions whose return type is not unit. Off unless asked for.
    pub diagnose_missing_return_values: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            module_name: String::from("main"),
            free_var_binding_policy: FreeTypeVarBindingPolicy::default(),
            diagnose_missing_return_values: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    /// Loads a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Config::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Config, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}
