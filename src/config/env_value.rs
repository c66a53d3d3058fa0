// ABOUTME: Values exported to step commands, either literal or read from the environment.
// ABOUTME: Environment references may carry a default used when the variable is unset.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        env: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve against an arbitrary variable lookup.
    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        match self {
            EnvValue::Literal(value) => Ok(value.clone()),
            EnvValue::FromEnv { env, default } => lookup(env)
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(env.clone())),
        }
    }
}

/// Resolve every value, failing on the first unset variable without a default.
pub fn resolve_env_map(values: &HashMap<String, EnvValue>) -> Result<HashMap<String, String>> {
    values
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.resolve()?)))
        .collect()
}
