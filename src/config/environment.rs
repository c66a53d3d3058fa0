// ABOUTME: Per-environment overrides in the deployment descriptor.
// ABOUTME: Names the environment's descriptor file and overrides commands, variables, and probes.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{EnvValue, HealthConfig};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvironmentConfig {
    /// Deployment descriptor (manifest, values file, ...) that must exist before deploying.
    #[serde(default)]
    pub descriptor: Option<PathBuf>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub deploy: Option<String>,

    #[serde(default)]
    pub rollback: Option<String>,

    #[serde(default)]
    pub health: Option<HealthConfig>,

    #[serde(default)]
    pub post_deploy: Option<Vec<String>>,
}
