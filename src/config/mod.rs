// ABOUTME: Deployment descriptor (shipwright.yml) and process settings.
// ABOUTME: Handles YAML parsing, validation, and per-environment merging.

mod env_value;
mod environment;
mod health;
mod retry;
mod settings;
mod timeouts;

pub use env_value::{EnvValue, resolve_env_map};
pub use environment::EnvironmentConfig;
pub use health::HealthConfig;
pub use retry::RetryConfig;
pub use settings::{
    DEFAULT_LOG_DIR, DEFAULT_PAGER_URL, DEFAULT_STATE_DIR, ENV_CHAT_WEBHOOK, ENV_LOG_DIR,
    ENV_LOG_LEVEL, ENV_METRICS_URL, ENV_PAGER_KEY, ENV_PAGER_URL, ENV_REGISTRY, ENV_STATE_DIR,
    Settings,
};
pub use timeouts::StepTimeouts;

use crate::error::{Error, Result};
use crate::resilience::BreakerConfig;
use crate::types::{Environment, ServiceName};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DESCRIPTOR_FILENAME: &str = "shipwright.yml";
pub const DESCRIPTOR_FILENAME_ALT: &str = "shipwright.yaml";
pub const DESCRIPTOR_FILENAME_DIR: &str = ".shipwright/config.yml";

/// How a service is built, deployed, verified, and rolled back.
#[derive(Debug, Clone, Deserialize)]
pub struct Descriptor {
    #[serde(deserialize_with = "deserialize_service_name")]
    pub service: ServiceName,

    /// Build command. Without one the artifact is assumed to exist already.
    #[serde(default)]
    pub build: Option<String>,

    pub deploy: String,

    /// Command that reapplies a previous version; defaults to `deploy`.
    #[serde(default)]
    pub rollback: Option<String>,

    #[serde(default)]
    pub health: Option<HealthConfig>,

    #[serde(default)]
    pub post_deploy: Vec<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub timeouts: StepTimeouts,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,

    #[serde(default)]
    pub environments: HashMap<Environment, EnvironmentConfig>,
}

impl Descriptor {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let descriptor: Descriptor = serde_yaml::from_str(yaml)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ConfigNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        Self::from_yaml(&content)
    }

    /// First descriptor file present in `dir`, if any.
    pub fn locate(dir: &Path) -> Option<PathBuf> {
        [
            dir.join(DESCRIPTOR_FILENAME),
            dir.join(DESCRIPTOR_FILENAME_ALT),
            dir.join(DESCRIPTOR_FILENAME_DIR),
        ]
        .into_iter()
        .find(|path| path.exists())
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let path = Self::locate(dir).ok_or_else(|| Error::ConfigNotFound(dir.to_path_buf()))?;
        Self::load(&path)
    }

    /// Check values serde cannot express constraints for.
    pub fn validate(&self) -> Result<()> {
        if self.deploy.trim().is_empty() {
            return Err(Error::InvalidConfig("deploy command is empty".to_string()));
        }
        self.retry.validate().map_err(Error::InvalidConfig)?;
        if self.breaker.failure_threshold < 1 {
            return Err(Error::InvalidConfig(
                "breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        let overrides = self
            .environments
            .iter()
            .filter_map(|(env, cfg)| cfg.health.as_ref().map(|h| (Some(*env), h)));
        for (env, health) in self.health.as_ref().map(|h| (None, h)).into_iter().chain(overrides) {
            if health.attempts < 1 {
                let scope = env.map(|e| format!("environments.{e}.")).unwrap_or_default();
                return Err(Error::InvalidConfig(format!(
                    "{scope}health.attempts must be at least 1"
                )));
            }
        }
        Ok(())
    }

    pub fn environment(&self, env: Environment) -> Option<&EnvironmentConfig> {
        self.environments.get(&env)
    }

    /// Descriptor with `env`'s overrides applied.
    ///
    /// Environments must be declared explicitly; an undeclared one is a
    /// configuration error even if it would inherit everything.
    pub fn for_environment(&self, env: Environment) -> Result<Descriptor> {
        let overrides = self
            .environment(env)
            .ok_or(Error::UnknownEnvironment(env))?;

        let mut merged = self.clone();

        for (k, v) in &overrides.env {
            merged.env.insert(k.clone(), v.clone());
        }

        if let Some(deploy) = &overrides.deploy {
            merged.deploy = deploy.clone();
        }

        if overrides.rollback.is_some() {
            merged.rollback = overrides.rollback.clone();
        }

        if overrides.health.is_some() {
            merged.health = overrides.health.clone();
        }

        if let Some(post_deploy) = &overrides.post_deploy {
            merged.post_deploy = post_deploy.clone();
        }

        Ok(merged)
    }

    pub fn rollback_command(&self) -> &str {
        self.rollback.as_deref().unwrap_or(&self.deploy)
    }
}

fn deserialize_service_name<'de, D>(deserializer: D) -> std::result::Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MINIMAL: &str = r#"
service: api
deploy: ./deploy.sh
environments:
  dev: {}
"#;

    #[test]
    fn minimal_descriptor_gets_defaults() {
        let d = Descriptor::from_yaml(MINIMAL).unwrap();
        assert_eq!(d.service.as_str(), "api");
        assert_eq!(d.rollback_command(), "./deploy.sh");
        assert_eq!(d.retry, RetryConfig::default());
        assert_eq!(d.breaker.failure_threshold, 5);
        assert_eq!(d.timeouts.deploy, Duration::from_secs(300));
        assert!(d.health.is_none());
    }

    #[test]
    fn environment_overrides_merge() {
        let yaml = r#"
service: api
deploy: ./deploy.sh
env:
  LOG: info
  REGION: eu
health:
  cmd: curl -fsS localhost/health
  attempts: 3
  interval: 1s
environments:
  staging:
    descriptor: deploy/staging.yml
    env:
      LOG: debug
    health:
      cmd: curl -fsS staging/health
  production:
    post_deploy:
      - ./purge-cache.sh
"#;
        let d = Descriptor::from_yaml(yaml).unwrap();

        let staging = d.for_environment(Environment::Staging).unwrap();
        assert_eq!(staging.env["LOG"], EnvValue::Literal("debug".to_string()));
        assert_eq!(staging.env["REGION"], EnvValue::Literal("eu".to_string()));
        let health = staging.health.unwrap();
        assert_eq!(health.cmd, "curl -fsS staging/health");
        assert_eq!(health.attempts, 10);

        let production = d.for_environment(Environment::Production).unwrap();
        assert_eq!(production.post_deploy, vec!["./purge-cache.sh".to_string()]);
        assert_eq!(production.health.unwrap().attempts, 3);
    }

    #[test]
    fn undeclared_environment_is_rejected() {
        let d = Descriptor::from_yaml(MINIMAL).unwrap();
        let err = d.for_environment(Environment::Production).unwrap_err();
        assert!(matches!(err, Error::UnknownEnvironment(Environment::Production)));
    }

    #[test]
    fn invalid_retry_policy_is_rejected_at_load() {
        let yaml = r#"
service: api
deploy: ./deploy.sh
retry:
  deploy:
    max_attempts: 0
"#;
        let err = Descriptor::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("retry.deploy"));
        assert_eq!(err.kind(), crate::error::ErrorKind::ConfigurationError);
    }

    #[test]
    fn invalid_service_name_is_rejected() {
        let yaml = "service: Not_Valid\ndeploy: ./deploy.sh\n";
        assert!(Descriptor::from_yaml(yaml).is_err());
    }

    #[test]
    fn durations_are_human_readable() {
        let yaml = r#"
service: api
deploy: ./deploy.sh
timeouts:
  build: 2m
breaker:
  recovery_timeout: 90s
retry:
  build:
    initial_delay: 250ms
"#;
        let d = Descriptor::from_yaml(yaml).unwrap();
        assert_eq!(d.timeouts.build, Duration::from_secs(120));
        assert_eq!(d.timeouts.deploy, Duration::from_secs(300));
        assert_eq!(d.breaker.recovery_timeout, Duration::from_secs(90));
        assert_eq!(d.retry.build.initial_delay, Duration::from_millis(250));
    }
}
