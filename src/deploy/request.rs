// ABOUTME: A validated request to deploy one version to one environment.
// ABOUTME: Environment and version are checked on construction; the request is immutable afterwards.

use serde::Serialize;

use crate::error::Result;
use crate::types::{Environment, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeploymentRequest {
    environment: Environment,
    version: Version,
    dry_run: bool,
    debug: bool,
}

impl DeploymentRequest {
    pub fn new(environment: Environment, version: Version) -> Self {
        Self {
            environment,
            version,
            dry_run: false,
            debug: false,
        }
    }

    /// Parse raw invocation arguments. Failures classify as invalid arguments.
    pub fn parse(environment: &str, version: &str) -> Result<Self> {
        let environment: Environment = environment.parse()?;
        let version = Version::parse(version)?;
        Ok(Self::new(environment, version))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn debug(&self) -> bool {
        self.debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_valid_arguments() {
        let request = DeploymentRequest::parse("staging", "v2.0.0")
            .unwrap()
            .with_dry_run(true);
        assert_eq!(request.environment(), Environment::Staging);
        assert_eq!(request.version(), Version::new(2, 0, 0));
        assert!(request.dry_run());
        assert!(!request.debug());
    }

    #[test]
    fn bad_version_is_invalid_arguments() {
        let err = DeploymentRequest::parse("dev", "1.2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }

    #[test]
    fn unknown_environment_is_invalid_arguments() {
        let err = DeploymentRequest::parse("qa", "v1.0.0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
    }
}
