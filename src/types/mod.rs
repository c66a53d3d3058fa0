// ABOUTME: Validated domain types for deployment requests.
// ABOUTME: Environments, semantic versions, and service names are checked on construction.

mod environment;
mod service_name;
mod version;

pub use environment::{Environment, EnvironmentError};
pub use service_name::{ServiceName, ServiceNameError};
pub use version::{Version, VersionError};
