pub mod config;
pub mod core;
pub mod errors;

// Re-export commonly used items for convenience
pub use config::{ConfigError, Credentials, FaceCredentials, GatewayConfig};
pub use core::*;
pub use errors::{ErrorKind, GatewayError, GatewayResult, ServiceFailure, Transport};
