//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → NetworkConfig (validated, immutable)
//!     → handed by value to Network::new, split per component
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new Network is needed to change it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::HttpConfig;
pub use schema::NetworkConfig;
pub use schema::ObservabilityConfig;
pub use schema::TcpConfig;
