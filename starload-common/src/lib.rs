//! # starload common library
//!
//! Shared code for the warehouse loading workflow:
//! - Warehouse client trait and its Postgres/Redshift and SQLite backends
//! - Connection and credential providers injected into tasks
//! - Configuration file resolution and loading
//! - Validated SQL identifiers

pub mod config;
pub mod connections;
pub mod credentials;
pub mod error;
pub mod ident;
pub mod warehouse;

pub use connections::{ConnectionProvider, ConnectionRegistry};
pub use credentials::{AccessKeyPair, CredentialProvider, CredentialStore};
pub use error::{Error, Result};
pub use ident::Identifier;
pub use warehouse::{Dialect, Warehouse};
