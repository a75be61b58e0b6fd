//! mongotune-mongo: MongoDB implementations of the engine's collaborator
//! traits.
//!
//! - [`MongoCommandExecutor`] runs `createIndexes` / `dropIndexes` and
//!   answers collection and index existence checks.
//! - [`MongoMetricsProvider`] reads `serverStatus`, `dbStats`, `collStats`
//!   and `$indexStats`.
//! - [`MongoProbe`] runs validation-step commands and extracts the reading.
//!
//! All three share one [`MongoConnection`].

mod adapters;
mod connection;
pub mod convert;

pub use adapters::{MongoCommandExecutor, MongoMetricsProvider, MongoProbe};
pub use connection::{ConnectError, MongoConnection};
