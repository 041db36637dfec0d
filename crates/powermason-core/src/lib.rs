//! powermason-core: domain types, ledger arithmetic, progress roll-up,
//! the staging workflow and the port traits the stores implement.
//!
//! Nothing here touches a database. `powermason-postgres` provides the
//! Postgres stores; [`memory::MemoryStore`] provides an in-process one.

pub mod budget;
pub mod costs;
pub mod error;
pub mod files;
pub mod memory;
pub mod money;
pub mod ports;
pub mod principal;
pub mod project;
pub mod schedule;
pub mod service;
pub mod staging;
pub mod types;
pub mod warning;

pub use error::{PowermasonError, Result};
pub use service::ProjectService;
