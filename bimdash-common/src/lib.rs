//! # bimdash common library
//!
//! Data layer of the project-metadata dashboard:
//! - Tree store over SQLite with change events and snapshot streams
//! - CSV ingestion with type-tag coercion
//! - Denormalized project batches addressed by composite record ids
//! - Filtering and sorting of open records
//! - Lookup lists, key contacts, Revit users and dashboard statistics
//! - Configuration loading

pub mod config;
pub mod contacts;
pub mod csv;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod events;
pub mod fields;
pub mod filter;
pub mod lookups;
pub mod projects;
pub mod record;
pub mod record_id;
pub mod report;
pub mod sse;
pub mod store;
pub mod users;

pub use error::{Error, Result};
pub use fields::{FieldRole, FieldRoles};
pub use record_id::CompositeId;
