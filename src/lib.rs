//! Core library for the patchsheet command line application.
//!
//! The library collects paginated inventory and patch-status records from a
//! remote management API, normalizes the nested records into flat tabular
//! rows, joins the datasets by instance identifier, and emits a multi-sheet
//! Excel report. The modules are structured to keep responsibilities narrow
//! and composable: pagination and retry live in [`fetch`], record
//! normalization in [`flatten`], table assembly in [`table`], the key-based
//! merge in [`consolidate`], IO adapters under [`io`], the external service
//! contracts in [`service`], and the report orchestration in [`report`].

pub mod config;
pub mod consolidate;
pub mod error;
pub mod fetch;
pub mod flatten;
pub mod io;
pub mod model;
pub mod report;
pub mod service;
pub mod table;

pub use error::{ReportError, Result};
