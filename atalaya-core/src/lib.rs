//! # atalaya-core
//!
//! Core library for Atalaya - reporting engines over coaching platform
//! database snapshots.
//!
//! This library provides:
//! - Typed tables decoded from collection exports
//! - An exclusion policy and user directory shared by every engine
//! - Five reporting engines: recurrence, connections, trainings, coach
//!   and progress
//! - Spreadsheet-shaped rendering with the Spanish labels the dashboards
//!   expect
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Snapshot:** raw collection documents decoded into typed tables,
//!   fingerprinted so a run can be tied to its input
//! - **Normalize:** demo and internal organizations dropped, users joined
//!   to their group and company labels
//! - **Engines:** pure functions from normalized tables to report structs
//!
//! ## Example
//!
//! ```rust,no_run
//! use atalaya_core::engines::{recurrence, ReportFilter};
//! use atalaya_core::engines::recurrence::RecurrenceOptions;
//! use atalaya_core::normalize::UserDirectory;
//! use atalaya_core::{Config, ExclusionPolicy, JsonDirProvider, NormalizedTables, Snapshot};
//!
//! // Load configuration and a snapshot exported from the database
//! let config = Config::load().expect("failed to load config");
//! let provider = JsonDirProvider::new("snapshot/");
//! let snapshot = Snapshot::load(&provider).expect("failed to load snapshot");
//!
//! // Normalize once, then run any engine
//! let policy = ExclusionPolicy::from_config(&config.exclusions);
//! let tables = NormalizedTables::build(&snapshot, &policy);
//! let directory = UserDirectory::build(&tables);
//! let report = recurrence::compute(
//!     &tables,
//!     &directory,
//!     &ReportFilter::default(),
//!     &RecurrenceOptions::from(&config.reference),
//! );
//! ```

// Re-export commonly used items at the crate root
pub use catalog::Catalog;
pub use config::Config;
pub use error::{Error, Result};
pub use normalize::{ExclusionPolicy, NormalizedTables, UserDirectory};
pub use report::{Sheet, Workbook};
pub use snapshot::{JsonDirProvider, Snapshot, SnapshotProvider, StaticProvider};
pub use types::*;

// Public modules
pub mod catalog;
pub mod config;
pub mod engines;
pub mod error;
pub mod format;
pub mod logging;
pub mod normalize;
pub mod report;
pub mod snapshot;
pub mod types;
