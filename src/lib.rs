// src/lib.rs

//! pkgledger
//!
//! Transaction construction and install history for a system package
//! manager. A solved goal becomes a transaction of package operations,
//! each installed package gets a durable reason, and after the installer
//! has run the outcome is verified and appended to a SQLite ledger.
//!
//! # Architecture
//!
//! - Database-first: all state in SQLite, no config files
//! - Append-only history: removals add records, nothing is rewritten
//! - Reasons only move up in precedence while a package stays installed
//! - Solver and installer are external, reached through traits

pub mod db;
mod error;
pub mod goal;
pub mod history;
pub mod package;
pub mod reason;
pub mod repository;
pub mod transaction;
pub mod version;

pub use error::{Error, Result};
pub use goal::{Goal, SimpleGoal};
pub use history::{History, HistoryRecord, PackageData};
pub use package::{Checksum, ChecksumType, PackageIdentity};
pub use reason::{Reason, ReasonFlags};
pub use repository::{ConfiguredRepositories, RepositoryConfig};
pub use transaction::{
    Action, Installer, Transaction, TransactionBuilder, TransactionEngine, TransactionItem,
    TransactionVerifier, VerificationResult,
};
