// src/db/models.rs

//! Data models for history database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading and updating records.
//! Package records are append-only: nothing here deletes them.

use crate::error::{Error, Result};
use crate::package::PackageIdentity;
use crate::reason::Reason;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

/// Parse a TEXT column into an enum, reporting bad values as conversion failures
fn parse_text<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

/// One installation instance of an exact package build
#[derive(Debug, Clone)]
pub struct PackageInstance {
    pub id: Option<i64>,
    pub name: String,
    pub epoch: Option<u32>,
    pub version: String,
    pub release: String,
    pub architecture: String,
    pub added_at: Option<String>,
}

impl PackageInstance {
    /// Create a new, not yet stored, instance of `pkg`
    pub fn new(pkg: &PackageIdentity) -> Self {
        Self {
            id: None,
            name: pkg.name().to_string(),
            epoch: pkg.epoch(),
            version: pkg.version().to_string(),
            release: pkg.release().to_string(),
            architecture: pkg.arch().to_string(),
            added_at: None,
        }
    }

    /// Insert this instance into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO packages (name, epoch, version, release, architecture)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.name,
                &self.epoch,
                &self.version,
                &self.release,
                &self.architecture,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find an instance by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, epoch, version, release, architecture, added_at
             FROM packages WHERE id = ?1",
        )?;

        let instance = stmt.query_row([id], Self::from_row).optional()?;

        Ok(instance)
    }

    /// Find every instance of an exact package build, oldest first
    pub fn find_by_identity(conn: &Connection, pkg: &PackageIdentity) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, epoch, version, release, architecture, added_at
             FROM packages
             WHERE name = ?1 AND IFNULL(epoch, 0) = ?2 AND version = ?3
               AND release = ?4 AND architecture = ?5
             ORDER BY id",
        )?;

        let instances = stmt
            .query_map(
                params![
                    pkg.name(),
                    pkg.epoch().unwrap_or(0),
                    pkg.version(),
                    pkg.release(),
                    pkg.arch(),
                ],
                Self::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(instances)
    }

    /// Find every instance of any build with this name and architecture
    pub fn find_by_class(conn: &Connection, name: &str, arch: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, epoch, version, release, architecture, added_at
             FROM packages WHERE name = ?1 AND architecture = ?2
             ORDER BY id",
        )?;

        let instances = stmt
            .query_map([name, arch], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(instances)
    }

    /// Rebuild the package identity this instance was registered for
    pub fn identity(&self) -> Result<PackageIdentity> {
        PackageIdentity::from_parts(
            &self.name,
            self.epoch,
            &self.version,
            &self.release,
            &self.architecture,
        )
    }

    /// Convert a database row to a PackageInstance
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            epoch: row.get(2)?,
            version: row.get(3)?,
            release: row.get(4)?,
            architecture: row.get(5)?,
            added_at: row.get(6)?,
        })
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Open,
    Complete,
    Mismatched,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Open => "open",
            TransactionStatus::Complete => "complete",
            TransactionStatus::Mismatched => "mismatched",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(TransactionStatus::Open),
            "complete" => Ok(TransactionStatus::Complete),
            "mismatched" => Ok(TransactionStatus::Mismatched),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// A package transaction as recorded in history
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: Option<i64>,
    pub description: String,
    pub status: TransactionStatus,
    pub begun_at: Option<String>,
    pub ended_at: Option<String>,
}

impl TransactionRecord {
    /// Create a new open TransactionRecord
    pub fn new(description: String) -> Self {
        Self {
            id: None,
            description,
            status: TransactionStatus::Open,
            begun_at: None,
            ended_at: None,
        }
    }

    /// Insert this transaction into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO transactions (description, status) VALUES (?1, ?2)",
            params![&self.description, self.status.as_str()],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a transaction by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, description, status, begun_at, ended_at
             FROM transactions WHERE id = ?1",
        )?;

        let record = stmt.query_row([id], Self::from_row).optional()?;

        Ok(record)
    }

    /// List all transactions, newest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, description, status, begun_at, ended_at
             FROM transactions ORDER BY id DESC",
        )?;

        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Update transaction status, stamping the end time when it closes
    pub fn update_status(&mut self, conn: &Connection, new_status: TransactionStatus) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            Error::InitError("Cannot update transaction without ID".to_string())
        })?;

        if new_status == TransactionStatus::Open {
            conn.execute(
                "UPDATE transactions SET status = ?1, ended_at = NULL WHERE id = ?2",
                params![new_status.as_str(), id],
            )?;
        } else {
            conn.execute(
                "UPDATE transactions SET status = ?1, ended_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![new_status.as_str(), id],
            )?;
        }

        self.status = new_status;
        Ok(())
    }

    /// Convert a database row to a TransactionRecord
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            description: row.get(1)?,
            status: parse_text(row, 2)?,
            begun_at: row.get(3)?,
            ended_at: row.get(4)?,
        })
    }
}

/// Whether a record marks the instance as present or gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Installed,
    Removed,
}

impl PackageState {
    pub fn as_str(&self) -> &str {
        match self {
            PackageState::Installed => "installed",
            PackageState::Removed => "removed",
        }
    }
}

impl FromStr for PackageState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "installed" => Ok(PackageState::Installed),
            "removed" => Ok(PackageState::Removed),
            _ => Err(format!("Invalid package state: {}", s)),
        }
    }
}

const RECORD_COLUMNS: &str = "id, instance_id, transaction_id, state, reason, description,
    replaced_by, from_repo, checksum_type, checksum_data, recorded_at";

/// State of one instance as of one transaction
#[derive(Debug, Clone)]
pub struct PackageRecord {
    pub id: Option<i64>,
    pub instance_id: i64,
    pub transaction_id: i64,
    pub state: PackageState,
    pub reason: Reason,
    pub description: Option<String>,
    pub replaced_by: bool,
    pub from_repo: Option<String>,
    pub checksum_type: Option<String>,
    pub checksum_data: Option<String>,
    pub recorded_at: Option<String>,
}

impl PackageRecord {
    /// Create a new PackageRecord
    pub fn new(instance_id: i64, transaction_id: i64, state: PackageState, reason: Reason) -> Self {
        Self {
            id: None,
            instance_id,
            transaction_id,
            state,
            reason,
            description: None,
            replaced_by: false,
            from_repo: None,
            checksum_type: None,
            checksum_data: None,
            recorded_at: None,
        }
    }

    /// Append this record to the ledger
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO package_records
             (instance_id, transaction_id, state, reason, description, replaced_by,
              from_repo, checksum_type, checksum_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.instance_id,
                &self.transaction_id,
                self.state.as_str(),
                self.reason.as_str(),
                &self.description,
                self.replaced_by as i32,
                &self.from_repo,
                &self.checksum_type,
                &self.checksum_data,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find the record of an instance in a given transaction
    pub fn find(conn: &Connection, instance_id: i64, transaction_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM package_records WHERE instance_id = ?1 AND transaction_id = ?2",
            RECORD_COLUMNS
        ))?;

        let record = stmt
            .query_row([instance_id, transaction_id], Self::from_row)
            .optional()?;

        Ok(record)
    }

    /// Find the most recent record of an instance
    pub fn latest_for_instance(conn: &Connection, instance_id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM package_records WHERE instance_id = ?1 ORDER BY id DESC LIMIT 1",
            RECORD_COLUMNS
        ))?;

        let record = stmt.query_row([instance_id], Self::from_row).optional()?;

        Ok(record)
    }

    /// Find every record written in a transaction
    pub fn find_by_transaction(conn: &Connection, transaction_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM package_records WHERE transaction_id = ?1 ORDER BY id",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map([transaction_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Latest record of every instance whose current state is installed
    pub fn list_installed(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM package_records
             WHERE id IN (SELECT MAX(id) FROM package_records GROUP BY instance_id)
               AND state = 'installed'
             ORDER BY instance_id",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Overwrite the mutable fields (reason, repo, checksum) of this record
    pub fn update_mutable(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            Error::InitError("Cannot update package record without ID".to_string())
        })?;

        conn.execute(
            "UPDATE package_records SET reason = ?1, from_repo = ?2, checksum_type = ?3,
             checksum_data = ?4 WHERE id = ?5",
            params![
                self.reason.as_str(),
                &self.from_repo,
                &self.checksum_type,
                &self.checksum_data,
                id,
            ],
        )?;

        Ok(())
    }

    /// Convert a database row to a PackageRecord
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            instance_id: row.get(1)?,
            transaction_id: row.get(2)?,
            state: parse_text(row, 3)?,
            reason: parse_text(row, 4)?,
            description: row.get(5)?,
            replaced_by: row.get::<_, i32>(6)? != 0,
            from_repo: row.get(7)?,
            checksum_type: row.get(8)?,
            checksum_data: row.get(9)?,
            recorded_at: row.get(10)?,
        })
    }
}

/// Repository represents a configured package source
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub priority: i32,
    pub created_at: Option<String>,
}

impl Repository {
    /// Create a new Repository
    pub fn new(name: String, url: String) -> Self {
        Self {
            id: None,
            name,
            url,
            enabled: true,
            priority: 0,
            created_at: None,
        }
    }

    /// Insert this repository into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO repositories (name, url, enabled, priority) VALUES (?1, ?2, ?3, ?4)",
            params![&self.name, &self.url, self.enabled as i32, &self.priority],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a repository by name
    pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, created_at
             FROM repositories WHERE name = ?1",
        )?;

        let repo = stmt.query_row([name], Self::from_row).optional()?;

        Ok(repo)
    }

    /// List all repositories
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, created_at
             FROM repositories ORDER BY priority DESC, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    /// List enabled repositories
    pub fn list_enabled(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, url, enabled, priority, created_at
             FROM repositories WHERE enabled = 1 ORDER BY priority DESC, name",
        )?;

        let repos = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(repos)
    }

    /// Delete a repository by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM repositories WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to a Repository
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            url: row.get(2)?,
            enabled: row.get::<_, i32>(3)? != 0,
            priority: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
