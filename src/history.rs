// src/history.rs

//! Persistent install history
//!
//! The history store is an append-only ledger. Every installation of a
//! package build gets its own instance; every state change of an instance
//! appends a record tied to a transaction. The current state of a package
//! is its newest record. Only the mutable fields (reason, repository,
//! checksum) of a record are ever updated in place, and reasons only move
//! up in precedence.
//!
//! All writes run inside a SQLite transaction and are committed before the
//! call returns. The store assumes a single writer at a time.

use crate::db::{
    self,
    models::{PackageInstance, PackageRecord, PackageState, TransactionRecord, TransactionStatus},
};
use crate::error::{Error, Result};
use crate::package::{Checksum, PackageIdentity};
use crate::reason::Reason;
use crate::repository::RepositoryConfig;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Identifier of one installation instance
pub type InstanceId = i64;

/// Identifier of a history transaction; strictly increasing
pub type TransactionId = i64;

/// Mutable metadata attached to an instance's record
#[derive(Debug, Clone, Default)]
pub struct PackageData {
    pub reason: Option<Reason>,
    pub from_repo: Option<String>,
    pub checksum: Option<Checksum>,
}

/// The newest known state of a package
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub instance_id: InstanceId,
    pub transaction_id: TransactionId,
    pub pkg: PackageIdentity,
    pub reason: Reason,
    pub from_repo: Option<String>,
    pub installed: bool,
    pub replaced_by: bool,
    pub description: Option<String>,
}

impl HistoryRecord {
    fn from_parts(instance: &PackageInstance, record: &PackageRecord) -> Result<Self> {
        let mut pkg = instance.identity()?;

        if let (Some(kind), Some(data)) = (&record.checksum_type, &record.checksum_data) {
            pkg = pkg.with_checksum(Checksum::from_hex(kind.parse()?, data)?);
        }
        if let Some(repo) = &record.from_repo {
            pkg = pkg.with_origin_repo(repo.trim_start_matches('@'));
        }

        Ok(Self {
            instance_id: record.instance_id,
            transaction_id: record.transaction_id,
            pkg,
            reason: record.reason,
            from_repo: record.from_repo.clone(),
            installed: record.state == PackageState::Installed,
            replaced_by: record.replaced_by,
            description: record.description.clone(),
        })
    }

    /// Repository as shown to users: installed packages read `@repo`
    pub fn ui_from_repo(&self) -> String {
        match self.from_repo.as_deref() {
            Some(repo) if repo.starts_with('@') => repo.to_string(),
            Some(repo) => format!("@{}", repo),
            None => String::new(),
        }
    }

    pub fn checksum(&self) -> Option<&Checksum> {
        self.pkg.checksum()
    }
}

/// Handle to the history database
pub struct History {
    conn: Connection,
}

impl History {
    /// Open the history at `db_path`, creating it on first use
    pub fn open(db_path: &str) -> Result<Self> {
        db::init(db_path)?;
        let conn = db::open(db_path)?;
        Ok(Self { conn })
    }

    /// Open a history that must already exist
    pub fn open_existing(db_path: &str) -> Result<Self> {
        Ok(Self {
            conn: db::open(db_path)?,
        })
    }

    /// Open a throwaway history that lives only in memory
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }

    /// Underlying connection, for read-only helpers such as repository lookup
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a new transaction and return its id
    pub fn begin_transaction(&mut self, description: &str) -> Result<TransactionId> {
        let id = TransactionRecord::new(description.to_string()).insert(&self.conn)?;
        info!("Began history transaction {}: {}", id, description);
        Ok(id)
    }

    /// Close a transaction, marking whether the system matched the plan
    pub fn end_transaction(&mut self, id: TransactionId, success: bool) -> Result<()> {
        let mut record = self.transaction(id)?;
        let status = if success {
            TransactionStatus::Complete
        } else {
            TransactionStatus::Mismatched
        };
        record.update_status(&self.conn, status)?;
        info!("Ended history transaction {} ({})", id, status.as_str());
        Ok(())
    }

    /// Look up a transaction
    pub fn transaction(&self, id: TransactionId) -> Result<TransactionRecord> {
        TransactionRecord::find_by_id(&self.conn, id)?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))
    }

    /// All transactions, newest first
    pub fn transactions(&self) -> Result<Vec<TransactionRecord>> {
        TransactionRecord::list_all(&self.conn)
    }

    /// Every record written by one transaction
    pub fn transaction_records(&self, id: TransactionId) -> Result<Vec<HistoryRecord>> {
        PackageRecord::find_by_transaction(&self.conn, id)?
            .iter()
            .map(|record| {
                let instance = PackageInstance::find_by_id(&self.conn, record.instance_id)?
                    .ok_or_else(|| Error::NotFound(format!("instance {}", record.instance_id)))?;
                HistoryRecord::from_parts(&instance, record)
            })
            .collect()
    }

    /// Register a new installation instance of `pkg`
    ///
    /// Fails with `DuplicateInstance` when an instance of the identical
    /// package is already registered and still pending: it has no records
    /// yet, or it was installed by a transaction that is still open.
    pub fn add_package(&mut self, pkg: &PackageIdentity) -> Result<InstanceId> {
        db::transaction(&mut self.conn, |tx| {
            for instance in PackageInstance::find_by_identity(tx, pkg)? {
                let id = instance_id(&instance)?;
                if is_pending(tx, id)? {
                    return Err(Error::DuplicateInstance(format!(
                        "{} is already registered as instance {}",
                        pkg, id
                    )));
                }
            }

            let id = PackageInstance::new(pkg).insert(tx)?;
            debug!("Registered {} as instance {}", pkg, id);
            Ok(id)
        })
    }

    /// Record that an instance is installed as of a transaction
    ///
    /// The stored reason never drops below what the currently installed
    /// builds of the same name and arch already carry.
    pub fn begin_transaction_data(
        &mut self,
        transaction_id: TransactionId,
        instance_id: InstanceId,
        reason: Reason,
        description: &str,
        is_replaced_by: bool,
    ) -> Result<()> {
        db::transaction(&mut self.conn, |tx| {
            if TransactionRecord::find_by_id(tx, transaction_id)?.is_none() {
                return Err(Error::NotFound(format!("transaction {}", transaction_id)));
            }
            let instance = PackageInstance::find_by_id(tx, instance_id)?
                .ok_or_else(|| Error::NotFound(format!("instance {}", instance_id)))?;

            if PackageRecord::find(tx, instance_id, transaction_id)?.is_some() {
                return Err(Error::DuplicateInstance(format!(
                    "instance {} already has data in transaction {}",
                    instance_id, transaction_id
                )));
            }

            let prior = class_reason(tx, &instance.name, &instance.architecture)?;
            let mut record = PackageRecord::new(
                instance_id,
                transaction_id,
                PackageState::Installed,
                reason.escalate(prior),
            );
            record.description = Some(description.to_string());
            record.replaced_by = is_replaced_by;
            record.insert(tx)?;

            debug!(
                "Instance {} installed in transaction {} ({})",
                instance_id, transaction_id, record.reason
            );
            Ok(())
        })
    }

    /// Attach reason, repository and checksum to an instance's record
    pub fn update_package_data(
        &mut self,
        instance_id: InstanceId,
        transaction_id: TransactionId,
        data: &PackageData,
    ) -> Result<()> {
        db::transaction(&mut self.conn, |tx| {
            let mut record = PackageRecord::find(tx, instance_id, transaction_id)?.ok_or_else(|| {
                Error::NotFound(format!(
                    "instance {} in transaction {}",
                    instance_id, transaction_id
                ))
            })?;

            if let Some(reason) = data.reason {
                record.reason = record.reason.max(reason);
            }
            if let Some(repo) = &data.from_repo {
                record.from_repo = Some(repo.clone());
            }
            if let Some(checksum) = &data.checksum {
                record.checksum_type = Some(checksum.kind().as_str().to_string());
                record.checksum_data = Some(checksum.to_hex());
            }

            record.update_mutable(tx)
        })
    }

    /// Append a removal record for an instance
    ///
    /// Repeating the call for the same transaction is a no-op.
    pub fn mark_removed(
        &mut self,
        instance_id: InstanceId,
        transaction_id: TransactionId,
        is_replaced_by: bool,
    ) -> Result<()> {
        db::transaction(&mut self.conn, |tx| {
            if let Some(existing) = PackageRecord::find(tx, instance_id, transaction_id)? {
                return match existing.state {
                    PackageState::Removed => Ok(()),
                    PackageState::Installed => Err(Error::DuplicateInstance(format!(
                        "instance {} was installed by transaction {}",
                        instance_id, transaction_id
                    ))),
                };
            }

            let latest = PackageRecord::latest_for_instance(tx, instance_id)?
                .ok_or_else(|| Error::NotFound(format!("instance {}", instance_id)))?;

            let mut record = PackageRecord::new(
                instance_id,
                transaction_id,
                PackageState::Removed,
                latest.reason,
            );
            let description = if is_replaced_by { "Replaced" } else { "Removed" };
            record.description = Some(description.to_string());
            record.replaced_by = is_replaced_by;
            record.from_repo = latest.from_repo;
            record.checksum_type = latest.checksum_type;
            record.checksum_data = latest.checksum_data;
            record.insert(tx)?;

            debug!("Instance {} removed in transaction {}", instance_id, transaction_id);
            Ok(())
        })
    }

    /// Raise the recorded reason of a package; lower reasons are ignored
    pub fn set_reason(&mut self, pkg: &PackageIdentity, reason: Reason) -> Result<()> {
        db::transaction(&mut self.conn, |tx| {
            let (_, mut record) = latest_record(tx, pkg)?
                .ok_or_else(|| Error::NotFound(pkg.to_string()))?;

            if reason > record.reason {
                info!("Reason of {} raised from {} to {}", pkg, record.reason, reason);
                record.reason = reason;
                record.update_mutable(tx)?;
            } else {
                debug!("Keeping reason {} of {} (asked for {})", record.reason, pkg, reason);
            }
            Ok(())
        })
    }

    /// Current reason of a package
    pub fn reason(&self, pkg: &PackageIdentity) -> Result<Reason> {
        Ok(self.package(pkg)?.reason)
    }

    /// Set the repository a package is recorded as coming from
    pub fn set_repo(&mut self, pkg: &PackageIdentity, repo_id: &str) -> Result<()> {
        db::transaction(&mut self.conn, |tx| {
            let (_, mut record) = latest_record(tx, pkg)?
                .ok_or_else(|| Error::NotFound(pkg.to_string()))?;
            record.from_repo = Some(repo_id.to_string());
            record.update_mutable(tx)
        })
    }

    /// Repository a package is recorded as coming from
    pub fn repo(&self, pkg: &PackageIdentity) -> Result<Option<String>> {
        Ok(self.package(pkg)?.from_repo)
    }

    /// Whether the user asked for this package and it is safe to treat as kept
    ///
    /// Requires reason `User`, a current installed state, and a recorded
    /// repository that is still configured. A package whose repository is
    /// gone keeps its reason in history but is not reported here.
    pub fn user_installed<R>(&self, pkg: &PackageIdentity, repos: &R) -> Result<bool>
    where
        R: RepositoryConfig + ?Sized,
    {
        let Some((_, record)) = latest_record(&self.conn, pkg)? else {
            return Ok(false);
        };
        Ok(is_user_installed(&record, repos))
    }

    /// Newest record of a package
    pub fn package(&self, pkg: &PackageIdentity) -> Result<HistoryRecord> {
        let (instance, record) = latest_record(&self.conn, pkg)?
            .ok_or_else(|| Error::NotFound(pkg.to_string()))?;
        HistoryRecord::from_parts(&instance, &record)
    }

    /// All packages currently recorded as installed
    pub fn installed(&self) -> Result<Vec<HistoryRecord>> {
        PackageRecord::list_installed(&self.conn)?
            .iter()
            .map(|record| {
                let instance = PackageInstance::find_by_id(&self.conn, record.instance_id)?
                    .ok_or_else(|| Error::NotFound(format!("instance {}", record.instance_id)))?;
                HistoryRecord::from_parts(&instance, record)
            })
            .collect()
    }

    /// Installed packages the user asked for, from still-configured repositories
    pub fn user_installed_packages<R>(&self, repos: &R) -> Result<Vec<HistoryRecord>>
    where
        R: RepositoryConfig + ?Sized,
    {
        Ok(self
            .installed()?
            .into_iter()
            .filter(|record| {
                record.reason == Reason::User
                    && record
                        .from_repo
                        .as_deref()
                        .is_some_and(|repo| repos.contains(repo.trim_start_matches('@')))
            })
            .collect())
    }

    /// Highest reason among installed builds with this name and arch
    pub fn class_reason(&self, name: &str, arch: &str) -> Result<Option<Reason>> {
        class_reason(&self.conn, name, arch)
    }

    /// Instance of `pkg` that a transaction should reuse instead of registering a new one
    ///
    /// That is an instance already installed by `transaction_id`, one
    /// registered earlier that never received any record, or one installed
    /// by a transaction that was never ended. With `keep_installed` set, an
    /// instance that is simply still installed counts as well, so recording
    /// the same package again does not create a second instance.
    pub fn instance_for(
        &self,
        pkg: &PackageIdentity,
        transaction_id: TransactionId,
        keep_installed: bool,
    ) -> Result<Option<InstanceId>> {
        let mut live = None;
        for instance in PackageInstance::find_by_identity(&self.conn, pkg)?.into_iter().rev() {
            let id = instance_id(&instance)?;
            if let Some(record) = PackageRecord::find(&self.conn, id, transaction_id)? {
                if record.state == PackageState::Installed {
                    return Ok(Some(id));
                }
                continue;
            }
            let Some(record) = PackageRecord::latest_for_instance(&self.conn, id)? else {
                return Ok(Some(id));
            };
            if live.is_none()
                && record.state == PackageState::Installed
                && (keep_installed || is_pending(&self.conn, id)?)
            {
                live = Some(id);
            }
        }
        Ok(live)
    }

    /// Newest transaction that was begun but never ended
    ///
    /// Only a verification that died part way leaves one behind.
    pub fn unfinished_transaction(&self) -> Result<Option<TransactionRecord>> {
        Ok(TransactionRecord::list_all(&self.conn)?
            .into_iter()
            .find(|record| record.status == TransactionStatus::Open))
    }

    /// Installed instance of `pkg` that was not installed by `transaction_id`
    pub fn installed_instance(
        &self,
        pkg: &PackageIdentity,
        transaction_id: TransactionId,
    ) -> Result<Option<InstanceId>> {
        for instance in PackageInstance::find_by_identity(&self.conn, pkg)?.iter().rev() {
            let id = instance_id(instance)?;
            if let Some(record) = PackageRecord::latest_for_instance(&self.conn, id)? {
                if record.state == PackageState::Installed && record.transaction_id != transaction_id {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// Whether some instance of `pkg` was removed by `transaction_id`
    pub fn removed_in(&self, pkg: &PackageIdentity, transaction_id: TransactionId) -> Result<bool> {
        for instance in PackageInstance::find_by_identity(&self.conn, pkg)? {
            if let Some(record) = PackageRecord::find(&self.conn, instance_id(&instance)?, transaction_id)? {
                if record.state == PackageState::Removed {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Forget all package history. Configured repositories are kept.
    pub fn reset(&mut self) -> Result<()> {
        warn!("Resetting package history");
        db::transaction(&mut self.conn, |tx| {
            tx.execute_batch(
                "
                DELETE FROM package_records;
                DELETE FROM packages;
                DELETE FROM transactions;
                ",
            )?;
            Ok(())
        })
    }
}

fn instance_id(instance: &PackageInstance) -> Result<InstanceId> {
    instance
        .id
        .ok_or_else(|| Error::InitError("package instance without ID".to_string()))
}

/// Whether an instance is still waiting on its transaction
///
/// True when it has no records yet, or its latest record installs it in a
/// transaction that is still open.
fn is_pending(conn: &Connection, id: InstanceId) -> Result<bool> {
    match PackageRecord::latest_for_instance(conn, id)? {
        None => Ok(true),
        Some(record) => Ok(record.state == PackageState::Installed
            && TransactionRecord::find_by_id(conn, record.transaction_id)?
                .is_some_and(|t| t.status == TransactionStatus::Open)),
    }
}

/// Latest record of the newest instance of the exact package that has any
///
/// A reinstall removes the old instance after the new one is recorded, so
/// the newest instance decides the current state, not the newest row.
fn latest_record(
    conn: &Connection,
    pkg: &PackageIdentity,
) -> Result<Option<(PackageInstance, PackageRecord)>> {
    for instance in PackageInstance::find_by_identity(conn, pkg)?.into_iter().rev() {
        if let Some(record) = PackageRecord::latest_for_instance(conn, instance_id(&instance)?)? {
            return Ok(Some((instance, record)));
        }
    }

    Ok(None)
}

fn class_reason(conn: &Connection, name: &str, arch: &str) -> Result<Option<Reason>> {
    let mut reason: Option<Reason> = None;

    for instance in PackageInstance::find_by_class(conn, name, arch)? {
        if let Some(record) = PackageRecord::latest_for_instance(conn, instance_id(&instance)?)? {
            if record.state == PackageState::Installed {
                reason = Some(reason.map_or(record.reason, |r| r.max(record.reason)));
            }
        }
    }

    Ok(reason)
}

fn is_user_installed<R>(record: &PackageRecord, repos: &R) -> bool
where
    R: RepositoryConfig + ?Sized,
{
    if record.state != PackageState::Installed || record.reason != Reason::User {
        return false;
    }

    match record.from_repo.as_deref() {
        Some(repo) if repos.contains(repo.trim_start_matches('@')) => true,
        Some(repo) => {
            debug!("Repository {} of instance {} is not configured", repo, record.instance_id);
            false
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::ChecksumType;

    fn pepper() -> PackageIdentity {
        PackageIdentity::new("pepper", "20-0", "x86_64").unwrap()
    }

    /// Record `pkg` as installed by a fresh transaction
    fn install(history: &mut History, pkg: &PackageIdentity, reason: Reason) -> (InstanceId, TransactionId) {
        let tx = history.begin_transaction("Install").unwrap();
        let pid = history.add_package(pkg).unwrap();
        history.begin_transaction_data(tx, pid, reason, "Installed", false).unwrap();
        history.update_package_data(pid, tx, &PackageData::default()).unwrap();
        history.end_transaction(tx, true).unwrap();
        (pid, tx)
    }

    #[test]
    fn test_add_package_round_trip() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::User);

        let record = history.package(&pepper()).unwrap();
        assert_eq!(record.pkg, pepper());
        assert_eq!(record.pkg.name(), "pepper");
        assert_eq!(record.pkg.version(), "20");
        assert_eq!(record.pkg.release(), "0");
        assert_eq!(record.pkg.arch(), "x86_64");
        assert!(record.installed);
    }

    #[test]
    fn test_package_not_found() {
        let history = History::open_in_memory().unwrap();
        assert!(matches!(history.package(&pepper()), Err(Error::NotFound(_))));
        assert!(matches!(history.reason(&pepper()), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_duplicate_pending_instance() {
        let mut history = History::open_in_memory().unwrap();
        history.add_package(&pepper()).unwrap();
        assert!(matches!(
            history.add_package(&pepper()),
            Err(Error::DuplicateInstance(_))
        ));
    }

    #[test]
    fn test_duplicate_within_open_transaction() {
        let mut history = History::open_in_memory().unwrap();
        let tx = history.begin_transaction("Install").unwrap();
        let pid = history.add_package(&pepper()).unwrap();
        history.begin_transaction_data(tx, pid, Reason::User, "Installed", false).unwrap();

        assert!(matches!(
            history.add_package(&pepper()),
            Err(Error::DuplicateInstance(_))
        ));
        assert!(matches!(
            history.begin_transaction_data(tx, pid, Reason::User, "Installed", false),
            Err(Error::DuplicateInstance(_))
        ));

        // Once the transaction is closed a reinstall gets its own instance
        history.end_transaction(tx, true).unwrap();
        let again = history.add_package(&pepper()).unwrap();
        assert_ne!(again, pid);
    }

    #[test]
    fn test_reason_is_monotonic() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::Dep);

        history.set_reason(&pepper(), Reason::User).unwrap();
        assert_eq!(history.reason(&pepper()).unwrap(), Reason::User);

        history.set_reason(&pepper(), Reason::Dep).unwrap();
        assert_eq!(history.reason(&pepper()).unwrap(), Reason::User);

        history.set_reason(&pepper(), Reason::Clean).unwrap();
        assert_eq!(history.reason(&pepper()).unwrap(), Reason::User);
    }

    #[test]
    fn test_set_reason_unknown_package() {
        let mut history = History::open_in_memory().unwrap();
        assert!(matches!(
            history.set_reason(&pepper(), Reason::User),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_update_package_data_overwrites_mutable_fields() {
        let mut history = History::open_in_memory().unwrap();
        let (pid, tx) = install(&mut history, &pepper(), Reason::Dep);

        let data = PackageData {
            reason: Some(Reason::Clean),
            from_repo: Some("@main".to_string()),
            checksum: Some(Checksum::from_hex(ChecksumType::Md5, "68e9ded8ea25137c964a638f12e9987c").unwrap()),
        };
        history.update_package_data(pid, tx, &data).unwrap();

        let record = history.package(&pepper()).unwrap();
        assert_eq!(record.reason, Reason::Dep);
        assert_eq!(record.ui_from_repo(), "@main");
        assert_eq!(record.pkg.origin_repo(), Some("main"));
        assert_eq!(record.checksum().unwrap().kind(), ChecksumType::Md5);
        assert_eq!(record.checksum().unwrap().to_hex(), "68e9ded8ea25137c964a638f12e9987c");

        assert!(matches!(
            history.update_package_data(pid, tx + 100, &data),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_user_installed() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::User);
        history.set_repo(&pepper(), "main").unwrap();

        let repos = vec!["main".to_string()];
        assert!(history.user_installed(&pepper(), &repos).unwrap());
        assert_eq!(history.repo(&pepper()).unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_user_installed_bad_from_repo() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::User);
        history.set_repo(&pepper(), "anakonda").unwrap();

        let repos = vec!["main".to_string()];
        assert!(!history.user_installed(&pepper(), &repos).unwrap());
        assert_eq!(history.repo(&pepper()).unwrap().as_deref(), Some("anakonda"));
        assert_eq!(history.reason(&pepper()).unwrap(), Reason::User);
    }

    #[test]
    fn test_user_installed_bad_reason() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::Dep);
        history.set_repo(&pepper(), "main").unwrap();

        let repos = vec!["main".to_string()];
        assert!(!history.user_installed(&pepper(), &repos).unwrap());
        assert_eq!(history.repo(&pepper()).unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_user_installed_unknown_package() {
        let history = History::open_in_memory().unwrap();
        let repos = vec!["main".to_string()];
        assert!(!history.user_installed(&pepper(), &repos).unwrap());
    }

    #[test]
    fn test_removal_appends_record() {
        let mut history = History::open_in_memory().unwrap();
        let (pid, install_tx) = install(&mut history, &pepper(), Reason::User);
        history.set_repo(&pepper(), "@main").unwrap();

        let tx = history.begin_transaction("Remove").unwrap();
        history.mark_removed(pid, tx, false).unwrap();
        // Second call for the same transaction changes nothing
        history.mark_removed(pid, tx, false).unwrap();

        let record = history.package(&pepper()).unwrap();
        assert!(!record.installed);
        assert_eq!(record.transaction_id, tx);
        assert_eq!(record.reason, Reason::User);
        assert_eq!(record.from_repo.as_deref(), Some("@main"));

        // The install record is untouched
        let earlier = history.transaction_records(install_tx).unwrap();
        assert_eq!(earlier.len(), 1);
        assert!(earlier[0].installed);

        assert!(history.removed_in(&pepper(), tx).unwrap());
        assert!(history.installed().unwrap().is_empty());
        assert!(!history.user_installed(&pepper(), &vec!["main".to_string()]).unwrap());
    }

    #[test]
    fn test_class_reason_escalates_new_builds() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::User);

        // A newer build recorded as a dependency keeps the user reason
        let newer = PackageIdentity::new("pepper", "21-0", "x86_64").unwrap();
        install(&mut history, &newer, Reason::Dep);
        assert_eq!(history.reason(&newer).unwrap(), Reason::User);
        assert_eq!(history.class_reason("pepper", "x86_64").unwrap(), Some(Reason::User));
        assert_eq!(history.class_reason("pepper", "i686").unwrap(), None);
    }

    #[test]
    fn test_instance_lookup_helpers() {
        let mut history = History::open_in_memory().unwrap();
        let (pid, install_tx) = install(&mut history, &pepper(), Reason::User);

        let tx = history.begin_transaction("Reinstall").unwrap();
        assert_eq!(history.instance_for(&pepper(), tx, false).unwrap(), None);
        assert_eq!(history.instance_for(&pepper(), tx, true).unwrap(), Some(pid));
        assert_eq!(history.installed_instance(&pepper(), tx).unwrap(), Some(pid));
        assert_eq!(history.installed_instance(&pepper(), install_tx).unwrap(), None);

        let pending = history.add_package(&pepper()).unwrap();
        assert_eq!(history.instance_for(&pepper(), tx, false).unwrap(), Some(pending));
        assert_eq!(history.instance_for(&pepper(), tx, true).unwrap(), Some(pending));
    }

    #[test]
    fn test_instance_left_by_unfinished_transaction_is_reused() {
        let mut history = History::open_in_memory().unwrap();
        assert!(history.unfinished_transaction().unwrap().is_none());

        // A verification that stopped after recording the install
        let abandoned = history.begin_transaction("install 1").unwrap();
        let pid = history.add_package(&pepper()).unwrap();
        history
            .begin_transaction_data(abandoned, pid, Reason::User, "Installed", false)
            .unwrap();
        assert_eq!(
            history.unfinished_transaction().unwrap().and_then(|t| t.id),
            Some(abandoned)
        );

        let tx = history.begin_transaction("install 1").unwrap();
        assert_eq!(history.instance_for(&pepper(), tx, false).unwrap(), Some(pid));
        assert!(matches!(
            history.add_package(&pepper()),
            Err(Error::DuplicateInstance(_))
        ));

        history.end_transaction(abandoned, true).unwrap();
        history.end_transaction(tx, true).unwrap();
        assert!(history.unfinished_transaction().unwrap().is_none());
        assert_eq!(history.instance_for(&pepper(), tx, false).unwrap(), None);
    }

    #[test]
    fn test_user_installed_packages() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::User);
        history.set_repo(&pepper(), "main").unwrap();

        let tour = PackageIdentity::new("tour", "5-0", "noarch").unwrap();
        install(&mut history, &tour, Reason::Dep);
        history.set_repo(&tour, "main").unwrap();

        let repos = vec!["main".to_string()];
        let user = history.user_installed_packages(&repos).unwrap();
        assert_eq!(user.len(), 1);
        assert_eq!(user[0].pkg, pepper());
    }

    #[test]
    fn test_transactions_are_monotonic() {
        let mut history = History::open_in_memory().unwrap();
        let a = history.begin_transaction("first").unwrap();
        let b = history.begin_transaction("second").unwrap();
        assert!(b > a);

        history.end_transaction(a, false).unwrap();
        assert_eq!(history.transaction(a).unwrap().status, TransactionStatus::Mismatched);
        assert_eq!(history.transaction(b).unwrap().status, TransactionStatus::Open);
        assert_eq!(history.transactions().unwrap().len(), 2);
    }

    #[test]
    fn test_reset() {
        let mut history = History::open_in_memory().unwrap();
        install(&mut history, &pepper(), Reason::User);

        history.reset().unwrap();
        assert!(matches!(history.package(&pepper()), Err(Error::NotFound(_))));
        assert!(history.transactions().unwrap().is_empty());
    }
}
