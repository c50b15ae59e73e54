// src/transaction/verify.rs

//! Post-execution reconciliation
//!
//! After the installer has run, the verifier compares each item with the
//! packages actually present on the system and writes what it finds to the
//! history. Packages that did not end up where the plan put them are
//! reported as mismatches; they never abort verification. Only storage
//! failures are errors.

use super::{Action, ItemState, Transaction, TransactionItem};
use crate::error::Result;
use crate::history::{History, InstanceId, PackageData, TransactionId};
use crate::package::PackageIdentity;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// A difference between the plan and the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "package", rename_all = "kebab-case")]
pub enum Mismatch {
    /// Planned to be installed but missing afterwards
    PackageNotInstalled(PackageIdentity),
    /// Planned to be removed but still present
    PackageStillInstalled(PackageIdentity),
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::PackageNotInstalled(pkg) => write!(f, "{} is not installed", pkg),
            Mismatch::PackageStillInstalled(pkg) => write!(f, "{} is still installed", pkg),
        }
    }
}

/// Verification result for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub action: Action,
    pub installed: Option<PackageIdentity>,
    pub state: ItemState,
    pub mismatches: Vec<Mismatch>,
}

/// Verification result for a whole transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub transaction_id: TransactionId,
    pub items: Vec<ItemOutcome>,
}

impl VerificationResult {
    /// Whether every item matched the system
    pub fn is_success(&self) -> bool {
        self.items.iter().all(|item| item.mismatches.is_empty())
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &Mismatch> {
        self.items.iter().flat_map(|item| item.mismatches.iter())
    }
}

/// Reconciles executed transactions with the history
pub struct TransactionVerifier<'a> {
    history: &'a mut History,
}

impl<'a> TransactionVerifier<'a> {
    pub fn new(history: &'a mut History) -> Self {
        Self { history }
    }

    /// Record the outcome of `transaction` given the packages now installed
    ///
    /// Verifying the same transaction again writes to the same history
    /// transaction and adds no duplicate records. A transaction without a
    /// history id picks up one that an interrupted verification left open
    /// before a new one is begun.
    pub fn verify(
        &mut self,
        transaction: &mut Transaction,
        now_installed: &[PackageIdentity],
    ) -> Result<VerificationResult> {
        let tx = match transaction.history_id() {
            Some(id) => {
                self.history.transaction(id)?;
                debug!("Re-verifying against history transaction {}", id);
                id
            }
            None => {
                let id = match self.history.unfinished_transaction()?.and_then(|t| t.id) {
                    Some(id) => {
                        info!("Resuming unfinished history transaction {}", id);
                        id
                    }
                    None => self.history.begin_transaction(&transaction.description())?,
                };
                transaction.resume(id);
                id
            }
        };

        let recorded: HashSet<InstanceId> = self
            .history
            .transaction_records(tx)?
            .iter()
            .map(|record| record.instance_id)
            .collect();

        let mut mismatches: Vec<Vec<Mismatch>> = vec![Vec::new(); transaction.len()];

        // Installs go first so replaced builds still count towards the class reason
        for (index, item) in transaction.items().iter().enumerate() {
            if let Some(pkg) = item.installed() {
                if let Some(mismatch) = self.verify_installed(tx, item, pkg, now_installed, &recorded)? {
                    mismatches[index].push(mismatch);
                }
            }
        }

        for (index, item) in transaction.items().iter().enumerate() {
            for pkg in item.erased() {
                if let Some(mismatch) = self.verify_erased(tx, item, pkg, now_installed)? {
                    mismatches[index].push(mismatch);
                }
            }
        }

        let mut outcomes = Vec::with_capacity(transaction.len());
        for (item, found) in transaction.items_mut().iter_mut().zip(mismatches) {
            if found.is_empty() {
                item.advance(ItemState::Verified);
            } else {
                item.advance(ItemState::Mismatched);
            }
            outcomes.push(ItemOutcome {
                action: item.action(),
                installed: item.installed().cloned(),
                state: item.state(),
                mismatches: found,
            });
        }

        let result = VerificationResult {
            transaction_id: tx,
            items: outcomes,
        };
        self.history.end_transaction(tx, result.is_success())?;

        if result.is_success() {
            info!("Transaction {} verified", tx);
        } else {
            warn!(
                "Transaction {} finished with {} mismatch(es)",
                tx,
                result.mismatches().count()
            );
        }
        Ok(result)
    }

    fn verify_installed(
        &mut self,
        tx: TransactionId,
        item: &TransactionItem,
        pkg: &PackageIdentity,
        now_installed: &[PackageIdentity],
        recorded: &HashSet<InstanceId>,
    ) -> Result<Option<Mismatch>> {
        let Some(actual) = now_installed.iter().find(|p| *p == pkg) else {
            warn!("{} was not installed", pkg);
            return Ok(Some(Mismatch::PackageNotInstalled(pkg.clone())));
        };

        // A reinstall needs a fresh instance; anything else keeps the one already installed
        let keep_installed = !item.erased().contains(pkg);
        let instance = match self.history.instance_for(pkg, tx, keep_installed)? {
            Some(id) => id,
            None => self.history.add_package(pkg)?,
        };

        if !recorded.contains(&instance) {
            self.history.begin_transaction_data(
                tx,
                instance,
                item.reason(),
                &installed_description(item.action()),
                false,
            )?;
        }

        let data = PackageData {
            reason: Some(item.reason()),
            from_repo: actual
                .origin_repo()
                .or(pkg.origin_repo())
                .map(|repo| format!("@{}", repo)),
            checksum: actual.checksum().or(pkg.checksum()).cloned(),
        };
        self.history.update_package_data(instance, tx, &data)?;

        debug!("Recorded {} as instance {}", pkg, instance);
        Ok(None)
    }

    fn verify_erased(
        &mut self,
        tx: TransactionId,
        item: &TransactionItem,
        pkg: &PackageIdentity,
        now_installed: &[PackageIdentity],
    ) -> Result<Option<Mismatch>> {
        let reinstalled = item.action() == Action::Reinstall && item.installed() == Some(pkg);
        if !reinstalled && now_installed.contains(pkg) {
            warn!("{} is still installed", pkg);
            return Ok(Some(Mismatch::PackageStillInstalled(pkg.clone())));
        }

        if self.history.removed_in(pkg, tx)? {
            return Ok(None);
        }

        match self.history.installed_instance(pkg, tx)? {
            Some(instance) => {
                self.history.mark_removed(instance, tx, item.installed().is_some())?;
            }
            None => debug!("{} has no installed instance to remove", pkg),
        }
        Ok(None)
    }
}

fn installed_description(action: Action) -> String {
    match action {
        Action::Install => "Installed",
        Action::Upgrade => "Upgraded",
        Action::Downgrade => "Downgraded",
        Action::Reinstall => "Reinstalled",
        Action::Erase | Action::Obsoleted => "Removed",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TransactionStatus;
    use crate::goal::SimpleGoal;
    use crate::package::{Checksum, ChecksumType};
    use crate::reason::{Reason, ReasonFlags};
    use crate::transaction::TransactionBuilder;

    fn pkg(nevra: &str) -> PackageIdentity {
        PackageIdentity::parse_nevra(nevra).unwrap()
    }

    fn build(history: &History, goal: &SimpleGoal) -> Transaction {
        let mut transaction = TransactionBuilder::new(history).build(goal).unwrap();
        transaction.mark_executing();
        transaction
    }

    #[test]
    fn test_verify_records_repo_reason_and_checksum() {
        let mut history = History::open_in_memory().unwrap();
        let checksum = Checksum::from_hex(ChecksumType::Md5, "68e9ded8ea25137c964a638f12e9987c").unwrap();
        let pepper = pkg("pepper-20-0.x86_64")
            .with_origin_repo("main")
            .with_checksum(checksum.clone());

        let goal = SimpleGoal::new().install(pepper.clone(), ReasonFlags::requested());
        let mut transaction = build(&history, &goal);

        let result = TransactionVerifier::new(&mut history)
            .verify(&mut transaction, &[pepper.clone()])
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.items[0].state, ItemState::Verified);
        assert_eq!(transaction.items()[0].state(), ItemState::Verified);

        let record = history.package(&pepper).unwrap();
        assert!(record.installed);
        assert_eq!(record.reason, Reason::User);
        assert_eq!(record.from_repo.as_deref(), Some("@main"));
        assert_eq!(record.checksum(), Some(&checksum));
        assert_eq!(
            history.transaction(result.transaction_id).unwrap().status,
            TransactionStatus::Complete
        );
    }

    #[test]
    fn test_verify_twice_is_idempotent() {
        let mut history = History::open_in_memory().unwrap();
        let goal = SimpleGoal::new()
            .install(pkg("mrkite-2-0.x86_64"), ReasonFlags::requested())
            .install(pkg("trampoline-2.1-1.noarch"), ReasonFlags::dependency());
        let mut transaction = build(&history, &goal);
        let now = vec![pkg("mrkite-2-0.x86_64"), pkg("trampoline-2.1-1.noarch")];

        let first = TransactionVerifier::new(&mut history).verify(&mut transaction, &now).unwrap();
        let rows = history.transaction_records(first.transaction_id).unwrap().len();

        let second = TransactionVerifier::new(&mut history).verify(&mut transaction, &now).unwrap();
        assert_eq!(first, second);
        assert_eq!(history.transaction_records(second.transaction_id).unwrap().len(), rows);
        assert_eq!(history.transactions().unwrap().len(), 1);
        assert_eq!(history.reason(&pkg("trampoline-2.1-1.noarch")).unwrap(), Reason::Dep);
    }

    #[test]
    fn test_recording_same_goal_twice_keeps_one_instance() {
        let mut history = History::open_in_memory().unwrap();
        let mrkite = pkg("mrkite-2-0.x86_64").with_origin_repo("main");
        let goal = SimpleGoal::new().install(mrkite.clone(), ReasonFlags::requested());

        let mut first = build(&history, &goal);
        let a = TransactionVerifier::new(&mut history).verify(&mut first, &[mrkite.clone()]).unwrap();
        let mut second = build(&history, &goal);
        let b = TransactionVerifier::new(&mut history).verify(&mut second, &[mrkite.clone()]).unwrap();

        assert!(a.is_success() && b.is_success());
        assert_ne!(a.transaction_id, b.transaction_id);
        let installed = history.installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].transaction_id, b.transaction_id);
        assert_eq!(
            history.transaction_records(b.transaction_id).unwrap()[0].instance_id,
            history.transaction_records(a.transaction_id).unwrap()[0].instance_id
        );
        assert_eq!(history.package(&mrkite).unwrap().from_repo.as_deref(), Some("@main"));
    }

    #[test]
    fn test_interrupted_verification_is_resumed() {
        let mut history = History::open_in_memory().unwrap();
        let mrkite = pkg("mrkite-2-0.x86_64");

        // The previous run stopped after recording the install
        let abandoned = history.begin_transaction("install 1").unwrap();
        let pid = history.add_package(&mrkite).unwrap();
        history
            .begin_transaction_data(abandoned, pid, Reason::User, "Installed", false)
            .unwrap();

        let goal = SimpleGoal::new().install(mrkite.clone(), ReasonFlags::requested());
        let mut transaction = build(&history, &goal);
        let result = TransactionVerifier::new(&mut history)
            .verify(&mut transaction, &[mrkite.clone()])
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.transaction_id, abandoned);
        assert_eq!(transaction.history_id(), Some(abandoned));
        assert_eq!(history.transactions().unwrap().len(), 1);
        assert_eq!(history.transaction(abandoned).unwrap().status, TransactionStatus::Complete);
        assert!(history.unfinished_transaction().unwrap().is_none());
        assert_eq!(history.transaction_records(abandoned).unwrap().len(), 1);
        assert_eq!(history.installed().unwrap().len(), 1);
    }

    #[test]
    fn test_resume_by_history_id() {
        let mut history = History::open_in_memory().unwrap();
        let pepper = pkg("pepper-20-0.x86_64");
        let goal = SimpleGoal::new().install(pepper.clone(), ReasonFlags::requested());

        let tx = history.begin_transaction("install 1").unwrap();
        let mut transaction = build(&history, &goal);
        transaction.resume(tx);
        let result = TransactionVerifier::new(&mut history)
            .verify(&mut transaction, &[pepper.clone()])
            .unwrap();
        assert_eq!(result.transaction_id, tx);
        assert!(history.package(&pepper).unwrap().installed);

        let mut unknown = build(&history, &goal);
        unknown.resume(tx + 100);
        let result = TransactionVerifier::new(&mut history).verify(&mut unknown, &[pepper.clone()]);
        assert!(matches!(result, Err(crate::error::Error::NotFound(_))));
    }

    #[test]
    fn test_missing_package_is_a_mismatch() {
        let mut history = History::open_in_memory().unwrap();
        let goal = SimpleGoal::new()
            .install(pkg("mrkite-2-0.x86_64"), ReasonFlags::requested())
            .install(pkg("trampoline-2.1-1.noarch"), ReasonFlags::dependency());
        let mut transaction = build(&history, &goal);

        let result = TransactionVerifier::new(&mut history)
            .verify(&mut transaction, &[pkg("mrkite-2-0.x86_64")])
            .unwrap();

        assert!(!result.is_success());
        assert_eq!(result.items[0].state, ItemState::Verified);
        assert_eq!(result.items[1].state, ItemState::Mismatched);
        assert_eq!(
            result.mismatches().collect::<Vec<_>>(),
            vec![&Mismatch::PackageNotInstalled(pkg("trampoline-2.1-1.noarch"))]
        );
        assert!(history.package(&pkg("mrkite-2-0.x86_64")).unwrap().installed);
        assert!(history.package(&pkg("trampoline-2.1-1.noarch")).is_err());
        assert_eq!(
            history.transaction(result.transaction_id).unwrap().status,
            TransactionStatus::Mismatched
        );
    }

    #[test]
    fn test_upgrade_replaces_old_build() {
        let mut history = History::open_in_memory().unwrap();
        let old = pkg("hole-1-1.x86_64");
        let mut first = build(&history, &SimpleGoal::new().install(old.clone(), ReasonFlags::requested()));
        TransactionVerifier::new(&mut history).verify(&mut first, &[old.clone()]).unwrap();

        let new = pkg("hole-2-1.x86_64");
        let goal = SimpleGoal::new()
            .install(new.clone(), ReasonFlags::dependency())
            .erase(old.clone());
        let mut upgrade = build(&history, &goal);
        let result = TransactionVerifier::new(&mut history)
            .verify(&mut upgrade, &[new.clone()])
            .unwrap();

        assert!(result.is_success());
        let removed = history.package(&old).unwrap();
        assert!(!removed.installed);
        assert!(removed.replaced_by);
        assert_eq!(history.reason(&new).unwrap(), Reason::User);
        assert_eq!(history.installed().unwrap().len(), 1);
    }

    #[test]
    fn test_erased_package_still_installed() {
        let mut history = History::open_in_memory().unwrap();
        let pepper = pkg("pepper-20-0.x86_64");
        let mut first = build(&history, &SimpleGoal::new().install(pepper.clone(), ReasonFlags::requested()));
        TransactionVerifier::new(&mut history).verify(&mut first, &[pepper.clone()]).unwrap();

        let mut removal = build(&history, &SimpleGoal::new().erase_requested(pepper.clone()));
        let result = TransactionVerifier::new(&mut history)
            .verify(&mut removal, &[pepper.clone()])
            .unwrap();

        assert_eq!(
            result.items[0].mismatches,
            vec![Mismatch::PackageStillInstalled(pepper.clone())]
        );
        assert!(history.package(&pepper).unwrap().installed);
    }

    #[test]
    fn test_reinstall_keeps_package_installed() {
        let mut history = History::open_in_memory().unwrap();
        let pepper = pkg("pepper-20-0.x86_64");
        let mut first = build(&history, &SimpleGoal::new().install(pepper.clone(), ReasonFlags::requested()));
        TransactionVerifier::new(&mut history).verify(&mut first, &[pepper.clone()]).unwrap();

        let goal = SimpleGoal::new()
            .install(pepper.clone(), ReasonFlags::default())
            .erase(pepper.clone());
        let mut reinstall = build(&history, &goal);
        assert_eq!(reinstall.items()[0].action(), Action::Reinstall);

        let result = TransactionVerifier::new(&mut history)
            .verify(&mut reinstall, &[pepper.clone()])
            .unwrap();
        assert!(result.is_success());

        let record = history.package(&pepper).unwrap();
        assert!(record.installed);
        assert_eq!(record.reason, Reason::User);
        assert_eq!(history.installed().unwrap().len(), 1);
        assert_eq!(history.transaction_records(result.transaction_id).unwrap().len(), 2);
    }
}
