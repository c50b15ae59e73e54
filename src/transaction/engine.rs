// src/transaction/engine.rs

//! Build, execute and verify in one pass
//!
//! The engine owns the history for the duration of a run, so callers hold
//! the exclusive writer role by holding the engine. The actual package
//! installation is delegated to an `Installer`.

use super::{Transaction, TransactionBuilder, TransactionVerifier, VerificationResult};
use crate::error::{Error, Result};
use crate::goal::Goal;
use crate::history::History;
use crate::package::PackageIdentity;
use tracing::{info, warn};

/// The component that really changes the system
pub trait Installer {
    /// Apply the transaction. A failure may leave it partially applied.
    fn execute(&mut self, transaction: &Transaction) -> Result<()>;

    /// Packages present on the system right now
    fn installed_packages(&self) -> Result<Vec<PackageIdentity>>;
}

/// Everything a run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub transaction: Transaction,
    pub verification: VerificationResult,
    /// Error the installer reported, if any; the history still reflects what happened
    pub execution_error: Option<Error>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.execution_error.is_none() && self.verification.is_success()
    }
}

pub struct TransactionEngine<'a> {
    history: &'a mut History,
}

impl<'a> TransactionEngine<'a> {
    pub fn new(history: &'a mut History) -> Self {
        Self { history }
    }

    /// Turn `goal` into a transaction, run it through `installer` and record the result
    ///
    /// The system is verified even when the installer fails, so packages
    /// that did get installed before the failure are recorded.
    pub fn run(&mut self, goal: &dyn Goal, installer: &mut dyn Installer) -> Result<RunOutcome> {
        let mut transaction = TransactionBuilder::new(&*self.history).build(goal)?;
        transaction.mark_executing();

        info!("Executing {}", transaction.description());
        let execution_error = match installer.execute(&transaction) {
            Ok(()) => None,
            Err(e) => {
                warn!("Installer failed: {}", e);
                Some(e)
            }
        };

        let now_installed = installer.installed_packages()?;
        let verification =
            TransactionVerifier::new(&mut *self.history).verify(&mut transaction, &now_installed)?;

        Ok(RunOutcome {
            transaction,
            verification,
            execution_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::SimpleGoal;
    use crate::reason::{Reason, ReasonFlags};
    use crate::transaction::{ItemState, Mismatch};

    fn pkg(nevra: &str) -> PackageIdentity {
        PackageIdentity::parse_nevra(nevra).unwrap()
    }

    /// Installer double keeping the system in memory
    #[derive(Default)]
    struct FakeInstaller {
        system: Vec<PackageIdentity>,
        broken: Option<PackageIdentity>,
    }

    impl Installer for FakeInstaller {
        fn execute(&mut self, transaction: &Transaction) -> Result<()> {
            for item in transaction.items() {
                for pkg in item.removes() {
                    self.system.retain(|p| p != pkg);
                }
                for pkg in item.installs() {
                    if self.broken.as_ref() == Some(pkg) {
                        return Err(Error::Installer(format!("scriptlet of {} failed", pkg)));
                    }
                    self.system.push(pkg.clone());
                }
            }
            Ok(())
        }

        fn installed_packages(&self) -> Result<Vec<PackageIdentity>> {
            Ok(self.system.clone())
        }
    }

    #[test]
    fn test_run_records_history() {
        let mut history = History::open_in_memory().unwrap();
        let mut installer = FakeInstaller::default();

        let goal = SimpleGoal::new()
            .install(pkg("mrkite-2-0.x86_64"), ReasonFlags::requested())
            .install(pkg("trampoline-2.1-1.noarch"), ReasonFlags::dependency());
        let outcome = TransactionEngine::new(&mut history).run(&goal, &mut installer).unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.transaction.history_id(), Some(outcome.verification.transaction_id));
        assert!(
            outcome
                .transaction
                .items()
                .iter()
                .all(|item| item.state() == ItemState::Verified)
        );
        assert_eq!(history.reason(&pkg("mrkite-2-0.x86_64")).unwrap(), Reason::User);
        assert_eq!(history.reason(&pkg("trampoline-2.1-1.noarch")).unwrap(), Reason::Dep);
    }

    #[test]
    fn test_run_after_installer_failure() {
        let mut history = History::open_in_memory().unwrap();
        let mut installer = FakeInstaller {
            broken: Some(pkg("trampoline-2.1-1.noarch")),
            ..Default::default()
        };

        let goal = SimpleGoal::new()
            .install(pkg("mrkite-2-0.x86_64"), ReasonFlags::requested())
            .install(pkg("trampoline-2.1-1.noarch"), ReasonFlags::dependency());
        let outcome = TransactionEngine::new(&mut history).run(&goal, &mut installer).unwrap();

        assert!(!outcome.is_success());
        assert!(matches!(outcome.execution_error, Some(Error::Installer(_))));
        assert_eq!(
            outcome.verification.mismatches().collect::<Vec<_>>(),
            vec![&Mismatch::PackageNotInstalled(pkg("trampoline-2.1-1.noarch"))]
        );
        // What did get installed is on record
        assert!(history.package(&pkg("mrkite-2-0.x86_64")).unwrap().installed);
    }

    #[test]
    fn test_dependency_later_requested_becomes_user() {
        let mut history = History::open_in_memory().unwrap();
        let mut installer = FakeInstaller::default();

        let goal = SimpleGoal::new()
            .install(pkg("mrkite-2-0.x86_64"), ReasonFlags::requested())
            .install(pkg("trampoline-2.1-1.noarch"), ReasonFlags::dependency());
        TransactionEngine::new(&mut history).run(&goal, &mut installer).unwrap();

        let upgrade = SimpleGoal::new()
            .install(pkg("trampoline-2.2-1.noarch"), ReasonFlags::requested())
            .erase(pkg("trampoline-2.1-1.noarch"));
        let outcome = TransactionEngine::new(&mut history).run(&upgrade, &mut installer).unwrap();

        assert!(outcome.is_success());
        assert_eq!(history.reason(&pkg("trampoline-2.2-1.noarch")).unwrap(), Reason::User);
        assert!(!history.package(&pkg("trampoline-2.1-1.noarch")).unwrap().installed);
    }
}
