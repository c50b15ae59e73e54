// src/transaction/builder.rs

//! Turn a solved goal into a transaction
//!
//! The builder pairs installs with erasures of the same name and arch into
//! upgrades, downgrades and reinstalls (against the highest replaced build), folds obsoleted packages into the
//! item whose package obsoletes them, and assigns every item a reason from
//! the goal's flags merged with what the history already records.

use super::{Transaction, TransactionItem};
use crate::error::Result;
use crate::goal::Goal;
use crate::history::History;
use crate::package::PackageIdentity;
use crate::reason::{self, Reason};
use std::collections::HashSet;
use tracing::{debug, info};

/// Builds transactions against a read-only view of the history
pub struct TransactionBuilder<'a> {
    history: &'a History,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(history: &'a History) -> Self {
        Self { history }
    }

    /// Build the transaction for `goal`
    ///
    /// Items come out in goal order: every install first, then erasures,
    /// then packages obsoleted by something outside the transaction.
    pub fn build(&self, goal: &dyn Goal) -> Result<Transaction> {
        let installs = goal.installs();
        let erasures = goal.erasures();
        let obsoletes = goal.obsoletes();

        let mut transaction = Transaction::new();
        let mut consumed: HashSet<PackageIdentity> = HashSet::new();

        for pkg in &installs {
            // Every older build of the slot goes out with this one
            let replaced: Vec<PackageIdentity> = erasures
                .iter()
                .filter(|old| old.same_class(pkg) && !consumed.contains(*old))
                .cloned()
                .collect();
            consumed.extend(replaced.iter().cloned());

            let mut obsoleted = Vec::new();
            for victim in goal.obsoleted_by(pkg) {
                if consumed.insert(victim.clone()) {
                    obsoleted.push(victim);
                }
            }

            let reason = self.reason_for(goal, pkg)?;
            let item = TransactionItem::replacing(pkg.clone(), replaced, obsoleted, reason);
            debug!("Planned {}", item);
            transaction.push(item)?;
        }

        let orphaned: Vec<&PackageIdentity> = obsoletes
            .iter()
            .filter(|(victim, by)| !consumed.contains(victim) && !installs.contains(by))
            .map(|(victim, _)| victim)
            .collect();

        for pkg in &erasures {
            if consumed.contains(pkg) || orphaned.contains(&pkg) {
                continue;
            }
            consumed.insert(pkg.clone());

            let item = TransactionItem::erase(pkg.clone(), self.reason_for(goal, pkg)?);
            debug!("Planned {}", item);
            transaction.push(item)?;
        }

        for pkg in orphaned {
            if !consumed.insert(pkg.clone()) {
                continue;
            }
            let item = TransactionItem::obsoleted(pkg.clone(), self.reason_for(goal, pkg)?);
            debug!("Planned {}", item);
            transaction.push(item)?;
        }

        info!("Built transaction: {}", transaction.description());
        Ok(transaction)
    }

    fn reason_for(&self, goal: &dyn Goal, pkg: &PackageIdentity) -> Result<Reason> {
        let prior = self.history.class_reason(pkg.name(), pkg.arch())?;
        Ok(reason::resolve(goal.flags(pkg), prior))
    }
}
