// src/transaction/mod.rs

//! Package transactions
//!
//! A `Transaction` is the concrete list of package operations derived from
//! a solver goal. Each `TransactionItem` touches one name+arch slot on the
//! installed side and any number of packages on the erased side; no two
//! items in a transaction may touch the same slot.
//!
//! Lifecycle of an item: `Built` when the builder emits it, `Executing`
//! while the external installer runs, then `Verified` or `Mismatched` once
//! the verifier has compared the plan with the real system.

mod builder;
mod engine;
mod verify;

pub use builder::TransactionBuilder;
pub use engine::{Installer, RunOutcome, TransactionEngine};
pub use verify::{ItemOutcome, Mismatch, TransactionVerifier, VerificationResult};

use crate::error::{Error, Result};
use crate::history::TransactionId;
use crate::package::{PackageClass, PackageIdentity};
use crate::reason::Reason;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// What an item does to the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Install,
    Erase,
    Upgrade,
    Downgrade,
    Reinstall,
    Obsoleted,
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Install => "install",
            Action::Erase => "erase",
            Action::Upgrade => "upgrade",
            Action::Downgrade => "downgrade",
            Action::Reinstall => "reinstall",
            Action::Obsoleted => "obsoleted",
        }
    }

    /// Whether the item puts a package on the system
    pub fn installs_package(&self) -> bool {
        !matches!(self, Action::Erase | Action::Obsoleted)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Built,
    Executing,
    Verified,
    Mismatched,
}

impl ItemState {
    fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Verified | ItemState::Mismatched)
    }
}

/// One package-level operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionItem {
    action: Action,
    installed: Option<PackageIdentity>,
    erased: Vec<PackageIdentity>,
    reason: Reason,
    obsoletes: Vec<PackageIdentity>,
    state: ItemState,
}

impl TransactionItem {
    fn new(
        action: Action,
        installed: Option<PackageIdentity>,
        erased: Vec<PackageIdentity>,
        obsoletes: Vec<PackageIdentity>,
        reason: Reason,
    ) -> Self {
        Self {
            action,
            installed,
            erased,
            reason,
            obsoletes,
            state: ItemState::Built,
        }
    }

    /// Fresh install, possibly obsoleting other packages
    pub fn install(pkg: PackageIdentity, obsoletes: Vec<PackageIdentity>, reason: Reason) -> Self {
        Self::new(Action::Install, Some(pkg), obsoletes.clone(), obsoletes, reason)
    }

    /// Put `new` in place of older builds of the same slot
    ///
    /// The action follows from the highest replaced build: an upgrade when
    /// `new` is newer, a downgrade when it is older, a reinstall when equal.
    /// With nothing replaced this is a plain install.
    pub fn replacing(
        new: PackageIdentity,
        replaced: Vec<PackageIdentity>,
        obsoletes: Vec<PackageIdentity>,
        reason: Reason,
    ) -> Self {
        let Some(highest) = replaced.iter().max_by(|a, b| a.compare_evr(b)) else {
            return Self::install(new, obsoletes, reason);
        };
        let action = match new.compare_evr(highest) {
            Ordering::Less => Action::Downgrade,
            Ordering::Equal => Action::Reinstall,
            Ordering::Greater => Action::Upgrade,
        };
        let mut erased = replaced;
        erased.extend(obsoletes.iter().cloned());
        Self::new(action, Some(new), erased, obsoletes, reason)
    }

    /// Remove a package
    pub fn erase(pkg: PackageIdentity, reason: Reason) -> Self {
        Self::new(Action::Erase, None, vec![pkg], Vec::new(), reason)
    }

    /// Remove a package obsoleted by something outside this transaction
    pub fn obsoleted(pkg: PackageIdentity, reason: Reason) -> Self {
        Self::new(Action::Obsoleted, None, vec![pkg.clone()], vec![pkg], reason)
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Package this item puts on the system
    pub fn installed(&self) -> Option<&PackageIdentity> {
        self.installed.as_ref()
    }

    /// Packages this item takes off the system
    pub fn erased(&self) -> &[PackageIdentity] {
        &self.erased
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// Packages removed because this item's package obsoletes them
    pub fn obsoletes(&self) -> &[PackageIdentity] {
        &self.obsoletes
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    /// Packages installed by this item (zero or one)
    pub fn installs(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.installed.iter()
    }

    /// Packages removed by this item
    pub fn removes(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.erased.iter()
    }

    /// Every name+arch slot this item touches
    pub fn classes(&self) -> HashSet<PackageClass> {
        self.installed
            .iter()
            .chain(self.erased.iter())
            .map(PackageIdentity::class)
            .collect()
    }

    /// Move forward in the lifecycle; terminal states never change
    pub(crate) fn advance(&mut self, next: ItemState) {
        if !self.state.is_terminal() {
            self.state = next;
        }
    }
}

impl fmt::Display for TransactionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)?;
        if let Some(pkg) = &self.installed {
            write!(f, " {}", pkg)?;
        }
        if !self.erased.is_empty() {
            let erased: Vec<String> = self.erased.iter().map(ToString::to_string).collect();
            if self.installed.is_some() {
                f.write_str(" replacing")?;
            }
            write!(f, " {}", erased.join(", "))?;
        }
        write!(f, " ({})", self.reason)
    }
}

/// Ordered set of items, at most one per name+arch slot
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transaction {
    items: Vec<TransactionItem>,
    history_id: Option<TransactionId>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item, refusing it if it touches a slot already in the transaction
    pub fn push(&mut self, item: TransactionItem) -> Result<()> {
        let classes = item.classes();
        if let Some(existing) = self
            .items
            .iter()
            .find(|other| !other.classes().is_disjoint(&classes))
        {
            let class = existing
                .classes()
                .intersection(&classes)
                .next()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(Error::ConflictingTransactionItem(format!(
                "{} (already in '{}', rejected '{}')",
                class, existing, item
            )));
        }

        self.items.push(item);
        Ok(())
    }

    pub fn items(&self) -> &[TransactionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items with the given action
    pub fn items_of(&self, action: Action) -> impl Iterator<Item = &TransactionItem> {
        self.items.iter().filter(move |item| item.action == action)
    }

    /// Every package the transaction installs
    pub fn install_set(&self) -> Vec<&PackageIdentity> {
        self.items.iter().flat_map(TransactionItem::installs).collect()
    }

    /// Every package the transaction removes
    pub fn remove_set(&self) -> Vec<&PackageIdentity> {
        self.items.iter().flat_map(TransactionItem::removes).collect()
    }

    /// History transaction this plan was recorded under, once verified
    pub fn history_id(&self) -> Option<TransactionId> {
        self.history_id
    }

    /// Record into an existing history transaction instead of a new one
    ///
    /// Used to finish a verification that was interrupted, given the id of
    /// the history transaction it had begun.
    pub fn resume(&mut self, id: TransactionId) {
        self.history_id = Some(id);
    }

    /// Human-readable summary used as the history description
    pub fn description(&self) -> String {
        let mut counts: Vec<(Action, usize)> = Vec::new();
        for item in &self.items {
            match counts.iter_mut().find(|(action, _)| *action == item.action) {
                Some((_, count)) => *count += 1,
                None => counts.push((item.action, 1)),
            }
        }
        if counts.is_empty() {
            return "empty transaction".to_string();
        }
        counts
            .iter()
            .map(|(action, count)| format!("{} {}", action, count))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Hand the items to the installer
    pub fn mark_executing(&mut self) {
        for item in &mut self.items {
            item.advance(ItemState::Executing);
        }
    }

    pub(crate) fn items_mut(&mut self) -> &mut [TransactionItem] {
        &mut self.items
    }
}
