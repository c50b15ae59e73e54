// src/goal.rs

//! Solver output consumed by the transaction builder
//!
//! The dependency solver is an external collaborator. Whatever it is, it
//! hands over its decision through the `Goal` trait: flat lists of packages
//! to install and to erase, which packages obsolete which, and how each
//! package came to be included.

use crate::package::PackageIdentity;
use crate::reason::ReasonFlags;
use serde::Deserialize;
use std::collections::HashMap;

/// Read-only view of a solved goal
pub trait Goal {
    /// Packages that will be present afterwards (new installs, upgrade and downgrade targets)
    fn installs(&self) -> Vec<PackageIdentity>;

    /// Packages that go away (plain removals and the builds being replaced)
    fn erasures(&self) -> Vec<PackageIdentity>;

    /// `(obsoleted, obsoleter)` pairs
    fn obsoletes(&self) -> Vec<(PackageIdentity, PackageIdentity)>;

    /// How the solver came to include `pkg`
    fn flags(&self, pkg: &PackageIdentity) -> ReasonFlags;

    /// Packages obsoleted by `pkg`
    fn obsoleted_by(&self, pkg: &PackageIdentity) -> Vec<PackageIdentity> {
        self.obsoletes()
            .into_iter()
            .filter(|(_, obsoleter)| obsoleter == pkg)
            .map(|(obsoleted, _)| obsoleted)
            .collect()
    }
}

/// A goal held in memory, built by hand or read from JSON
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "GoalFile")]
pub struct SimpleGoal {
    installs: Vec<PackageIdentity>,
    erasures: Vec<PackageIdentity>,
    obsoletes: Vec<(PackageIdentity, PackageIdentity)>,
    flags: HashMap<PackageIdentity, ReasonFlags>,
}

impl SimpleGoal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package to install
    pub fn install(mut self, pkg: PackageIdentity, flags: ReasonFlags) -> Self {
        self.flags.insert(pkg.clone(), flags);
        self.installs.push(pkg);
        self
    }

    /// Add a package to erase
    pub fn erase(mut self, pkg: PackageIdentity) -> Self {
        self.erasures.push(pkg);
        self
    }

    /// Add a package to erase that the user asked to remove
    pub fn erase_requested(mut self, pkg: PackageIdentity) -> Self {
        self.flags.insert(pkg.clone(), ReasonFlags::requested());
        self.erasures.push(pkg);
        self
    }

    /// Record that `obsoleter` obsoletes `obsoleted`
    pub fn obsolete(mut self, obsoleted: PackageIdentity, obsoleter: PackageIdentity) -> Self {
        self.obsoletes.push((obsoleted, obsoleter));
        self
    }
}

impl Goal for SimpleGoal {
    fn installs(&self) -> Vec<PackageIdentity> {
        self.installs.clone()
    }

    fn erasures(&self) -> Vec<PackageIdentity> {
        self.erasures.clone()
    }

    fn obsoletes(&self) -> Vec<(PackageIdentity, PackageIdentity)> {
        self.obsoletes.clone()
    }

    fn flags(&self, pkg: &PackageIdentity) -> ReasonFlags {
        self.flags.get(pkg).copied().unwrap_or_default()
    }
}

/// JSON layout of a goal file
#[derive(Debug, Deserialize)]
struct GoalFile {
    #[serde(default)]
    install: Vec<GoalEntry>,
    #[serde(default)]
    erase: Vec<GoalEntry>,
    #[serde(default)]
    obsolete: Vec<ObsoleteEntry>,
}

#[derive(Debug, Deserialize)]
struct GoalEntry {
    #[serde(flatten)]
    pkg: PackageIdentity,
    #[serde(flatten)]
    flags: ReasonFlags,
}

#[derive(Debug, Deserialize)]
struct ObsoleteEntry {
    obsoleted: PackageIdentity,
    by: PackageIdentity,
}

impl From<GoalFile> for SimpleGoal {
    fn from(file: GoalFile) -> Self {
        let mut goal = SimpleGoal::new();
        for entry in file.install {
            goal = goal.install(entry.pkg, entry.flags);
        }
        for entry in file.erase {
            goal.flags.insert(entry.pkg.clone(), entry.flags);
            goal.erasures.push(entry.pkg);
        }
        for entry in file.obsolete {
            goal = goal.obsolete(entry.obsoleted, entry.by);
        }
        goal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(nevra: &str) -> PackageIdentity {
        PackageIdentity::parse_nevra(nevra).unwrap()
    }

    #[test]
    fn test_builder_and_flags() {
        let goal = SimpleGoal::new()
            .install(pkg("mrkite-2-0.x86_64"), ReasonFlags::requested())
            .install(pkg("trampoline-2.1-1.noarch"), ReasonFlags::dependency())
            .erase(pkg("pepper-20-0.x86_64"));

        assert_eq!(goal.installs().len(), 2);
        assert_eq!(goal.erasures(), vec![pkg("pepper-20-0.x86_64")]);
        assert!(goal.flags(&pkg("mrkite-2-0.x86_64")).requested);
        assert!(goal.flags(&pkg("trampoline-2.1-1.noarch")).dependency);
        assert_eq!(goal.flags(&pkg("pepper-20-0.x86_64")), ReasonFlags::default());
    }

    #[test]
    fn test_obsoleted_by() {
        let goal = SimpleGoal::new()
            .install(pkg("hole-2-1.x86_64"), ReasonFlags::requested())
            .obsolete(pkg("tour-5-0.noarch"), pkg("hole-2-1.x86_64"));

        assert_eq!(goal.obsoleted_by(&pkg("hole-2-1.x86_64")), vec![pkg("tour-5-0.noarch")]);
        assert!(goal.obsoleted_by(&pkg("tour-5-0.noarch")).is_empty());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "install": [
                {"name": "hole", "evr": "2-1", "arch": "x86_64", "origin_repo": "updates", "requested": true}
            ],
            "erase": [
                {"name": "hole", "evr": "1-1", "arch": "x86_64"}
            ],
            "obsolete": [
                {"obsoleted": {"name": "tour", "evr": "5-0", "arch": "noarch"},
                 "by": {"name": "hole", "evr": "2-1", "arch": "x86_64"}}
            ]
        }"#;

        let goal: SimpleGoal = serde_json::from_str(json).unwrap();
        assert_eq!(goal.installs(), vec![pkg("hole-2-1.x86_64")]);
        assert_eq!(goal.installs()[0].origin_repo(), Some("updates"));
        assert!(goal.flags(&pkg("hole-2-1.x86_64")).requested);
        assert_eq!(goal.erasures(), vec![pkg("hole-1-1.x86_64")]);
        assert_eq!(goal.obsoletes().len(), 1);
    }
}
