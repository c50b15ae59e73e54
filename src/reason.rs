// src/reason.rs

//! Install reasons
//!
//! Every installed package carries one reason saying why it is on the
//! system. Reasons only ever escalate while a package stays installed:
//! a dependency the user later asks for becomes user-installed, but a
//! user-installed package pulled in again as a dependency stays that way.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Why a package is installed, ordered from lowest to highest precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reason {
    /// Leftover nothing depends on anymore
    Clean,
    /// Pulled in by a weak dependency (Recommends/Supplements)
    WeakDep,
    /// Pulled in by a hard dependency
    Dep,
    /// Installed as a member of a group
    Group,
    /// Explicitly requested by the user
    User,
}

impl Reason {
    pub fn as_str(&self) -> &str {
        match self {
            Reason::Clean => "clean",
            Reason::WeakDep => "weak-dep",
            Reason::Dep => "dep",
            Reason::Group => "group",
            Reason::User => "user",
        }
    }

    /// Merge with a previously recorded reason; the higher precedence wins
    pub fn escalate(self, prior: Option<Reason>) -> Reason {
        match prior {
            Some(prior) => self.max(prior),
            None => self,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "clean" => Ok(Reason::Clean),
            "weak-dep" => Ok(Reason::WeakDep),
            "dep" => Ok(Reason::Dep),
            "group" => Ok(Reason::Group),
            "user" => Ok(Reason::User),
            _ => Err(format!("Invalid reason: {}", s)),
        }
    }
}

/// How the solver came to include a package
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonFlags {
    /// Named directly on the command line
    pub requested: bool,
    /// Pulled in through a group install
    pub group: bool,
    /// Pulled in to satisfy another package's dependency
    pub dependency: bool,
    /// The dependency that pulled it in is weak
    pub weak: bool,
}

impl ReasonFlags {
    pub fn requested() -> Self {
        Self {
            requested: true,
            ..Self::default()
        }
    }

    pub fn group() -> Self {
        Self {
            group: true,
            ..Self::default()
        }
    }

    pub fn dependency() -> Self {
        Self {
            dependency: true,
            ..Self::default()
        }
    }

    pub fn weak_dependency() -> Self {
        Self {
            dependency: true,
            weak: true,
            ..Self::default()
        }
    }
}

/// Compute the reason for a package and merge it with what history knows
pub fn resolve(flags: ReasonFlags, prior: Option<Reason>) -> Reason {
    let computed = if flags.requested {
        Reason::User
    } else if flags.group {
        Reason::Group
    } else if flags.weak {
        Reason::WeakDep
    } else if flags.dependency {
        Reason::Dep
    } else {
        Reason::Clean
    };

    computed.escalate(prior)
}
