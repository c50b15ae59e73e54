// src/repository.rs

//! Repository configuration lookup
//!
//! The history store only needs one question answered about repositories:
//! is a given repository id still configured? Anything that can answer it
//! implements `RepositoryConfig`, so callers can pass the database-backed
//! set, a set loaded from their own configuration, or a test double.

use crate::db::models::Repository;
use crate::error::Result;
use rusqlite::Connection;
use std::collections::HashSet;

/// Source of the currently configured repository ids
pub trait RepositoryConfig {
    /// Whether `repo_id` names a configured repository
    fn contains(&self, repo_id: &str) -> bool;
}

impl RepositoryConfig for HashSet<String> {
    fn contains(&self, repo_id: &str) -> bool {
        HashSet::contains(self, repo_id)
    }
}

impl RepositoryConfig for [String] {
    fn contains(&self, repo_id: &str) -> bool {
        self.iter().any(|r| r == repo_id)
    }
}

impl RepositoryConfig for Vec<String> {
    fn contains(&self, repo_id: &str) -> bool {
        self.as_slice().iter().any(|r| r == repo_id)
    }
}

impl RepositoryConfig for [&str] {
    fn contains(&self, repo_id: &str) -> bool {
        self.iter().any(|r| *r == repo_id)
    }
}

/// Snapshot of the enabled repositories registered in the database
#[derive(Debug, Clone, Default)]
pub struct ConfiguredRepositories {
    names: HashSet<String>,
}

impl ConfiguredRepositories {
    /// Load the enabled repositories
    pub fn load(conn: &Connection) -> Result<Self> {
        let names = Repository::list_enabled(conn)?
            .into_iter()
            .map(|r| r.name)
            .collect();
        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl RepositoryConfig for ConfiguredRepositories {
    fn contains(&self, repo_id: &str) -> bool {
        self.names.contains(repo_id)
    }
}
