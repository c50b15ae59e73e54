// src/error.rs

use thiserror::Error;

/// Core error types for pkgledger
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Unparseable package identity (name, epoch, version, release)
    #[error("Malformed package identity: {0}")]
    MalformedIdentity(String),

    /// Checksum type or hex data that cannot be decoded
    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    /// The same installation instance was registered twice
    #[error("Duplicate installation instance: {0}")]
    DuplicateInstance(String),

    /// The goal produced two operations on one package name+arch
    #[error("Conflicting transaction item for {0}")]
    ConflictingTransactionItem(String),

    /// History has no record for the queried package
    #[error("Not found in history: {0}")]
    NotFound(String),

    /// The external installer reported a failure
    #[error("Installer error: {0}")]
    Installer(String),
}

/// Result type alias using pkgledger's Error type
pub type Result<T> = std::result::Result<T, Error>;
