// src/package.rs

//! Package identity
//!
//! A `PackageIdentity` names one exact build of a package. Two identities are
//! the same package when name, epoch, version, release and architecture
//! match; checksum and origin repository are carried along for the history
//! ledger but never take part in equality.

use crate::error::{Error, Result};
use crate::version::Evr;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Digest algorithm of a package checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumType {
    pub fn as_str(&self) -> &str {
        match self {
            ChecksumType::Md5 => "md5",
            ChecksumType::Sha1 => "sha1",
            ChecksumType::Sha256 => "sha256",
            ChecksumType::Sha512 => "sha512",
        }
    }

    /// Digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            ChecksumType::Md5 => 16,
            ChecksumType::Sha1 => 20,
            ChecksumType::Sha256 => 32,
            ChecksumType::Sha512 => 64,
        }
    }
}

impl FromStr for ChecksumType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "md5" => Ok(ChecksumType::Md5),
            "sha1" => Ok(ChecksumType::Sha1),
            "sha256" => Ok(ChecksumType::Sha256),
            "sha512" => Ok(ChecksumType::Sha512),
            _ => Err(Error::InvalidChecksum(format!("unknown checksum type: {}", s))),
        }
    }
}

/// Package checksum: algorithm plus raw digest bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checksum {
    kind: ChecksumType,
    data: Vec<u8>,
}

impl Checksum {
    /// Wrap raw digest bytes, checking the length against the algorithm
    pub fn new(kind: ChecksumType, data: Vec<u8>) -> Result<Self> {
        if data.len() != kind.digest_len() {
            return Err(Error::InvalidChecksum(format!(
                "{} digest must be {} bytes, got {}",
                kind.as_str(),
                kind.digest_len(),
                data.len()
            )));
        }
        Ok(Self { kind, data })
    }

    /// Decode a hex digest
    pub fn from_hex(kind: ChecksumType, hex_data: &str) -> Result<Self> {
        let data = hex::decode(hex_data)
            .map_err(|e| Error::InvalidChecksum(format!("bad hex '{}': {}", hex_data, e)))?;
        Self::new(kind, data)
    }

    pub fn kind(&self) -> ChecksumType {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Lowercase hex encoding of the digest
    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.to_hex())
    }
}

impl FromStr for Checksum {
    type Err = Error;

    /// Parse `type:hex`
    fn from_str(s: &str) -> Result<Self> {
        let (kind, data) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidChecksum(format!("expected type:hex, got '{}'", s)))?;
        Self::from_hex(kind.parse()?, data)
    }
}

impl TryFrom<String> for Checksum {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Checksum> for String {
    fn from(checksum: Checksum) -> Self {
        checksum.to_string()
    }
}

/// Identity class of a package: one slot per name and architecture
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageClass {
    pub name: String,
    pub arch: String,
}

impl fmt::Display for PackageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.arch)
    }
}

/// Immutable description of one exact package build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageIdentity {
    name: String,
    evr: Evr,
    arch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<Checksum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin_repo: Option<String>,
}

impl PackageIdentity {
    /// Create an identity from a name, an `[epoch:]version-release` string and an arch
    pub fn new(name: &str, evr: &str, arch: &str) -> Result<Self> {
        Self::from_evr(name, Evr::parse(evr)?, arch)
    }

    /// Create an identity from already separated version fields
    pub fn from_parts(
        name: &str,
        epoch: Option<u32>,
        version: &str,
        release: &str,
        arch: &str,
    ) -> Result<Self> {
        Self::from_evr(name, Evr::new(epoch, version, release)?, arch)
    }

    fn from_evr(name: &str, evr: Evr, arch: &str) -> Result<Self> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(Error::MalformedIdentity(format!("invalid name '{}'", name)));
        }
        if arch.is_empty() || arch.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '_')) {
            return Err(Error::MalformedIdentity(format!("invalid arch '{}'", arch)));
        }

        Ok(Self {
            name: name.to_string(),
            evr,
            arch: arch.to_string(),
            checksum: None,
            origin_repo: None,
        })
    }

    /// Parse `name-[epoch:]version-release.arch`
    pub fn parse_nevra(s: &str) -> Result<Self> {
        let malformed = || {
            Error::MalformedIdentity(format!(
                "expected name-version-release.arch, got '{}'",
                s
            ))
        };

        let (nevr, arch) = s.rsplit_once('.').ok_or_else(malformed)?;
        let (nev, release) = nevr.rsplit_once('-').ok_or_else(malformed)?;
        let (name, ev) = nev.rsplit_once('-').ok_or_else(malformed)?;

        Self::new(name, &format!("{}-{}", ev, release), arch)
    }

    /// Attach the package checksum
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Attach the repository the package comes from
    pub fn with_origin_repo(mut self, repo: &str) -> Self {
        self.origin_repo = Some(repo.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evr(&self) -> &Evr {
        &self.evr
    }

    pub fn epoch(&self) -> Option<u32> {
        self.evr.epoch()
    }

    pub fn version(&self) -> &str {
        self.evr.version()
    }

    pub fn release(&self) -> &str {
        self.evr.release()
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }

    pub fn origin_repo(&self) -> Option<&str> {
        self.origin_repo.as_deref()
    }

    /// The name+arch slot this package occupies
    pub fn class(&self) -> PackageClass {
        PackageClass {
            name: self.name.clone(),
            arch: self.arch.clone(),
        }
    }

    /// Whether both packages occupy the same name+arch slot
    pub fn same_class(&self, other: &Self) -> bool {
        self.name == other.name && self.arch == other.arch
    }

    /// Version ordering against another build, ignoring name and arch
    pub fn compare_evr(&self, other: &Self) -> Ordering {
        self.evr.compare(&other.evr)
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.evr == other.evr && self.arch == other.arch
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.evr.hash(state);
        self.arch.hash(state);
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.name)?;
        if let Some(epoch) = self.evr.epoch().filter(|e| *e != 0) {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}-{}.{}", self.evr.version(), self.evr.release(), self.arch)
    }
}

impl FromStr for PackageIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_nevra(s)
    }
}
