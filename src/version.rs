// src/version.rs

//! Epoch:version-release handling
//!
//! Package versions follow the RPM convention `[epoch:]version-release`.
//! Comparison uses the segment algorithm rpm itself uses, so `1.10` sorts
//! after `1.9`, `1.0~rc1` sorts before `1.0` and `1.0^git1` sorts after it.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A parsed `[epoch:]version-release` triple
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Evr {
    epoch: Option<u32>,
    version: String,
    release: String,
}

impl Evr {
    /// Build an Evr from its parts, validating version and release
    pub fn new(epoch: Option<u32>, version: &str, release: &str) -> Result<Self> {
        validate_segment("version", version)?;
        validate_segment("release", release)?;

        Ok(Self {
            epoch,
            version: version.to_string(),
            release: release.to_string(),
        })
    }

    /// Parse `[epoch:]version-release`
    pub fn parse(s: &str) -> Result<Self> {
        let (epoch, rest) = match s.split_once(':') {
            Some((e, rest)) => {
                let invalid = || Error::MalformedIdentity(format!("invalid epoch '{}' in '{}'", e, s));
                // Digits only, no sign or leading zeros
                if e.is_empty()
                    || !e.bytes().all(|b| b.is_ascii_digit())
                    || (e.len() > 1 && e.starts_with('0'))
                {
                    return Err(invalid());
                }
                let epoch = e.parse::<u32>().map_err(|_| invalid())?;
                (Some(epoch), rest)
            }
            None => (None, s),
        };

        let (version, release) = rest.rsplit_once('-').ok_or_else(|| {
            Error::MalformedIdentity(format!("missing release in '{}'", s))
        })?;

        Self::new(epoch, version, release)
    }

    /// Epoch as given; `None` compares equal to `0`
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    /// Compare two EVRs: epoch first, then version, then release
    pub fn compare(&self, other: &Self) -> Ordering {
        self.epoch
            .unwrap_or(0)
            .cmp(&other.epoch.unwrap_or(0))
            .then_with(|| vercmp(&self.version, &other.version))
            .then_with(|| vercmp(&self.release, &other.release))
    }
}

// Equality is by value: an omitted epoch is the same as epoch 0.
impl PartialEq for Evr {
    fn eq(&self, other: &Self) -> bool {
        self.epoch.unwrap_or(0) == other.epoch.unwrap_or(0)
            && self.version == other.version
            && self.release == other.release
    }
}

impl Eq for Evr {}

impl Hash for Evr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.unwrap_or(0).hash(state);
        self.version.hash(state);
        self.release.hash(state);
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}-{}", self.version, self.release)
    }
}

impl FromStr for Evr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Evr {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Evr> for String {
    fn from(evr: Evr) -> Self {
        evr.to_string()
    }
}

fn validate_segment(what: &str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::MalformedIdentity(format!("empty {}", what)));
    }

    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '~' | '^')))
    {
        return Err(Error::MalformedIdentity(format!(
            "invalid character '{}' in {} '{}'",
            c, what, s
        )));
    }

    Ok(())
}

/// rpm's segment-wise version comparison
pub fn vercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let (one, two) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    let is_sep = |c: u8| !c.is_ascii_alphanumeric() && c != b'~' && c != b'^';

    while i < one.len() || j < two.len() {
        while i < one.len() && is_sep(one[i]) {
            i += 1;
        }
        while j < two.len() && is_sep(two[j]) {
            j += 1;
        }

        let c1 = one.get(i).copied();
        let c2 = two.get(j).copied();

        // Tilde sorts before everything, even the end of the string
        if c1 == Some(b'~') || c2 == Some(b'~') {
            if c1 != Some(b'~') {
                return Ordering::Greater;
            }
            if c2 != Some(b'~') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        // Caret sorts after the end of the string but before any segment
        if c1 == Some(b'^') || c2 == Some(b'^') {
            if c1.is_none() {
                return Ordering::Less;
            }
            if c2.is_none() {
                return Ordering::Greater;
            }
            if c1 != Some(b'^') {
                return Ordering::Greater;
            }
            if c2 != Some(b'^') {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        let (Some(first), Some(_)) = (c1, c2) else {
            break;
        };

        let numeric = first.is_ascii_digit();
        let in_segment = |c: u8| {
            if numeric {
                c.is_ascii_digit()
            } else {
                c.is_ascii_alphabetic()
            }
        };

        let start1 = i;
        while i < one.len() && in_segment(one[i]) {
            i += 1;
        }
        let start2 = j;
        while j < two.len() && in_segment(two[j]) {
            j += 1;
        }

        let mut seg1 = &one[start1..i];
        let mut seg2 = &two[start2..j];

        // Segment types differ: numeric is newer than alpha
        if seg2.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        if numeric {
            while seg1.len() > 1 && seg1[0] == b'0' {
                seg1 = &seg1[1..];
            }
            while seg2.len() > 1 && seg2[0] == b'0' {
                seg2 = &seg2[1..];
            }
            match seg1.len().cmp(&seg2.len()) {
                Ordering::Equal => {}
                other => return other,
            }
        }

        match seg1.cmp(seg2) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for s in ["1.0-1", "0:1.0-1", "3:2.4.1-0.rc1.fc40", "1.0~rc1-2", "20-0"] {
            let evr = Evr::parse(s).unwrap();
            assert_eq!(evr.to_string(), s);
        }
    }

    #[test]
    fn test_parse_parts() {
        let evr = Evr::parse("2:1.2.3-4.el9").unwrap();
        assert_eq!(evr.epoch(), Some(2));
        assert_eq!(evr.version(), "1.2.3");
        assert_eq!(evr.release(), "4.el9");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for s in [
            "",
            "1.0",
            "x:1.0-1",
            "1.0-",
            "-1",
            "1 0-1",
            "1.0-1/2",
            "+1:1.0-1",
            "01:1.0-1",
            ":1.0-1",
            "99999999999:1.0-1",
        ] {
            let result = Evr::parse(s);
            assert!(
                matches!(result, Err(Error::MalformedIdentity(_))),
                "expected '{}' to be rejected",
                s
            );
        }
    }

    #[test]
    fn test_missing_epoch_equals_zero() {
        let a = Evr::parse("1.0-1").unwrap();
        let b = Evr::parse("0:1.0-1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.compare(&b), Ordering::Equal);
    }

    #[test]
    fn test_vercmp_numeric_segments() {
        assert_eq!(vercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(vercmp("1.01", "1.1"), Ordering::Equal);
        assert_eq!(vercmp("2", "10"), Ordering::Less);
        assert_eq!(vercmp("1.0", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_vercmp_alpha_and_mixed() {
        assert_eq!(vercmp("1.0a", "1.0b"), Ordering::Less);
        assert_eq!(vercmp("1.0.1", "1.0a"), Ordering::Greater);
        assert_eq!(vercmp("fc40", "fc39"), Ordering::Greater);
    }

    #[test]
    fn test_vercmp_tilde_and_caret() {
        assert_eq!(vercmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(vercmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(vercmp("1.0^git1", "1.0"), Ordering::Greater);
        assert_eq!(vercmp("1.0^git1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_epoch_dominates() {
        let old = Evr::parse("1:1.0-1").unwrap();
        let new = Evr::parse("9.9-9").unwrap();
        assert_eq!(old.compare(&new), Ordering::Greater);
    }
}
