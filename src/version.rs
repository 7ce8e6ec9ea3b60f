//! Numeric version parsing and comparison.
//!
//! Versions use the `major.minor.patch` format with a hybrid per-component
//! ordering: when the first decimal digits of two components differ the
//! components compare by first digit alone (0.2.0 > 0.11.0 because 2 > 1),
//! otherwise by full value (0.13.0 > 0.11.0 because 13 > 11).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::SetupError;

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Kind of change between two versions under the hybrid ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    Major,
    Minor,
    Patch,
    Same,
    Unknown,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, SetupError> {
        input.parse()
    }

    pub fn is_major_update(&self, previous: &Version) -> bool {
        hybrid_cmp(self.major, previous.major) == Ordering::Greater
    }

    pub fn is_minor_update(&self, previous: &Version) -> bool {
        hybrid_cmp(self.major, previous.major) == Ordering::Equal
            && hybrid_cmp(self.minor, previous.minor) == Ordering::Greater
    }

    pub fn is_patch_update(&self, previous: &Version) -> bool {
        hybrid_cmp(self.major, previous.major) == Ordering::Equal
            && hybrid_cmp(self.minor, previous.minor) == Ordering::Equal
            && hybrid_cmp(self.patch, previous.patch) == Ordering::Greater
    }

    pub fn update_type(&self, previous: &Version) -> UpdateType {
        if self == previous {
            UpdateType::Same
        } else if self.is_major_update(previous) {
            UpdateType::Major
        } else if self.is_minor_update(previous) {
            UpdateType::Minor
        } else if self.is_patch_update(previous) {
            UpdateType::Patch
        } else {
            UpdateType::Unknown
        }
    }
}

/// Check whether a string parses as a well-formed version.
pub fn is_valid_version(input: &str) -> bool {
    Version::parse(input).is_ok()
}

/// Compare two components: first decimal digits win, full values break ties.
fn hybrid_cmp(a: u32, b: u32) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let (fa, fb) = (first_digit(a), first_digit(b));
    if fa != fb { fa.cmp(&fb) } else { a.cmp(&b) }
}

fn first_digit(mut n: u32) -> u32 {
    while n >= 10 {
        n /= 10;
    }
    n
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        hybrid_cmp(self.major, other.major)
            .then_with(|| hybrid_cmp(self.minor, other.minor))
            .then_with(|| hybrid_cmp(self.patch, other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = SetupError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim().trim_start_matches(['v', 'V']);
        let invalid = || SetupError::InvalidVersion {
            input: input.trim().to_string(),
        };
        let caps = VERSION_RE.captures(trimmed).ok_or_else(invalid)?;
        let component = |i: usize| -> Result<u32, SetupError> {
            caps.get(i)
                .map(|m| m.as_str())
                .ok_or_else(invalid)?
                .parse()
                .map_err(|_| invalid())
        };
        Ok(Self {
            major: component(1)?,
            minor: component(2)?,
            patch: component(3)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn parses_plain_version() {
        let version = v("3.0.0");
        assert_eq!(version.major, 3);
        assert_eq!(version.minor, 0);
        assert_eq!(version.patch, 0);
        assert_eq!(version.to_string(), "3.0.0");
    }

    #[test]
    fn tolerates_v_prefix_and_whitespace() {
        assert_eq!(v(" v1.2.3 "), v("1.2.3"));
        assert_eq!(v("V2.0.1"), v("2.0.1"));
    }

    #[test]
    fn rejects_malformed_strings() {
        for input in ["1.2", "1.2.3.4", "a.b.c", "1.2.x", "", "1..3"] {
            assert!(
                Version::parse(input).is_err(),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn rejects_components_out_of_range() {
        assert!(Version::parse("99999999999.0.0").is_err());
    }

    #[test]
    fn standard_ordering_when_first_digits_match() {
        // 13 and 11 share first digit 1, so full values decide
        assert!(v("0.13.0") > v("0.11.0"));
        assert!(v("1.2.3") < v("1.2.4"));
        assert!(v("1.2.3") == v("1.2.3"));
    }

    #[test]
    fn first_digit_ordering_when_first_digits_differ() {
        // 2 vs 11: first digits 2 vs 1, so 0.2.0 is the newer version
        assert!(v("0.2.0") > v("0.11.0"));
        assert!(v("0.11.0") < v("0.2.0"));
    }

    #[test]
    fn major_component_dominates() {
        assert!(v("2.0.0") > v("1.99.99"));
    }

    #[test]
    fn update_type_classification() {
        assert_eq!(v("2.0.0").update_type(&v("1.4.2")), UpdateType::Major);
        assert_eq!(v("1.5.0").update_type(&v("1.4.2")), UpdateType::Minor);
        assert_eq!(v("1.4.3").update_type(&v("1.4.2")), UpdateType::Patch);
        assert_eq!(v("1.4.2").update_type(&v("1.4.2")), UpdateType::Same);
        assert_eq!(v("1.4.1").update_type(&v("1.4.2")), UpdateType::Unknown);
    }

    #[test]
    fn is_valid_version_matches_parse() {
        assert!(is_valid_version("1.2.3"));
        assert!(is_valid_version("v1.2.3"));
        assert!(!is_valid_version("1.2"));
        assert!(!is_valid_version("not-a-version"));
    }
}
