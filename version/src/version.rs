use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::str::FromStr;

/// Pre-release tags, indexed by `part + PREFIXES.len()`.
const PREFIXES: [&str; 6] = ["ci", "dev", "qa", "alpha", "beta", "rc"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal version: {0}")]
pub struct ParseVersionError(pub String);

/// How close to a general-availability release a version is.
///
/// Declared in stability order, so `Ord` answers "which is more stable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReleaseCategory {
    Ci,
    Dev,
    Qa,
    Alpha,
    Beta,
    Rc,
    Ga,
}

impl ReleaseCategory {
    fn from_part(part: i32) -> Self {
        match part {
            -6 => ReleaseCategory::Ci,
            -5 => ReleaseCategory::Dev,
            -4 => ReleaseCategory::Qa,
            -3 => ReleaseCategory::Alpha,
            -2 => ReleaseCategory::Beta,
            -1 => ReleaseCategory::Rc,
            _ => ReleaseCategory::Ga,
        }
    }

    pub fn is_more_stable_than(self, that: ReleaseCategory) -> bool {
        self > that
    }
}

impl fmt::Display for ReleaseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseCategory::Ga => "ga",
            other => PREFIXES[*other as usize],
        };
        f.write_str(name)
    }
}

/// A module version such as `1.2`, `2.1.beta3` or `3.0-rc+20260101`.
///
/// The numeric parts are non-negative; a pre-release tag is stored as a
/// negative part (`ci=-6 … rc=-1`) and may be followed by one more number.
/// Equality and ordering look at the parts and build metadata only, so
/// `1.0-beta` and `1.0.beta` are the same version even though they print
/// differently.
#[derive(Debug, Clone)]
pub struct Version {
    literal: String,
    parts: Vec<i32>,
    build: Option<String>,
}

impl Version {
    pub fn parse(literal: &str) -> Result<Self, ParseVersionError> {
        let illegal = || ParseVersionError(literal.to_string());
        let bytes = literal.as_bytes();
        let mut parts = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            parts.push(read_number(bytes, &mut pos).ok_or_else(illegal)?);
            match bytes.get(pos) {
                None => break,
                Some(b'.') => pos += 1,
                Some(b'-') => {
                    pos += 1;
                    break;
                }
                Some(b'+') => break,
                Some(_) => return Err(illegal()),
            }
        }

        if pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            let (part, tag) = PREFIXES
                .iter()
                .enumerate()
                .find(|(_, tag)| {
                    bytes.len() - pos >= tag.len()
                        && bytes[pos..pos + tag.len()].eq_ignore_ascii_case(tag.as_bytes())
                })
                .map(|(i, tag)| (i as i32 - PREFIXES.len() as i32, tag))
                .ok_or_else(illegal)?;
            parts.push(part);
            pos += tag.len();
            if pos < bytes.len() && bytes[pos].is_ascii_digit() {
                parts.push(read_number(bytes, &mut pos).ok_or_else(illegal)?);
            }
        }

        let mut build = None;
        if pos < bytes.len() {
            if bytes[pos] != b'+' {
                return Err(illegal());
            }
            build = Some(literal[pos + 1..].to_string());
        }

        if parts.is_empty() {
            return Err(illegal());
        }

        Ok(Self {
            literal: literal.to_string(),
            parts,
            build,
        })
    }

    /// Build a version from raw parts, rendering a canonical literal.
    pub fn from_parts(parts: Vec<i32>, build: Option<String>) -> Result<Self, ParseVersionError> {
        let valid = !parts.is_empty()
            && parts.iter().enumerate().all(|(i, &part)| {
                part >= 0
                    || (part >= -(PREFIXES.len() as i32)
                        && match parts.len() - i {
                            1 => true,
                            2 => parts[i + 1] >= 0,
                            _ => false,
                        })
            });
        if !valid {
            return Err(ParseVersionError(format!("{parts:?}")));
        }
        Ok(Self::from_valid_parts(parts, build))
    }

    fn from_valid_parts(parts: Vec<i32>, build: Option<String>) -> Self {
        let mut literal = String::new();
        let mut ga = true;
        for (i, &part) in parts.iter().enumerate() {
            if part >= 0 {
                if i > 0 && ga {
                    literal.push('.');
                }
                literal.push_str(&part.to_string());
            } else {
                ga = false;
                if i > 0 {
                    literal.push('-');
                }
                literal.push_str(PREFIXES[(part + PREFIXES.len() as i32) as usize]);
            }
        }
        let build = build.filter(|b| !b.is_empty());
        if let Some(build) = &build {
            literal.push('+');
            literal.push_str(build);
        }
        Self {
            literal,
            parts,
            build,
        }
    }

    pub fn parts(&self) -> &[i32] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The part at `index`, or `0` past the end.
    pub fn part(&self, index: usize) -> i32 {
        self.parts.get(index).copied().unwrap_or(0)
    }

    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }

    pub fn is_ga_release(&self) -> bool {
        self.parts.iter().all(|&p| p >= 0)
    }

    pub fn release_category(&self) -> ReleaseCategory {
        self.parts
            .iter()
            .find(|&&p| p < 0)
            .map_or(ReleaseCategory::Ga, |&p| ReleaseCategory::from_part(p))
    }

    /// Number of leading parts that belong to the GA portion of the version.
    fn ga_len(&self) -> usize {
        let c = self.parts.len();
        if self.parts[c - 1] < 0 {
            c - 1
        } else if c >= 2 && self.parts[c - 2] < 0 {
            c - 2
        } else {
            c
        }
    }

    /// Whether a module of this version can be used where `that` version is
    /// requested.
    ///
    /// `2.1` substitutes for `2.1.beta3`, `1.2.3.4.5` for `1`, and `2.0` for
    /// `2.0.0` (and vice versa); a pre-release never substitutes for the GA
    /// release it precedes.
    pub fn is_substitutable_for(&self, that: &Version) -> bool {
        if self == that {
            return true;
        }

        let this_parts = &self.parts;
        let that_parts = &that.parts;
        let this_ga = self.ga_len();
        let that_ga = that.ga_len();
        let last_ga = this_ga.min(that_ga) as isize - 1;

        for i in 0..last_ga.max(0) as usize {
            if this_parts[i] != that_parts[i] {
                return false;
            }
        }

        let diff = if last_ga >= 0 {
            let i = last_ga as usize;
            this_parts[i] - that_parts[i]
        } else {
            0
        };
        if diff < 0 {
            return false;
        }
        if diff > 0 {
            return this_ga >= that_ga;
        }

        if this_ga > that_ga {
            if this_parts[that_ga..this_ga].iter().any(|&p| p > 0) {
                return true;
            }
        } else if this_ga < that_ga && that_parts[this_ga..that_ga].iter().any(|&p| p > 0) {
            return false;
        }

        let this_is_ga = this_parts.len() == this_ga;
        let that_is_ga = that_parts.len() == that_ga;
        if !this_is_ga || !that_is_ga {
            if this_is_ga != that_is_ga {
                return this_is_ga;
            }

            let this_pre = this_parts.len() - this_ga;
            let that_pre = that_parts.len() - that_ga;
            for of in 0..this_pre.min(that_pre) {
                match this_parts[this_ga + of].cmp(&that_parts[that_ga + of]) {
                    Ordering::Less => return false,
                    Ordering::Greater => return true,
                    Ordering::Equal => {}
                }
            }
            if this_pre != that_pre {
                return this_pre > that_pre;
            }
        }

        true
    }

    /// Equal ignoring trailing zeros, so `1.0` is the same as `1.0.0`.
    pub fn is_same_as(&self, that: &Version) -> bool {
        if self == that {
            return true;
        }
        let shared = self.parts.len().min(that.parts.len());
        if self.parts[..shared] != that.parts[..shared] {
            return false;
        }
        let longer = if self.parts.len() > that.parts.len() {
            &self.parts
        } else {
            &that.parts
        };
        longer[shared..].iter().all(|&p| p == 0)
    }

    /// Strip trailing zero parts (keeping at least one part).
    pub fn normalize(&self) -> Version {
        let mut len = self.parts.len();
        while len > 1 && self.parts[len - 1] == 0 {
            len -= 1;
        }
        if len == self.parts.len() {
            return self.clone();
        }
        Self::from_valid_parts(self.parts[..len].to_vec(), self.build.clone())
    }
}

fn read_number(bytes: &[u8], pos: &mut usize) -> Option<i32> {
    let mut n: i32 = 0;
    while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
        n = n.checked_mul(10)?.checked_add((bytes[*pos] - b'0') as i32)?;
        *pos += 1;
    }
    Some(n)
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts && self.build == other.build
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
        self.build.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts
            .cmp(&other.parts)
            .then_with(|| self.build.cmp(&other.build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn parse_parts() {
        assert_eq!(v("1.2.3").parts(), &[1, 2, 3]);
        assert_eq!(v("2.1.rc2").parts(), &[2, 1, -1, 2]);
        assert_eq!(v("beta").parts(), &[-2]);
        assert_eq!(v("1.0-BETA1").parts(), &[1, 0, -2, 1]);
        assert_eq!(v("3.0+nightly").build(), Some("nightly"));
        assert_eq!(v("3.0+nightly").parts(), &[3, 0]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1.x").is_err());
        assert!(Version::parse("1.beta2.3").is_err());
        assert!(Version::parse("gamma").is_err());
        assert!(Version::parse("1,2").is_err());
        assert!(Version::parse("1rc").is_err());
    }

    #[test]
    fn from_parts_renders_literal() {
        let ver = Version::from_parts(vec![1, 2, -2, 3], Some("x".into())).unwrap();
        assert_eq!(ver.to_string(), "1.2-beta3+x");
        assert_eq!(v(&ver.to_string()), ver);
        assert!(Version::from_parts(vec![], None).is_err());
        assert!(Version::from_parts(vec![1, -2, 1, 1], None).is_err());
        assert!(Version::from_parts(vec![-9], None).is_err());
    }

    #[test]
    fn release_categories() {
        assert!(v("1.0").is_ga_release());
        assert_eq!(v("1.0").release_category(), ReleaseCategory::Ga);
        assert_eq!(v("1.0.alpha2").release_category(), ReleaseCategory::Alpha);
        assert!(ReleaseCategory::Rc.is_more_stable_than(ReleaseCategory::Beta));
        assert!(!ReleaseCategory::Ci.is_more_stable_than(ReleaseCategory::Dev));
        assert_eq!(ReleaseCategory::Qa.to_string(), "qa");
    }

    #[test]
    fn substitutable() {
        let yes = [
            ("0", "beta"),
            ("1", "beta"),
            ("0", "0"),
            ("1", "0"),
            ("1.2.3.4.5", "1"),
            ("2.1.rc", "2.1.beta3"),
            ("2.1.rc2", "2.1.beta3"),
            ("2.1", "2.1.beta"),
            ("2.1", "2.1.beta3"),
            ("2.2", "2.1.beta3"),
            ("2.1.beta3", "2.1.beta"),
            ("1.2", "1.beta"),
            ("1.2.alpha", "1.beta"),
            ("1.2.beta1", "1.beta1"),
            ("1.2.beta2", "1.2.beta1"),
            ("1.2.beta", "1.2.alpha"),
            ("beta", "alpha"),
            ("2.0", "2.0.0"),
            ("2.0.0", "2.0"),
        ];
        for (this, that) in yes {
            assert!(v(this).is_substitutable_for(&v(that)), "{this} for {that}");
        }

        let no = [
            ("beta", "0"),
            ("beta", "1"),
            ("0", "1"),
            ("1", "1.2.3.4.5"),
            ("2.1.beta3", "2.1.rc"),
            ("2.1.beta", "2.1"),
            ("2.1.beta3", "2.2"),
            ("2.1.beta", "2.1.beta3"),
            ("1.beta", "1.2"),
            ("1.beta1", "1.2.beta1"),
            ("1.2.beta1", "1.2.beta2"),
            ("1.2.alpha", "1.2.beta"),
            ("alpha", "beta"),
        ];
        for (this, that) in no {
            assert!(!v(this).is_substitutable_for(&v(that)), "{this} for {that}");
        }
    }

    #[test]
    fn same_as_and_normalize() {
        assert!(v("1.0").is_same_as(&v("1.0.0")));
        assert!(v("1.0.0").is_same_as(&v("1")));
        assert!(!v("1.0.1").is_same_as(&v("1")));
        assert_eq!(v("2.1.0.0").normalize(), v("2.1"));
        assert_eq!(v("0.0").normalize(), v("0"));
        assert_eq!(v("1.0-beta").normalize(), v("1.0.beta"));
    }

    #[test]
    fn ordering() {
        let mut versions = vec![v("2.0"), v("1.0"), v("2"), v("2.0.beta"), v("1.5")];
        versions.sort();
        let sorted: Vec<_> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(sorted, ["1.0", "1.5", "2", "2.0", "2.0.beta"]);
    }
}
