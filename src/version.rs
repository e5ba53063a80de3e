//! C7: version algebra (spec.md §4.8). Parses and totally orders version
//! identifiers per the published "version spec" in the glossary - epochs,
//! release segments of any length, alpha/beta/rc pre-releases ordered
//! `a < b < rc < release`, post and dev segments, `+local` labels
//! compared segment-wise, and the compatible-release operator `~=`
//! desugared to a range.
//!
//! No teacher grounding (the teacher has no dependency resolver at all);
//! hand rolled rather than built on the `semver` crate because the
//! ordering this spec requires is PEP-440-shaped, not semver-shaped -
//! `1.0a1 < 1.0` has no semver equivalent, and `semver` would silently
//! implement the wrong law. General shape ("parse once, cache the
//! extracted version, compare field-wise") generalized from
//! `other_examples/8605ff7c_rust-lang-cargo__...registry-index.rs`.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreReleaseTag {
    Alpha,
    Beta,
    Rc,
}

impl PreReleaseTag {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "a" | "alpha" => Some(PreReleaseTag::Alpha),
            "b" | "beta" => Some(PreReleaseTag::Beta),
            "rc" | "c" | "pre" | "preview" => Some(PreReleaseTag::Rc),
            _ => None,
        }
    }
}

/// `(epoch, release[], pre?, post?, dev?, local?)` (spec.md §3).
#[derive(Debug, Clone)]
pub struct Version {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreReleaseTag, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Vec<LocalSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalSegment {
    Numeric(u64),
    Alpha(String),
}

impl PartialOrd for LocalSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalSegment {
    /// Numeric segments always sort after alphanumeric ones at the same
    /// position, matching the published spec's local-version ordering.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (LocalSegment::Numeric(a), LocalSegment::Numeric(b)) => a.cmp(b),
            (LocalSegment::Alpha(a), LocalSegment::Alpha(b)) => a.cmp(b),
            (LocalSegment::Numeric(_), LocalSegment::Alpha(_)) => Ordering::Greater,
            (LocalSegment::Alpha(_), LocalSegment::Numeric(_)) => Ordering::Less,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VersionParseError(pub String);

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version: {}", self.0)
    }
}

impl std::error::Error for VersionParseError {}

impl Version {
    pub fn parse(raw: &str) -> Result<Self, VersionParseError> {
        let s = raw.trim();
        let (main, local) = match s.split_once('+') {
            Some((main, local)) => (main, Some(local)),
            None => (s, None),
        };

        let (epoch_str, rest) = match main.split_once('!') {
            Some((e, r)) => (e, r),
            None => ("0", main),
        };
        let epoch: u64 = epoch_str
            .parse()
            .map_err(|_| VersionParseError(format!("bad epoch in {raw}")))?;

        let mut chars = rest.char_indices().peekable();
        let mut release = Vec::new();
        let mut cursor = 0usize;
        loop {
            let start = cursor;
            while chars.peek().is_some_and(|(_, c)| c.is_ascii_digit()) {
                let (i, _) = chars.next().unwrap();
                cursor = i + 1;
            }
            if cursor == start {
                break;
            }
            release.push(
                rest[start..cursor]
                    .parse::<u64>()
                    .map_err(|_| VersionParseError(format!("bad release segment in {raw}")))?,
            );
            if chars.peek().map(|(_, c)| *c) == Some('.') {
                chars.next();
                cursor += 1;
            } else {
                break;
            }
        }
        if release.is_empty() {
            return Err(VersionParseError(format!("no release segment in {raw}")));
        }
        let remainder = &rest[cursor..];

        let pre = parse_pre(remainder);
        let post = parse_labeled_number(remainder, &["post", "rev", "r"])
            .or_else(|| parse_implicit_post(remainder));
        let dev = parse_labeled_number(remainder, &["dev"]);

        let local = local
            .map(|l| {
                l.split(['.', '-', '_'])
                    .filter(|seg| !seg.is_empty())
                    .map(|seg| {
                        if let Ok(n) = seg.parse::<u64>() {
                            LocalSegment::Numeric(n)
                        } else {
                            LocalSegment::Alpha(seg.to_lowercase())
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// `1.0` and `1.0.0` compare equal (spec.md §4.8 edge case): release
    /// segments are compared after zero-padding the shorter one.
    fn release_cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other_ord => return other_ord,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", release.join("."))?;
        if let Some((tag, n)) = &self.pre {
            let tag_str = match tag {
                PreReleaseTag::Alpha => "a",
                PreReleaseTag::Beta => "b",
                PreReleaseTag::Rc => "rc",
            };
            write!(f, "{tag_str}{n}")?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{post}")?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{dev}")?;
        }
        if !self.local.is_empty() {
            let parts: Vec<String> = self
                .local
                .iter()
                .map(|seg| match seg {
                    LocalSegment::Numeric(n) => n.to_string(),
                    LocalSegment::Alpha(s) => s.clone(),
                })
                .collect();
            write!(f, "+{}", parts.join("."))?;
        }
        Ok(())
    }
}

fn parse_pre(s: &str) -> Option<(PreReleaseTag, u64)> {
    let s = s.trim_start_matches(['.', '-', '_']);
    let tag_len = s
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_alphabetic())
        .count();
    if tag_len == 0 {
        return None;
    }
    let tag = PreReleaseTag::parse(&s[..tag_len].to_lowercase())?;
    let num_str = &s[tag_len..];
    let num_str = num_str.trim_start_matches(['.', '-', '_']);
    let digits: String = num_str.chars().take_while(|c| c.is_ascii_digit()).collect();
    let n = if digits.is_empty() { 0 } else { digits.parse().ok()? };
    Some((tag, n))
}

fn parse_labeled_number(s: &str, labels: &[&str]) -> Option<u64> {
    for label in labels {
        if let Some(idx) = s.to_lowercase().find(label) {
            let after = &s[idx + label.len()..];
            let after = after.trim_start_matches(['.', '-', '_']);
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            return Some(if digits.is_empty() { 0 } else { digits.parse().ok()? });
        }
    }
    None
}

/// A bare `-N` suffix with no `post`/`rev` label is still an implicit
/// post-release per the published spec (e.g. `1.0-1`).
fn parse_implicit_post(s: &str) -> Option<u64> {
    let s = s.strip_prefix('-')?;
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == s.len() && !digits.is_empty() {
        digits.parse().ok()
    } else {
        None
    }
}

/// Structural equality would say `1.0 != 1.0.0` (their `release` vectors
/// differ in length); the published spec says they're the same version
/// (spec.md §4.8 edge case), so equality here is defined as "compares
/// equal", matching `Ord::cmp` rather than the derived field-by-field
/// comparison.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.release_cmp(other))
            .then_with(|| pre_key(self).cmp(&pre_key(other)))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| dev_key(self).cmp(&dev_key(other)))
            .then_with(|| self.local.cmp(&other.local))
    }
}

/// The "pre" leg of the published total order. A bare dev release (no
/// `pre`, no `post`) sorts below every pre-release at the same release
/// segment (`1.0.dev1 < 1.0a1`); a release with no `pre` at all (whether
/// or not it carries a `post`/`dev`) sorts above every pre-release
/// (`1.0a1 < 1.0`); an actual pre-release sorts by its tag then number.
/// Declaration order of the variants below *is* the ordering - derived
/// `Ord` compares `NegInf < Tuple(..) < PosInf` before ever looking at
/// the tuple fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    NegInf,
    Tuple(i8, u64),
    PosInf,
}

fn pre_key(v: &Version) -> PreKey {
    match v.pre {
        Some((tag, n)) => PreKey::Tuple(tag as i8, n),
        None if v.post.is_none() && v.dev.is_some() => PreKey::NegInf,
        None => PreKey::PosInf,
    }
}

/// The "dev" leg, applied after `post` so a dev release of a post-release
/// (`1.0.post1.dev1`) sorts below the bare post-release (`1.0.post1`)
/// without disturbing `1.0 < 1.0.post1.dev1`. Absence of `dev` sorts
/// above any dev number at the same release/pre/post combination.
fn dev_key(v: &Version) -> (i8, u64) {
    match v.dev {
        Some(n) => (0, n),
        None => (1, 0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Compatible, // ~=
    ExactEq,    // ===, matches local labels literally too
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub op: Op,
    pub version: Version,
}

impl Constraint {
    pub fn parse(raw: &str) -> Result<Self, VersionParseError> {
        let raw = raw.trim();
        let (op, rest) = if let Some(r) = raw.strip_prefix("~=") {
            (Op::Compatible, r)
        } else if let Some(r) = raw.strip_prefix("===") {
            (Op::ExactEq, r)
        } else if let Some(r) = raw.strip_prefix("==") {
            (Op::Eq, r)
        } else if let Some(r) = raw.strip_prefix("!=") {
            (Op::NotEq, r)
        } else if let Some(r) = raw.strip_prefix("<=") {
            (Op::LtEq, r)
        } else if let Some(r) = raw.strip_prefix(">=") {
            (Op::GtEq, r)
        } else if let Some(r) = raw.strip_prefix('<') {
            (Op::Lt, r)
        } else if let Some(r) = raw.strip_prefix('>') {
            (Op::Gt, r)
        } else {
            (Op::Eq, raw)
        };
        Ok(Constraint {
            op,
            version: Version::parse(rest.trim())?,
        })
    }

    /// `~=1.2` desugars to `>=1.2, ==1.*` (i.e. `>= 1.2 && < 2.0`); `~=1.2.3`
    /// desugars to `>=1.2.3, ==1.2.*` (spec.md §4.8: "the compatible-
    /// release operator `~=` (desugared to a range)").
    fn matches_compatible(&self, candidate: &Version) -> bool {
        if candidate < &self.version {
            return false;
        }
        let mut prefix = self.version.release.clone();
        prefix.pop();
        if prefix.is_empty() {
            return true;
        }
        candidate.release.len() >= prefix.len() && candidate.release[..prefix.len()] == prefix[..]
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            Op::Eq => {
                // `1.0+local` is not matched by `==1.0` unless the equality
                // is `===` (spec.md §4.8 edge case): a bare `==` ignores
                // the candidate's local label entirely when the
                // constraint itself carries none.
                if self.version.local.is_empty() {
                    candidate.release_cmp(&self.version) == Ordering::Equal
                        && candidate.pre == self.version.pre
                        && candidate.post == self.version.post
                        && candidate.dev == self.version.dev
                } else {
                    candidate == &self.version
                }
            }
            Op::NotEq => !Constraint { op: Op::Eq, version: self.version.clone() }.matches(candidate),
            Op::Lt => candidate < &self.version,
            Op::LtEq => candidate <= &self.version,
            Op::Gt => candidate > &self.version,
            Op::GtEq => candidate >= &self.version,
            Op::Compatible => self.matches_compatible(candidate),
            Op::ExactEq => candidate == &self.version,
        }
    }
}

/// A conjunction of `(op, version)` constraints (spec.md §3's
/// Requirement: "A constraint-set is a conjunction of `(op, version)`").
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    pub constraints: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn parse(raw: &str) -> Result<Self, VersionParseError> {
        let constraints = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Constraint::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ConstraintSet { constraints })
    }

    pub fn matches(&self, candidate: &Version) -> bool {
        self.constraints.iter().all(|c| c.matches(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_segments_of_different_lengths_compare_equal() {
        assert_eq!(Version::parse("1.0").unwrap(), Version::parse("1.0.0").unwrap());
    }

    #[test]
    fn prerelease_sorts_below_release() {
        let pre = Version::parse("1.0a1").unwrap();
        let rel = Version::parse("1.0").unwrap();
        assert!(pre < rel);
    }

    #[test]
    fn prerelease_tags_order_alpha_beta_rc() {
        assert!(Version::parse("1.0a1").unwrap() < Version::parse("1.0b1").unwrap());
        assert!(Version::parse("1.0b1").unwrap() < Version::parse("1.0rc1").unwrap());
    }

    #[test]
    fn dev_sorts_below_prerelease() {
        assert!(Version::parse("1.0.dev1").unwrap() < Version::parse("1.0a1").unwrap());
    }

    #[test]
    fn post_sorts_above_release() {
        assert!(Version::parse("1.0").unwrap() < Version::parse("1.0.post1").unwrap());
    }

    #[test]
    fn compatible_release_matches_within_range() {
        let c = Constraint::parse("~=1.2").unwrap();
        assert!(c.matches(&Version::parse("1.2").unwrap()));
        assert!(c.matches(&Version::parse("1.9").unwrap()));
        assert!(!c.matches(&Version::parse("2.0").unwrap()));
    }

    #[test]
    fn compatible_release_with_patch_pins_minor() {
        let c = Constraint::parse("~=1.2.3").unwrap();
        assert!(c.matches(&Version::parse("1.2.3").unwrap()));
        assert!(c.matches(&Version::parse("1.2.99").unwrap()));
        assert!(!c.matches(&Version::parse("1.3.0").unwrap()));
    }

    #[test]
    fn local_label_is_ignored_by_bare_equality_but_not_by_exact_equality() {
        let bare = Constraint::parse("==1.0").unwrap();
        assert!(bare.matches(&Version::parse("1.0+local").unwrap()));
        let exact = Constraint::parse("===1.0").unwrap();
        assert!(!exact.matches(&Version::parse("1.0+local").unwrap()));
    }

    #[test]
    fn total_order_holds_for_a_sample_of_versions() {
        let versions = [
            "1.0.dev1", "1.0a1", "1.0a2", "1.0b1", "1.0rc1", "1.0", "1.0.post1", "1.1", "2.0",
        ];
        let parsed: Vec<Version> = versions.iter().map(|s| Version::parse(s).unwrap()).collect();
        for w in parsed.windows(2) {
            assert!(w[0] < w[1], "{} should sort before {}", w[0], w[1]);
        }
    }

    proptest::proptest! {
        #[test]
        fn parses_total_order_for_accepted_strings(
            epoch in 0u64..3,
            major in 0u64..20,
            minor in 0u64..20,
        ) {
            let a = Version::parse(&format!("{epoch}!{major}.{minor}")).unwrap();
            let b = Version::parse(&format!("{epoch}!{major}.{minor}")).unwrap();
            // Exactly one of <, =, > holds for any two parsed versions
            // (spec.md §8 property 4).
            let lt = a < b;
            let eq = a == b;
            let gt = a > b;
            assert_eq!([lt, eq, gt].iter().filter(|x| **x).count(), 1);
        }
    }
}
