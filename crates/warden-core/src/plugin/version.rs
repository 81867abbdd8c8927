//! Version constraint arithmetic.
//!
//! Each Cargo-style requirement is mapped onto a single version interval so
//! that two constraints can be checked for a common solution exactly, instead
//! of probing sample versions. A comma-joined requirement is the intersection
//! of its comparators' intervals.

use std::cmp::Ordering;

use semver::{Comparator, Op, Version, VersionReq};

/// One end of a version interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound {
    pub version: Version,
    pub inclusive: bool,
}

/// Interval of versions: `lower` is always present, `upper: None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub lower: Bound,
    pub upper: Option<Bound>,
}

impl VersionRange {
    /// Every version.
    pub fn any() -> Self {
        Self {
            lower: Bound {
                version: Version::new(0, 0, 0),
                inclusive: true,
            },
            upper: None,
        }
    }

    fn between(lower: Version, lower_inclusive: bool, upper: Version, upper_inclusive: bool) -> Self {
        Self {
            lower: Bound {
                version: lower,
                inclusive: lower_inclusive,
            },
            upper: Some(Bound {
                version: upper,
                inclusive: upper_inclusive,
            }),
        }
    }

    fn at_least(lower: Version, inclusive: bool) -> Self {
        Self {
            lower: Bound {
                version: lower,
                inclusive,
            },
            upper: None,
        }
    }

    fn below(upper: Version, inclusive: bool) -> Self {
        Self {
            lower: Self::any().lower,
            upper: Some(Bound {
                version: upper,
                inclusive,
            }),
        }
    }

    /// True when no version lies inside the interval.
    pub fn is_empty(&self) -> bool {
        let Some(upper) = &self.upper else {
            return false;
        };
        match self.lower.version.cmp(&upper.version) {
            Ordering::Less => false,
            Ordering::Equal => !(self.lower.inclusive && upper.inclusive),
            Ordering::Greater => true,
        }
    }

    /// Interval intersection.
    pub fn intersect(&self, other: &VersionRange) -> VersionRange {
        let lower = match self.lower.version.cmp(&other.lower.version) {
            Ordering::Greater => self.lower.clone(),
            Ordering::Less => other.lower.clone(),
            Ordering::Equal => Bound {
                version: self.lower.version.clone(),
                inclusive: self.lower.inclusive && other.lower.inclusive,
            },
        };

        let upper = match (&self.upper, &other.upper) {
            (None, None) => None,
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (Some(a), Some(b)) => Some(match a.version.cmp(&b.version) {
                Ordering::Less => a.clone(),
                Ordering::Greater => b.clone(),
                Ordering::Equal => Bound {
                    version: a.version.clone(),
                    inclusive: a.inclusive && b.inclusive,
                },
            }),
        };

        VersionRange { lower, upper }
    }
}

fn release(major: u64, minor: u64, patch: u64) -> Version {
    Version::new(major, minor, patch)
}

// The bump helpers return `None` past the largest representable version.

fn next_major(major: u64) -> Option<Version> {
    major.checked_add(1).map(|m| release(m, 0, 0))
}

fn next_minor(major: u64, minor: u64) -> Option<Version> {
    match minor.checked_add(1) {
        Some(m) => Some(release(major, m, 0)),
        None => next_major(major),
    }
}

fn next_patch(major: u64, minor: u64, patch: u64) -> Option<Version> {
    match patch.checked_add(1) {
        Some(p) => Some(release(major, minor, p)),
        None => next_minor(major, minor),
    }
}

/// `[lower, upper)`, unbounded above when `upper` is `None`.
fn half_open(lower: Version, upper: Option<Version>) -> VersionRange {
    match upper {
        Some(upper) => VersionRange::between(lower, true, upper, false),
        None => VersionRange::at_least(lower, true),
    }
}

/// Versions strictly above everything below `next`; empty when nothing is.
fn from_next(floor: Version, next: Option<Version>) -> VersionRange {
    match next {
        Some(next) => VersionRange::at_least(next, true),
        None => VersionRange::between(floor.clone(), false, floor, false),
    }
}

/// Versions below `next`; every version when there is no `next`.
fn below_next(next: Option<Version>) -> VersionRange {
    match next {
        Some(next) => VersionRange::below(next, false),
        None => VersionRange::any(),
    }
}

/// Interval covered by a single comparator.
fn comparator_range(c: &Comparator) -> VersionRange {
    let floor = Version {
        major: c.major,
        minor: c.minor.unwrap_or(0),
        patch: c.patch.unwrap_or(0),
        pre: c.pre.clone(),
        build: semver::BuildMetadata::EMPTY,
    };

    match c.op {
        Op::Exact => match (c.minor, c.patch) {
            (Some(_), Some(_)) => VersionRange::between(floor.clone(), true, floor, true),
            (Some(minor), None) => half_open(floor, next_minor(c.major, minor)),
            (None, _) => half_open(floor, next_major(c.major)),
        },
        Op::Greater => match (c.minor, c.patch) {
            (Some(_), Some(_)) => VersionRange::at_least(floor, false),
            (Some(minor), None) => from_next(floor, next_minor(c.major, minor)),
            (None, _) => from_next(floor, next_major(c.major)),
        },
        Op::GreaterEq => VersionRange::at_least(floor, true),
        Op::Less => VersionRange::below(floor, false),
        Op::LessEq => match (c.minor, c.patch) {
            (Some(_), Some(_)) => VersionRange::below(floor, true),
            (Some(minor), None) => below_next(next_minor(c.major, minor)),
            (None, _) => below_next(next_major(c.major)),
        },
        Op::Tilde => match c.minor {
            Some(minor) => half_open(floor, next_minor(c.major, minor)),
            None => half_open(floor, next_major(c.major)),
        },
        Op::Caret => {
            let upper = if c.major > 0 {
                next_major(c.major)
            } else {
                match (c.minor, c.patch) {
                    (None, _) => Some(release(1, 0, 0)),
                    (Some(minor), _) if minor > 0 => next_minor(0, minor),
                    (Some(_), None) => Some(release(0, 1, 0)),
                    (Some(_), Some(patch)) => next_patch(0, 0, patch),
                }
            };
            half_open(floor, upper)
        }
        Op::Wildcard => match c.minor {
            Some(minor) => half_open(floor, next_minor(c.major, minor)),
            None => half_open(floor, next_major(c.major)),
        },
        _ => VersionRange::any(),
    }
}

/// Interval of versions accepted by a requirement.
pub fn range_of(req: &VersionReq) -> VersionRange {
    req.comparators
        .iter()
        .map(comparator_range)
        .fold(VersionRange::any(), |acc, r| acc.intersect(&r))
}

/// Whether some version can satisfy both requirements at once.
pub fn compatible(a: &VersionReq, b: &VersionReq) -> bool {
    !range_of(a).intersect(&range_of(b)).is_empty()
}

/// Highest candidate matching every requirement.
pub fn highest_matching<'a, I>(reqs: &[&VersionReq], candidates: I) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    candidates
        .into_iter()
        .filter(|v| reqs.iter().all(|r| r.matches(v)))
        .max()
}
