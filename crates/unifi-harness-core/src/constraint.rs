//! Version constraints.
//!
//! A [`VersionConstraint`] is a predicate over a [`ControllerVersion`], used
//! where a feature's support window is bounded on both ends or has holes.
//! Constraints can be built in code or parsed from strings:
//!
//! ```text
//! constraint := group ( "||" group )*
//! group      := term ( "," term )*
//! term       := op? version
//! op         := "=" | "!=" | ">" | ">=" | "<" | "<=" | "~>"
//! ```
//!
//! `~>` is the pessimistic operator: `~> 6.1` allows `6.1.0` up to, but not
//! including, `7.0.0`, and `~> 6.1.61` allows `6.1.61` up to `6.2.0`.
//!
//! A pre-release version only satisfies a term whose own version is a
//! pre-release of the same `major.minor.patch`.

use std::fmt;
use std::str::FromStr;

use crate::error::{GateError, Result};
use crate::version::ControllerVersion;

/// Comparison operator of a single constraint term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `~>`
    Pessimistic,
}

impl Op {
    /// Operators ordered so that two-character forms are tried first.
    const PREFIXES: [(&'static str, Self); 7] = [
        (">=", Self::Ge),
        ("<=", Self::Le),
        ("!=", Self::Ne),
        ("~>", Self::Pessimistic),
        (">", Self::Gt),
        ("<", Self::Lt),
        ("=", Self::Eq),
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Pessimistic => "~>",
        }
    }
}

/// A single `op version` comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    op: Op,
    version: ControllerVersion,
    /// Number of numeric segments written in the constraint; drives `~>`.
    segments: usize,
}

impl Term {
    /// Create a term from an operator and a fully specified version.
    #[must_use]
    pub const fn new(op: Op, version: ControllerVersion) -> Self {
        Self {
            op,
            version,
            segments: 3,
        }
    }

    /// The term's operator.
    #[must_use]
    pub const fn op(&self) -> Op {
        self.op
    }

    /// The term's version.
    #[must_use]
    pub const fn version(&self) -> &ControllerVersion {
        &self.version
    }

    fn matches(&self, version: &ControllerVersion) -> bool {
        if !version.pre().is_empty() && !self.admits_prerelease_of(version) {
            return false;
        }

        let target = &self.version;
        match self.op {
            Op::Eq => version == target,
            Op::Ne => version != target,
            Op::Gt => version > target,
            Op::Ge => version >= target,
            Op::Lt => version < target,
            Op::Le => version <= target,
            Op::Pessimistic => {
                let fixed = self.segments.saturating_sub(1).min(3);
                version >= target
                    && numeric(version)
                        .iter()
                        .zip(numeric(target))
                        .take(fixed)
                        .all(|(a, b)| *a == b)
            }
        }
    }

    fn admits_prerelease_of(&self, version: &ControllerVersion) -> bool {
        !self.version.pre().is_empty() && numeric(&self.version) == numeric(version)
    }

    fn parse(constraint: &str, term: &str) -> Result<Self> {
        let term = term.trim();
        if term.is_empty() {
            return Err(invalid(constraint, "empty constraint term"));
        }

        let (op, rest) = Op::PREFIXES
            .iter()
            .find_map(|(prefix, op)| term.strip_prefix(prefix).map(|rest| (*op, rest)))
            .unwrap_or((Op::Eq, term));
        let rest = rest.trim();

        let version: ControllerVersion = rest
            .parse()
            .map_err(|e: GateError| invalid(constraint, e.to_string()))?;

        Ok(Self {
            op,
            version,
            segments: written_segments(rest),
        })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.as_str(), self.version)
    }
}

/// A predicate over controller versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionConstraint {
    /// A single comparison.
    Term(Term),
    /// Every inner constraint must hold.
    All(Vec<VersionConstraint>),
    /// At least one inner constraint must hold.
    Any(Vec<VersionConstraint>),
}

impl VersionConstraint {
    /// `>= version`
    #[must_use]
    pub const fn at_least(version: ControllerVersion) -> Self {
        Self::Term(Term::new(Op::Ge, version))
    }

    /// `< version`
    #[must_use]
    pub const fn below(version: ControllerVersion) -> Self {
        Self::Term(Term::new(Op::Lt, version))
    }

    /// `!= version`
    #[must_use]
    pub const fn excluding(version: ControllerVersion) -> Self {
        Self::Term(Term::new(Op::Ne, version))
    }

    /// `>= min, < max`
    #[must_use]
    pub fn between(min: ControllerVersion, max: ControllerVersion) -> Self {
        Self::All(vec![Self::at_least(min), Self::below(max)])
    }

    /// Check whether `version` satisfies this constraint.
    #[must_use]
    pub fn matches(&self, version: &ControllerVersion) -> bool {
        match self {
            Self::Term(term) => term.matches(version),
            Self::All(inner) => inner.iter().all(|c| c.matches(version)),
            Self::Any(inner) => inner.iter().any(|c| c.matches(version)),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(invalid(s, "empty constraint"));
        }

        let mut groups = s
            .split("||")
            .map(|group| {
                let mut terms = group
                    .split(',')
                    .map(|term| Term::parse(s, term).map(Self::Term))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    Self::All(terms)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(if groups.len() == 1 {
            groups.remove(0)
        } else {
            Self::Any(groups)
        })
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (inner, sep) = match self {
            Self::Term(term) => return term.fmt(f),
            Self::All(inner) => (inner, ", "),
            Self::Any(inner) => (inner, " || "),
        };
        for (i, c) in inner.iter().enumerate() {
            if i > 0 {
                f.write_str(sep)?;
            }
            c.fmt(f)?;
        }
        Ok(())
    }
}

fn numeric(version: &ControllerVersion) -> [u64; 3] {
    [version.major(), version.minor(), version.patch()]
}

fn written_segments(version: &str) -> usize {
    let core = version.trim_start_matches('v');
    let core = core.split(['-', '+']).next().unwrap_or(core);
    core.split('.').count()
}

fn invalid(raw: &str, reason: impl Into<String>) -> GateError {
    GateError::InvalidConstraint {
        raw: raw.to_string(),
        reason: reason.into(),
    }
}
