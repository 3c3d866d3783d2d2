//! Hierarchical topic addressing
//!
//! A topic has three parts, `domain:subject:type`. Any part may be the
//! wildcard [`ANY`], which acts as "no constraint" when the topic is used
//! as a pattern:
//!
//! ```text
//!   pattern          candidate            is_parent
//!   d                d:s:t                yes
//!   d:*:t            d:s:t                yes
//!   d:s:t            d                    no   (direction matters)
//!   d:s              d:s2:t               no
//! ```
//!
//! The canonical string drops trailing wildcards, so `("d", ANY, ANY)` is
//! `"d"` and `("d", ANY, "t")` is `"d:*:t"`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Wildcard component value
pub const ANY: &str = "*";

const SEPARATOR: char = ':';

/// Immutable `domain:subject:type` address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    domain: String,
    subject: String,
    kind: String,
}

impl Topic {
    /// Build a topic from explicit parts.
    ///
    /// `None` parts default to [`ANY`].
    pub fn build(domain: &str, subject: Option<&str>, kind: Option<&str>) -> Result<Self> {
        let subject = subject.unwrap_or(ANY);
        let kind = kind.unwrap_or(ANY);

        for part in [domain, subject, kind] {
            if part.is_empty() {
                return Err(Error::InvalidTopic(format!("{}:{}:{}", domain, subject, kind)));
            }
        }
        if domain.contains(SEPARATOR) || subject.contains(SEPARATOR) {
            return Err(Error::InvalidTopic(format!("{}:{}:{}", domain, subject, kind)));
        }

        Ok(Self {
            domain: domain.to_string(),
            subject: subject.to_string(),
            kind: kind.to_string(),
        })
    }

    /// Topic with only a domain
    pub fn domain_only(domain: &str) -> Result<Self> {
        Self::build(domain, None, None)
    }

    /// Parse a canonical topic string.
    ///
    /// Splits on the first two separators, so the type may itself contain `:`.
    pub fn wrap(canonical: &str) -> Result<Self> {
        let mut parts = canonical.splitn(3, SEPARATOR);
        let domain = parts.next().unwrap_or_default();
        let subject = parts.next();
        let kind = parts.next();

        if subject == Some("") || kind == Some("") {
            return Err(Error::InvalidTopic(canonical.to_string()));
        }
        Self::build(domain, subject, kind)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The third component (`type` in the canonical form)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether this topic, used as a pattern, covers `other`.
    ///
    /// Each non-wildcard component of `self` must equal the matching
    /// component of `other`. Wildcards in `other` get no special treatment.
    pub fn is_parent(&self, other: &Topic) -> bool {
        fn covers(pattern: &str, value: &str) -> bool {
            pattern == ANY || pattern == value
        }

        covers(&self.domain, &other.domain)
            && covers(&self.subject, &other.subject)
            && covers(&self.kind, &other.kind)
    }

    /// Canonical string form
    pub fn as_canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.domain)?;
        if self.kind != ANY {
            write!(f, "{}{}{}{}", SEPARATOR, self.subject, SEPARATOR, self.kind)
        } else if self.subject != ANY {
            write!(f, "{}{}", SEPARATOR, self.subject)
        } else {
            Ok(())
        }
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::wrap(s)
    }
}
