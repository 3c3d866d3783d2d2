//! Registration requests as seen by actors
//!
//! [`RegInfo`] describes what an actor wants to register; the actor fills
//! in its own name and address. [`RegQuery`] describes a discovery search:
//!
//! ```text
//! RegQuery::publishers().matching(&topic)     publishers under a pattern
//! RegQuery::subscribers().matching(&topic)    subscribers covering a topic
//! RegQuery::publishers().with_same(&topic)    exact topic
//! RegQuery::subscribers().with_host("h")      attribute filter
//! RegQuery::publishers().all()                everything
//! ```

use crate::topic::{Topic, ANY};

use super::record::{OwnerType, RegistrationRecord};

/// What an actor registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegInfo {
    owner: OwnerType,
    topic: Topic,
    description: String,
}

impl RegInfo {
    pub fn publisher(topic: Topic, description: impl Into<String>) -> Self {
        Self {
            owner: OwnerType::Publisher,
            topic,
            description: description.into(),
        }
    }

    pub fn subscriber(topic: Topic, description: impl Into<String>) -> Self {
        Self {
            owner: OwnerType::Subscriber,
            topic,
            description: description.into(),
        }
    }

    pub fn owner(&self) -> OwnerType {
        self.owner
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Attribute-wise filter template.
///
/// Wildcard topic parts and an unset host or zero port impose no
/// constraint. Set topic parts are compared exactly, without hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegFilter {
    domain: String,
    subject: String,
    kind: String,
    host: Option<String>,
    port: u16,
}

impl RegFilter {
    /// Filter matching every record
    pub fn new() -> Self {
        Self {
            domain: ANY.to_string(),
            subject: ANY.to_string(),
            kind: ANY.to_string(),
            host: None,
            port: 0,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Restrict to a port; only applied together with a host
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn domain_value(&self) -> &str {
        &self.domain
    }

    pub fn subject_value(&self) -> &str {
        &self.subject
    }

    pub fn kind_value(&self) -> &str {
        &self.kind
    }

    pub fn host_value(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port_value(&self) -> u16 {
        self.port
    }

    /// Whether `record` satisfies every set attribute
    pub fn matches(&self, record: &RegistrationRecord) -> bool {
        fn attr(expected: &str, actual: &str) -> bool {
            expected == ANY || expected == actual
        }

        let topic = record.topic();
        if !(attr(&self.domain, topic.domain())
            && attr(&self.subject, topic.subject())
            && attr(&self.kind, topic.kind()))
        {
            return false;
        }

        match &self.host {
            Some(host) => {
                record.host() == host && (self.port == 0 || record.port() == self.port)
            }
            None => true,
        }
    }
}

impl Default for RegFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// The search a query performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// Hierarchical match; direction depends on the owner type
    Matching(Topic),
    /// Exact topic equality
    Same(Topic),
    Filter(RegFilter),
    All,
}

/// A discovery query against one owner-type table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegQuery {
    owner: OwnerType,
    kind: QueryKind,
}

/// Chooses the search for a [`RegQuery`]
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    owner: OwnerType,
}

impl RegQuery {
    /// Search registered publishers
    pub fn publishers() -> QueryBuilder {
        QueryBuilder {
            owner: OwnerType::Publisher,
        }
    }

    /// Search registered subscribers
    pub fn subscribers() -> QueryBuilder {
        QueryBuilder {
            owner: OwnerType::Subscriber,
        }
    }

    pub(crate) fn new(owner: OwnerType, kind: QueryKind) -> Self {
        Self { owner, kind }
    }

    pub fn owner(&self) -> OwnerType {
        self.owner
    }

    pub fn kind(&self) -> &QueryKind {
        &self.kind
    }
}

impl QueryBuilder {
    /// Publishers: registrations under `topic`. Subscribers: registrations
    /// whose topic covers `topic`.
    pub fn matching(self, topic: &Topic) -> RegQuery {
        RegQuery::new(self.owner, QueryKind::Matching(topic.clone()))
    }

    pub fn with_same(self, topic: &Topic) -> RegQuery {
        RegQuery::new(self.owner, QueryKind::Same(topic.clone()))
    }

    pub fn with_domain(self, domain: &str) -> RegQuery {
        self.filter(RegFilter::new().domain(domain))
    }

    pub fn with_subject(self, subject: &str) -> RegQuery {
        self.filter(RegFilter::new().subject(subject))
    }

    pub fn with_type(self, kind: &str) -> RegQuery {
        self.filter(RegFilter::new().kind(kind))
    }

    pub fn with_host(self, host: &str) -> RegQuery {
        self.filter(RegFilter::new().host(host))
    }

    pub fn filter(self, filter: RegFilter) -> RegQuery {
        RegQuery::new(self.owner, QueryKind::Filter(filter))
    }

    pub fn all(self) -> RegQuery {
        RegQuery::new(self.owner, QueryKind::All)
    }
}
