//! Topic-indexed registration store
//!
//! Records live in a two-level map, `domain -> topic -> records`, so the
//! hierarchical queries only visit the buckets that can possibly match.
//! The registrar keeps one database per owner type.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::topic::{Topic, ANY};

use super::query::RegFilter;
use super::record::RegistrationRecord;

type TopicBuckets = HashMap<Topic, HashSet<RegistrationRecord>>;

/// Concurrent registration database
///
/// Every query returns an owned copy; callers never see the live maps.
#[derive(Debug, Default)]
pub struct RegistrationDatabase {
    domains: RwLock<HashMap<String, TopicBuckets>>,
}

impl RegistrationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record.
    ///
    /// A record with the same identity is replaced, so the latest port and
    /// description win.
    pub async fn register(&self, record: RegistrationRecord) {
        let mut domains = self.domains.write().await;
        let bucket = domains
            .entry(record.topic().domain().to_string())
            .or_default()
            .entry(record.topic().clone())
            .or_default();

        tracing::debug!(record = %record, "Registration stored");
        bucket.replace(record);
    }

    /// Remove one record by identity. Returns whether it was present.
    pub async fn remove(&self, record: &RegistrationRecord) -> bool {
        let mut domains = self.domains.write().await;
        let domain = record.topic().domain();

        let Some(topics) = domains.get_mut(domain) else {
            return false;
        };
        let Some(bucket) = topics.get_mut(record.topic()) else {
            return false;
        };

        let removed = bucket.remove(record);
        if bucket.is_empty() {
            topics.remove(record.topic());
        }
        if topics.is_empty() {
            domains.remove(domain);
        }

        if removed {
            tracing::debug!(record = %record, "Registration removed");
        }
        removed
    }

    /// Remove every record registered from `host`. Returns how many went.
    pub async fn remove_host(&self, host: &str) -> usize {
        let mut domains = self.domains.write().await;
        let mut removed = 0;

        for topics in domains.values_mut() {
            for bucket in topics.values_mut() {
                let before = bucket.len();
                bucket.retain(|r| r.host() != host);
                removed += before - bucket.len();
            }
            topics.retain(|_, bucket| !bucket.is_empty());
        }
        domains.retain(|_, topics| !topics.is_empty());

        if removed > 0 {
            tracing::debug!(host = %host, removed = removed, "Host registrations removed");
        }
        removed
    }

    /// Records registered under `pattern`: `pattern.is_parent(record.topic)`
    pub async fn find(&self, pattern: &Topic) -> HashSet<RegistrationRecord> {
        let domains = self.domains.read().await;

        let candidates: Vec<&TopicBuckets> = if pattern.domain() == ANY {
            domains.values().collect()
        } else {
            domains.get(pattern.domain()).into_iter().collect()
        };

        candidates
            .into_iter()
            .flat_map(|topics| topics.iter())
            .filter(|(topic, _)| pattern.is_parent(topic))
            .flat_map(|(_, bucket)| bucket.iter().cloned())
            .collect()
    }

    /// Records whose topic covers `topic`: `record.topic.is_parent(topic)`
    pub async fn rfind(&self, topic: &Topic) -> HashSet<RegistrationRecord> {
        let domains = self.domains.read().await;

        // Only a matching domain or a wildcard domain can cover the topic
        let mut keys = vec![topic.domain()];
        if topic.domain() != ANY {
            keys.push(ANY);
        }

        keys.into_iter()
            .filter_map(|domain| domains.get(domain))
            .flat_map(|topics| topics.iter())
            .filter(|(registered, _)| registered.is_parent(topic))
            .flat_map(|(_, bucket)| bucket.iter().cloned())
            .collect()
    }

    /// Records satisfying an attribute template
    pub async fn filter(&self, filter: &RegFilter) -> HashSet<RegistrationRecord> {
        let domains = self.domains.read().await;

        let candidates: Vec<&TopicBuckets> = if filter.domain_value() == ANY {
            domains.values().collect()
        } else {
            domains.get(filter.domain_value()).into_iter().collect()
        };

        candidates
            .into_iter()
            .flat_map(|topics| topics.values())
            .flat_map(|bucket| bucket.iter())
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }

    /// Records registered with exactly `topic`
    pub async fn same(&self, topic: &Topic) -> HashSet<RegistrationRecord> {
        let domains = self.domains.read().await;
        domains
            .get(topic.domain())
            .and_then(|topics| topics.get(topic))
            .cloned()
            .unwrap_or_default()
    }

    /// Every record
    pub async fn all(&self) -> HashSet<RegistrationRecord> {
        let domains = self.domains.read().await;
        domains
            .values()
            .flat_map(|topics| topics.values())
            .flat_map(|bucket| bucket.iter().cloned())
            .collect()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        let domains = self.domains.read().await;
        domains
            .values()
            .flat_map(|topics| topics.values())
            .map(HashSet::len)
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.domains.read().await.is_empty()
    }

    /// Number of non-empty `(domain, topic)` buckets
    pub async fn bucket_count(&self) -> usize {
        let domains = self.domains.read().await;
        domains.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::record::OwnerType;

    fn record(name: &str, host: &str, topic: &str) -> RegistrationRecord {
        RegistrationRecord::new(
            name,
            OwnerType::Publisher,
            host,
            7771,
            Topic::wrap(topic).unwrap(),
            "",
        )
        .unwrap()
    }

    fn names(records: &HashSet<RegistrationRecord>) -> Vec<String> {
        let mut names: Vec<String> = records.iter().map(|r| r.name().to_string()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_register_then_same() {
        let db = RegistrationDatabase::new();
        let r = record("asimov", "10.0.0.1", "writer:scifi:books");
        db.register(r.clone()).await;

        let found = db.same(r.topic()).await;
        assert!(found.contains(&r));
        assert_eq!(db.len().await, 1);
    }

    #[tokio::test]
    async fn test_reregister_replaces() {
        let db = RegistrationDatabase::new();
        db.register(record("asimov", "10.0.0.1", "d:s:t")).await;

        let updated = RegistrationRecord::new(
            "asimov",
            OwnerType::Publisher,
            "10.0.0.1",
            9000,
            Topic::wrap("d:s:t").unwrap(),
            "moved",
        )
        .unwrap();
        db.register(updated).await;

        let all = db.all().await;
        assert_eq!(all.len(), 1);
        let stored = all.iter().next().unwrap();
        assert_eq!(stored.port(), 9000);
        assert_eq!(stored.description(), "moved");
    }

    #[tokio::test]
    async fn test_remove_prunes_buckets() {
        let db = RegistrationDatabase::new();
        let r = record("asimov", "10.0.0.1", "d:s:t");
        db.register(r.clone()).await;
        assert_eq!(db.bucket_count().await, 1);

        assert!(db.remove(&r).await);
        assert!(!db.remove(&r).await);
        assert!(db.is_empty().await);
        assert_eq!(db.bucket_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_host() {
        let db = RegistrationDatabase::new();
        db.register(record("a", "10.0.0.1", "d:s:t")).await;
        db.register(record("b", "10.0.0.2", "d:s:t")).await;
        db.register(record("c", "10.0.0.1", "e")).await;

        assert_eq!(db.remove_host("10.0.0.1").await, 2);
        assert_eq!(names(&db.all().await), vec!["b"]);
        assert_eq!(db.bucket_count().await, 1);
    }

    #[tokio::test]
    async fn test_find_and_rfind_directions() {
        let db = RegistrationDatabase::new();
        db.register(record("broad", "h", "writer")).await;
        db.register(record("mid", "h", "writer:scifi")).await;
        db.register(record("narrow", "h", "writer:scifi:books")).await;
        db.register(record("other", "h", "writer:horror:books")).await;
        db.register(record("wild", "h", "*:scifi")).await;

        let pattern = Topic::wrap("writer:scifi").unwrap();

        // Registrations under the pattern
        assert_eq!(names(&db.find(&pattern).await), vec!["mid", "narrow"]);

        // Registrations covering the pattern, including wildcard domains
        assert_eq!(names(&db.rfind(&pattern).await), vec!["broad", "mid", "wild"]);
    }

    #[tokio::test]
    async fn test_find_with_wildcard_domain() {
        let db = RegistrationDatabase::new();
        db.register(record("a", "h", "x:scifi:t")).await;
        db.register(record("b", "h", "y:scifi")).await;
        db.register(record("c", "h", "y:horror")).await;

        let pattern = Topic::build(ANY, Some("scifi"), None).unwrap();
        assert_eq!(names(&db.find(&pattern).await), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_queries_return_copies() {
        let db = RegistrationDatabase::new();
        let r = record("a", "h", "d");
        db.register(r.clone()).await;

        let snapshot = db.all().await;
        db.remove(&r).await;
        assert_eq!(snapshot.len(), 1);
        assert!(db.all().await.is_empty());
    }
}
