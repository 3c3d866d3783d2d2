//! Randomized check of every registration query against a brute-force scan

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use actorbus::registration::RegFilter;
use actorbus::topic::ANY;
use actorbus::{OwnerType, RegistrationDatabase, RegistrationRecord, Topic};

const DOMAINS: &[&str] = &["a", "b", ANY];
const SUBJECTS: &[&str] = &["x", "y", ANY];
const KINDS: &[&str] = &["1", "2", ANY];
const HOSTS: &[&str] = &["10.0.0.1", "10.0.0.2", "10.0.0.3"];
const NAMES: &[&str] = &["alpha", "beta", "gamma", "delta"];
const PORTS: &[u16] = &[7771, 7781];

/// Every field, so a replaced record with a new port compares unequal
type Full = (String, String, String, u16, String);

fn full(records: &HashSet<RegistrationRecord>) -> HashSet<Full> {
    records
        .iter()
        .map(|r| {
            (
                r.name().to_string(),
                r.host().to_string(),
                r.topic().to_string(),
                r.port(),
                r.description().to_string(),
            )
        })
        .collect()
}

fn pick<'a, T>(rng: &mut StdRng, values: &'a [T]) -> &'a T {
    values.choose(rng).unwrap()
}

fn random_topic(rng: &mut StdRng) -> Topic {
    Topic::build(
        *pick(rng, DOMAINS),
        Some(*pick(rng, SUBJECTS)),
        Some(*pick(rng, KINDS)),
    )
    .unwrap()
}

fn random_record(rng: &mut StdRng, owner: OwnerType) -> RegistrationRecord {
    RegistrationRecord::new(
        *pick(rng, NAMES),
        owner,
        *pick(rng, HOSTS),
        *pick(rng, PORTS),
        random_topic(rng),
        format!("d{}", rng.gen_range(0..3)),
    )
    .unwrap()
}

fn random_filter(rng: &mut StdRng) -> RegFilter {
    let mut filter = RegFilter::new()
        .domain(*pick(rng, DOMAINS))
        .subject(*pick(rng, SUBJECTS))
        .kind(*pick(rng, KINDS));
    if rng.gen_bool(0.5) {
        filter = filter.host(*pick(rng, HOSTS));
        if rng.gen_bool(0.5) {
            filter = filter.port(*pick(rng, PORTS));
        }
    }
    filter
}

fn brute_filter(filter: &RegFilter, record: &RegistrationRecord) -> bool {
    let attr = |expected: &str, actual: &str| expected == ANY || expected == actual;
    let topic = record.topic();
    let topic_ok = attr(filter.domain_value(), topic.domain())
        && attr(filter.subject_value(), topic.subject())
        && attr(filter.kind_value(), topic.kind());
    let host_ok = match filter.host_value() {
        Some(host) => {
            record.host() == host && (filter.port_value() == 0 || record.port() == filter.port_value())
        }
        None => true,
    };
    topic_ok && host_ok
}

fn select(
    reference: &HashSet<RegistrationRecord>,
    predicate: impl Fn(&RegistrationRecord) -> bool,
) -> HashSet<RegistrationRecord> {
    reference.iter().filter(|r| predicate(r)).cloned().collect()
}

async fn check(db: &RegistrationDatabase, reference: &HashSet<RegistrationRecord>, rng: &mut StdRng) {
    assert_eq!(full(&db.all().await), full(reference));
    assert_eq!(db.len().await, reference.len());

    let pattern = random_topic(rng);
    assert_eq!(
        full(&db.find(&pattern).await),
        full(&select(reference, |r| pattern.is_parent(r.topic()))),
        "find {}",
        pattern
    );
    assert_eq!(
        full(&db.rfind(&pattern).await),
        full(&select(reference, |r| r.topic().is_parent(&pattern))),
        "rfind {}",
        pattern
    );
    assert_eq!(
        full(&db.same(&pattern).await),
        full(&select(reference, |r| r.topic() == &pattern)),
        "same {}",
        pattern
    );

    let filter = random_filter(rng);
    assert_eq!(
        full(&db.filter(&filter).await),
        full(&select(reference, |r| brute_filter(&filter, r))),
        "filter {:?}",
        filter
    );
}

async fn run(seed: u64, owner: OwnerType) {
    let mut rng = StdRng::seed_from_u64(seed);
    let db = RegistrationDatabase::new();
    let mut reference: HashSet<RegistrationRecord> = HashSet::new();

    for step in 0..600 {
        let roll = rng.gen_range(0..10);
        if roll < 6 {
            let record = random_record(&mut rng, owner);
            reference.replace(record.clone());
            db.register(record).await;
        } else if roll < 9 {
            // Mostly remove something present, sometimes something absent
            let record = match reference.iter().collect::<Vec<_>>().choose(&mut rng) {
                Some(existing) if rng.gen_bool(0.8) => (*existing).clone(),
                _ => random_record(&mut rng, owner),
            };
            let expected = reference.remove(&record);
            assert_eq!(db.remove(&record).await, expected, "step {step}");
        } else {
            let host = *pick(&mut rng, HOSTS);
            let before = reference.len();
            reference.retain(|r| r.host() != host);
            assert_eq!(db.remove_host(host).await, before - reference.len(), "step {step}");
        }

        check(&db, &reference, &mut rng).await;
    }
}

#[tokio::test]
async fn test_publisher_queries_match_brute_force() {
    for seed in [1, 7, 42] {
        run(seed, OwnerType::Publisher).await;
    }
}

#[tokio::test]
async fn test_subscriber_queries_match_brute_force() {
    for seed in [3, 11, 2024] {
        run(seed, OwnerType::Subscriber).await;
    }
}

#[tokio::test]
async fn test_removal_prunes_buckets() {
    let mut rng = StdRng::seed_from_u64(5);
    let db = RegistrationDatabase::new();
    let mut records = Vec::new();
    for _ in 0..50 {
        let record = random_record(&mut rng, OwnerType::Publisher);
        db.register(record.clone()).await;
        records.push(record);
    }
    records.shuffle(&mut rng);
    for record in &records {
        db.remove(record).await;
    }
    assert!(db.is_empty().await);
    assert_eq!(db.bucket_count().await, 0);
}
