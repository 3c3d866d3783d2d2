mod common;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bytes::Bytes;

use actorbus::registration::RegFilter;
use actorbus::{
    Actor, Error, OwnerType, RegInfo, RegQuery, RegistrarConfig, RegistrarDriver, RegistrarService,
    RegistrationRecord, Topic,
};

use common::{actor, actor_config, factory, init_tracing, registrar_address};

fn topic(s: &str) -> Topic {
    Topic::wrap(s).unwrap()
}

fn names(records: &HashSet<RegistrationRecord>) -> Vec<String> {
    let mut names: Vec<String> = records.iter().map(|r| r.name().to_string()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_actor_register_discover_deregister() {
    init_tracing();
    let factory = factory();
    let registrar = RegistrarService::bind(&factory, RegistrarConfig::new(registrar_address(19401)))
        .await
        .unwrap()
        .spawn();

    // The proxy is never contacted for registration
    let producer = actor(&factory, "producer", 19405, 19401);
    let consumer = actor(&factory, "consumer", 19405, 19401);
    let wide = actor(&factory, "wide", 19405, 19401);

    producer
        .register(RegInfo::publisher(topic("d:s:t"), "readings"))
        .await
        .unwrap();
    consumer
        .register(RegInfo::subscriber(topic("d:s"), "all of d:s"))
        .await
        .unwrap();
    wide.register(RegInfo::subscriber(topic("d"), "everything in d"))
        .await
        .unwrap();

    let publishers = consumer
        .discover(&RegQuery::publishers().matching(&topic("d")))
        .await
        .unwrap();
    assert_eq!(names(&publishers), vec!["producer"]);
    let record = publishers.iter().next().unwrap();
    assert_eq!(record.host(), "127.0.0.1");
    assert_eq!(record.port(), 19405);
    assert_eq!(record.description(), "readings");

    let subscribers = producer
        .discover(&RegQuery::subscribers().matching(&topic("d:s:t")))
        .await
        .unwrap();
    assert_eq!(names(&subscribers), vec!["consumer", "wide"]);

    let same = producer
        .discover(&RegQuery::subscribers().with_same(&topic("d:s")))
        .await
        .unwrap();
    assert_eq!(names(&same), vec!["consumer"]);

    let by_host = producer
        .discover(&RegQuery::subscribers().with_host("127.0.0.1"))
        .await
        .unwrap();
    assert_eq!(by_host.len(), 2);

    let by_subject = producer
        .discover(&RegQuery::subscribers().with_subject("s"))
        .await
        .unwrap();
    assert_eq!(names(&by_subject), vec!["consumer"]);

    consumer
        .deregister(RegInfo::subscriber(topic("d:s"), "all of d:s"))
        .await
        .unwrap();
    let remaining = producer
        .discover(&RegQuery::subscribers().all())
        .await
        .unwrap();
    assert_eq!(names(&remaining), vec!["wide"]);
    assert_eq!(registrar.subscribers().len().await, 1);
    assert_eq!(registrar.publishers().len().await, 1);

    producer.close().await;
    consumer.close().await;
    wide.close().await;
    registrar.stop().await;
}

#[tokio::test]
async fn test_host_eviction() {
    init_tracing();
    let factory = factory();
    let address = registrar_address(19411);
    let registrar = RegistrarService::bind(&factory, RegistrarConfig::new(address))
        .await
        .unwrap()
        .spawn();
    let mut driver = RegistrarDriver::new(factory.clone(), address, "tester");

    let hosts = ["10.0.0.1", "10.0.0.2", "10.0.0.3"];
    let mut expected = HashSet::new();
    for i in 0..12 {
        let host = hosts[i % hosts.len()];
        let owner = if i % 2 == 0 {
            OwnerType::Publisher
        } else {
            OwnerType::Subscriber
        };
        let record = RegistrationRecord::new(
            format!("actor-{i}"),
            owner,
            host,
            7771,
            topic(&format!("d:{}", i % 4)),
            "",
        )
        .unwrap();
        if host != "10.0.0.2" {
            expected.insert(record.clone());
        }
        driver.register(record).await.unwrap();
    }

    driver.remove_host("10.0.0.2").await.unwrap();

    let mut left = driver.query(&RegQuery::publishers().all()).await.unwrap();
    left.extend(driver.query(&RegQuery::subscribers().all()).await.unwrap());
    assert_eq!(left, expected);
    assert!(left.iter().all(|r| r.host() != "10.0.0.2"));

    driver.close().await;
    registrar.stop().await;
}

#[tokio::test]
async fn test_malformed_request_gets_error_reply() {
    init_tracing();
    let factory = factory();
    let address = registrar_address(19421);
    let registrar = RegistrarService::bind(&factory, RegistrarConfig::new(address))
        .await
        .unwrap()
        .spawn();

    let mut raw = factory.new_req(address.endpoint()).unwrap();
    let reply = raw
        .request(
            vec![
                Bytes::from_static(b"explodePublisher"),
                Bytes::from_static(b"tester"),
                Bytes::new(),
            ],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert_eq!(reply.len(), 3);
    // Error tag
    assert_eq!(reply[2].first(), Some(&1));
    raw.close(Duration::ZERO).await;

    // Still serving
    let mut driver = RegistrarDriver::new(factory.clone(), address, "tester");
    let filter = RegFilter::new().domain("d");
    let found = driver
        .query(&RegQuery::publishers().filter(filter))
        .await
        .unwrap();
    assert!(found.is_empty());

    driver.close().await;
    registrar.stop().await;
}

#[tokio::test]
async fn test_registrar_port_in_use() {
    init_tracing();
    let factory = factory();
    let address = registrar_address(19431);
    let first = RegistrarService::bind(&factory, RegistrarConfig::new(address))
        .await
        .unwrap();

    let second = RegistrarService::bind(&factory, RegistrarConfig::new(address)).await;
    assert!(matches!(second, Err(Error::AddressInUse(_))));
    drop(first);
}

#[tokio::test]
async fn test_silent_registrar_does_not_delay_others() {
    init_tracing();
    let factory = factory();

    // Accepts connections and never answers
    let silent = tokio::net::TcpListener::bind("127.0.0.1:19441").await.unwrap();
    let holder = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = silent.accept().await {
            held.push(stream);
        }
    });

    let registrar = RegistrarService::bind(&factory, RegistrarConfig::new(registrar_address(19445)))
        .await
        .unwrap()
        .spawn();

    let config = actor_config(19449, 19445).registrar_timeout(Duration::from_secs(2));
    let actor = Actor::new("patient", factory.clone(), config).unwrap();
    actor
        .register(RegInfo::publisher(topic("d:s:t"), ""))
        .await
        .unwrap();

    let query = RegQuery::publishers().matching(&topic("d"));
    let (stalled, (found, elapsed)) = tokio::join!(
        actor.discover_at(registrar_address(19441), &query),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let start = Instant::now();
            let found = actor.discover(&query).await;
            (found, start.elapsed())
        }
    );

    assert!(matches!(stalled, Err(Error::RequestTimeout { .. })));
    assert_eq!(names(&found.unwrap()), vec!["patient"]);
    assert!(
        elapsed < Duration::from_secs(1),
        "live registrar answered after {:?}",
        elapsed
    );

    holder.abort();
    actor.close().await;
    registrar.stop().await;
}
