//! Request/response over pub/sub
//!
//! Run with: cargo run --example ping_pong
//!
//! Starts a proxy and a registrar in-process, then:
//! - `pong` registers as a subscriber of `game:ping` and answers every message
//! - `ping` discovers who listens, then sends a few synchronous requests

use std::sync::Arc;
use std::time::Duration;

use actorbus::message::mime;
use actorbus::{
    Actor, ActorConfig, Context, Message, Proxy, ProxyAddress, ProxyConfig, RegAddress, RegInfo,
    RegQuery, RegistrarConfig, RegistrarService, SocketFactory, Topic,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("actorbus=info".parse()?),
        )
        .init();

    let factory = SocketFactory::new(Context::new());
    let proxy_address = ProxyAddress::new("127.0.0.1", 7771)?;
    let registrar_address = RegAddress::new("127.0.0.1", 8888)?;

    let proxy = Proxy::new(factory.clone(), ProxyConfig::new(proxy_address))
        .start()
        .await?;
    let registrar = RegistrarService::bind(&factory, RegistrarConfig::new(registrar_address))
        .await?
        .spawn();

    let config = ActorConfig::new(proxy_address, registrar_address);
    let topic = Topic::build("game", Some("ping"), None)?;

    let pong = Arc::new(Actor::new("pong", factory.clone(), config.clone())?);
    pong.register(RegInfo::subscriber(topic.clone(), "answers pings"))
        .await?;

    let responder = Arc::clone(&pong);
    let subscription = pong
        .subscribe(topic.clone(), move |msg: Message| {
            let responder = Arc::clone(&responder);
            async move {
                println!("pong got {:?}", msg.as_i64());
                let value = msg.as_i64().unwrap_or_default();
                match msg.response(mime::INT64, (value * 2).to_be_bytes().to_vec()) {
                    Ok(reply) => {
                        if let Err(e) = responder.publish(reply).await {
                            eprintln!("reply failed: {}", e);
                        }
                    }
                    Err(e) => eprintln!("cannot answer: {}", e),
                }
            }
        })
        .await?;

    let ping = Actor::new("ping", factory.clone(), config)?;
    let listeners = ping.discover(&RegQuery::subscribers().matching(&topic)).await?;
    for record in &listeners {
        println!("discovered {}", record);
    }

    for i in 1..=5 {
        let request = Message::from_i64(topic.clone(), i);
        let reply = ping.sync_publish(request, Duration::from_secs(2)).await?;
        println!("ping {} -> {:?}", i, reply.as_i64());
    }

    pong.deregister(RegInfo::subscriber(topic, "answers pings"))
        .await?;
    pong.unsubscribe(subscription).await;
    ping.close().await;
    if let Ok(pong) = Arc::try_unwrap(pong) {
        pong.close().await;
    }

    registrar.stop().await;
    proxy.stop().await;
    Ok(())
}
