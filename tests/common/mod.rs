#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use actorbus::{
    Actor, ActorConfig, ConnectionSetup, Context, Proxy, ProxyAddress, ProxyConfig, ProxyHandle,
    RegAddress, SocketFactory,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn factory() -> SocketFactory {
    SocketFactory::new(Context::new())
}

pub fn proxy_address(port: u16) -> ProxyAddress {
    ProxyAddress::new("127.0.0.1", port).unwrap()
}

pub fn registrar_address(port: u16) -> RegAddress {
    RegAddress::new("127.0.0.1", port).unwrap()
}

pub async fn start_proxy(factory: &SocketFactory, port: u16) -> ProxyHandle {
    Proxy::new(factory.clone(), ProxyConfig::new(proxy_address(port)))
        .start()
        .await
        .unwrap()
}

pub fn actor_config(proxy_port: u16, registrar_port: u16) -> ActorConfig {
    let setup = ConnectionSetup::default()
        .post_connection_sleep(Duration::from_millis(10))
        .post_subscription_sleep(Duration::from_millis(10));
    ActorConfig::new(proxy_address(proxy_port), registrar_address(registrar_port)).setup(setup)
}

pub fn actor(factory: &SocketFactory, name: &str, proxy_port: u16, registrar_port: u16) -> Actor {
    Actor::new(name, factory.clone(), actor_config(proxy_port, registrar_port)).unwrap()
}

/// Poll `condition` every 20 ms until it holds or `timeout` runs out
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
