//! Registrar service
//!
//! Serves the two registration databases over a request/response socket.
//! Requests are handled strictly one at a time; a malformed request gets an
//! error reply and the loop keeps going.
//!
//! ```text
//! Idle ──bind()──► Bound ──run()──► Serving ──stop/shutdown──► Stopped
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::address::RegAddress;
use crate::error::Result;
use crate::transport::{RepSocket, Request as RawRequest, SocketFactory};

use super::database::RegistrationDatabase;
use super::protocol::{Request, Response};
use super::query::QueryKind;
use super::record::{OwnerType, RegistrationRecord};

/// Registrar configuration
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
    /// Address to bind to
    pub address: RegAddress,

    /// Name put in the sender frame of every reply
    pub name: String,

    /// Log every request at info level
    pub verbose: bool,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            address: RegAddress::localhost(),
            name: "registrar".to_string(),
            verbose: false,
        }
    }
}

impl RegistrarConfig {
    pub fn new(address: RegAddress) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Lifecycle of a [`RegistrarService`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Bound,
    Serving,
    Stopped,
}

/// The registrar request loop
pub struct RegistrarService {
    config: RegistrarConfig,
    socket: RepSocket,
    publishers: Arc<RegistrationDatabase>,
    subscribers: Arc<RegistrationDatabase>,
    cancel: CancellationToken,
    state: ServiceState,
}

impl RegistrarService {
    /// Bind the registrar port.
    ///
    /// Fails fast with `Error::AddressInUse` if another registrar owns it.
    pub async fn bind(factory: &SocketFactory, config: RegistrarConfig) -> Result<Self> {
        let socket = factory.new_rep(config.address.endpoint()).await?;
        tracing::info!(address = %config.address, "Registrar bound");

        Ok(Self {
            config,
            socket,
            publishers: Arc::new(RegistrationDatabase::new()),
            subscribers: Arc::new(RegistrationDatabase::new()),
            cancel: factory.child_token(),
            state: ServiceState::Bound,
        })
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }

    /// Publisher registrations
    pub fn publishers(&self) -> &Arc<RegistrationDatabase> {
        &self.publishers
    }

    /// Subscriber registrations
    pub fn subscribers(&self) -> &Arc<RegistrationDatabase> {
        &self.subscribers
    }

    /// Serve until the context shuts down or [`RegistrarHandle::stop`]
    pub async fn run(mut self) -> Result<()> {
        self.state = ServiceState::Serving;
        tracing::info!(address = %self.config.address, "Registrar serving");

        loop {
            let request = tokio::select! {
                _ = self.cancel.cancelled() => break,
                request = self.socket.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.handle(request).await;
        }

        self.state = ServiceState::Stopped;
        self.socket.close().await;
        tracing::info!(address = %self.config.address, "Registrar stopped");
        Ok(())
    }

    /// Serve until `shutdown` completes
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let cancel = self.cancel.clone();
        let serve = self.run();
        tokio::pin!(serve);

        tokio::select! {
            result = &mut serve => return result,
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                cancel.cancel();
            }
        }
        serve.await
    }

    /// Serve in a background task
    pub fn spawn(self) -> RegistrarHandle {
        let local_addr = self.local_addr();
        let publishers = Arc::clone(&self.publishers);
        let subscribers = Arc::clone(&self.subscribers);
        let cancel = self.cancel.clone();

        RegistrarHandle {
            local_addr,
            publishers,
            subscribers,
            cancel,
            task: Some(tokio::spawn(self.run())),
        }
    }

    async fn handle(&self, raw: RawRequest) {
        let frames = raw.frames().to_vec();
        let opcode = frames
            .first()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .unwrap_or_default();

        let response = match Request::from_frames(frames) {
            Ok((sender, request)) => {
                if self.config.verbose {
                    tracing::info!(
                        opcode = %opcode,
                        sender = %sender,
                        peer = %raw.peer(),
                        "Registrar request"
                    );
                } else {
                    tracing::debug!(opcode = %opcode, sender = %sender, "Registrar request");
                }
                self.apply(request).await
            }
            Err(e) => {
                tracing::warn!(
                    peer = %raw.peer(),
                    opcode = %opcode,
                    error = %e,
                    "Malformed registrar request"
                );
                Response::Error(e.to_string())
            }
        };

        if !raw.reply(response.to_frames(&opcode, &self.config.name)) {
            tracing::debug!("Requester went away before the reply");
        }
    }

    fn database(&self, owner: OwnerType) -> &RegistrationDatabase {
        match owner {
            OwnerType::Publisher => self.publishers.as_ref(),
            OwnerType::Subscriber => self.subscribers.as_ref(),
        }
    }

    async fn apply(&self, request: Request) -> Response {
        let records: Vec<RegistrationRecord> = match request {
            Request::Register(record) => {
                self.database(record.owner()).register(record).await;
                Vec::new()
            }
            Request::Remove(record) => {
                self.database(record.owner()).remove(&record).await;
                Vec::new()
            }
            Request::RemoveHost(host) => {
                let removed = self.publishers.remove_host(&host).await
                    + self.subscribers.remove_host(&host).await;
                tracing::info!(host = %host, removed = removed, "Removed host registrations");
                Vec::new()
            }
            Request::Query(query) => {
                let db = self.database(query.owner());
                let found = match (query.owner(), query.kind()) {
                    (OwnerType::Publisher, QueryKind::Matching(topic)) => db.find(topic).await,
                    (OwnerType::Subscriber, QueryKind::Matching(topic)) => db.rfind(topic).await,
                    (_, QueryKind::Same(topic)) => db.same(topic).await,
                    (_, QueryKind::Filter(filter)) => db.filter(filter).await,
                    (_, QueryKind::All) => db.all().await,
                };
                found.into_iter().collect()
            }
        };
        Response::Records(records)
    }
}

/// Handle to a registrar running in the background
#[derive(Debug)]
pub struct RegistrarHandle {
    local_addr: SocketAddr,
    publishers: Arc<RegistrationDatabase>,
    subscribers: Arc<RegistrationDatabase>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl RegistrarHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn publishers(&self) -> &Arc<RegistrationDatabase> {
        &self.publishers
    }

    pub fn subscribers(&self) -> &Arc<RegistrationDatabase> {
        &self.subscribers
    }

    /// Stop the service and wait for the loop to exit
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Err(e)) => tracing::warn!(error = %e, "Registrar exited with error"),
                Err(e) => tracing::warn!(error = %e, "Registrar task failed"),
                Ok(Ok(())) => {}
            }
        }
    }
}

impl Drop for RegistrarHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::Error;
    use crate::topic::Topic;
    use crate::transport::Context;

    fn config(port: u16) -> RegistrarConfig {
        RegistrarConfig::new(RegAddress::new("127.0.0.1", port).unwrap())
    }

    #[tokio::test]
    async fn test_bind_in_use_fails_fast() {
        let factory = SocketFactory::new(Context::new());
        let first = RegistrarService::bind(&factory, config(18811)).await.unwrap();
        assert_eq!(first.state(), ServiceState::Bound);

        let second = RegistrarService::bind(&factory, config(18811)).await;
        assert!(matches!(second, Err(Error::AddressInUse(_))));
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_reply() {
        let factory = SocketFactory::new(Context::new());
        let service = RegistrarService::bind(&factory, config(18812)).await.unwrap();
        let handle = service.spawn();

        let mut req = factory.new_req(handle.local_addr()).unwrap();
        let timeout = std::time::Duration::from_secs(2);

        let bad = vec![Bytes::from_static(b"explode"), Bytes::from_static(b"t"), Bytes::new()];
        let reply = req.request(bad, timeout).await.unwrap();
        assert!(matches!(Response::from_frames(reply), Ok(Response::Error(_))));

        // Still serving
        let record = RegistrationRecord::new(
            "a",
            OwnerType::Publisher,
            "127.0.0.1",
            7771,
            Topic::wrap("d:s").unwrap(),
            "",
        )
        .unwrap();
        let reply = req
            .request(Request::Register(record).to_frames("t"), timeout)
            .await
            .unwrap();
        assert_eq!(Response::from_frames(reply), Ok(Response::Records(vec![])));
        assert_eq!(handle.publishers().len().await, 1);

        handle.stop().await;
    }
}
