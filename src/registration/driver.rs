//! Client side of the registrar protocol

use std::collections::HashSet;
use std::time::Duration;

use crate::address::RegAddress;
use crate::error::{Error, Result};
use crate::transport::{ReqSocket, SocketFactory};

use super::protocol::{Request, Response};
use super::query::RegQuery;
use super::record::RegistrationRecord;

/// Default time to wait for a registrar reply
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Blocking request/response client for one registrar
///
/// The request socket is created on first use. After a timeout it is
/// dropped and recreated, so a late reply can never be read as the answer
/// to the next request.
#[derive(Debug)]
pub struct RegistrarDriver {
    factory: SocketFactory,
    address: RegAddress,
    sender: String,
    timeout: Duration,
    socket: Option<ReqSocket>,
}

impl RegistrarDriver {
    pub fn new(factory: SocketFactory, address: RegAddress, sender: impl Into<String>) -> Self {
        Self {
            factory,
            address,
            sender: sender.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            socket: None,
        }
    }

    /// Set the reply timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> RegAddress {
        self.address
    }

    pub async fn register(&mut self, record: RegistrationRecord) -> Result<()> {
        self.request(Request::Register(record)).await.map(drop)
    }

    pub async fn remove(&mut self, record: RegistrationRecord) -> Result<()> {
        self.request(Request::Remove(record)).await.map(drop)
    }

    /// Remove every publisher and subscriber registered from `host`
    pub async fn remove_host(&mut self, host: &str) -> Result<()> {
        self.request(Request::RemoveHost(host.to_string()))
            .await
            .map(drop)
    }

    pub async fn query(&mut self, query: &RegQuery) -> Result<HashSet<RegistrationRecord>> {
        let records = self.request(Request::Query(query.clone())).await?;
        Ok(records.into_iter().collect())
    }

    async fn request(&mut self, request: Request) -> Result<Vec<RegistrationRecord>> {
        let opcode = request.opcode();
        let frames = request.to_frames(&self.sender);

        let mut socket = match self.socket.take() {
            Some(socket) => socket,
            None => self.factory.new_req(self.address.endpoint())?,
        };

        let reply = match socket.request(frames, self.timeout).await {
            Ok(reply) => {
                self.socket = Some(socket);
                reply
            }
            Err(e) => {
                tracing::debug!(
                    address = %self.address,
                    opcode = opcode,
                    error = %e,
                    "Registrar request failed, dropping socket"
                );
                socket.close(Duration::ZERO).await;
                return Err(e);
            }
        };

        match Response::from_frames(reply)? {
            Response::Records(records) => Ok(records),
            Response::Error(description) => Err(Error::Registrar(description)),
        }
    }

    pub async fn close(mut self) {
        if let Some(socket) = self.socket.take() {
            socket.close(Duration::ZERO).await;
        }
    }
}
