//! Handshake controller
//!
//! Listens to the relay like any other subscriber, on the control topic.
//! A control request that reaches it has travelled the full publish path,
//! so it can answer:
//!
//! - connect / reply: a routed message to the requesting dealer
//! - subscribe: an echo published back through the relay

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::address::ProxyAddress;
use crate::error::Result;
use crate::transport::{PubSocket, RouterSocket, SocketFactory, SubSocket};

use super::control::{routed_reply, subscribe_echo, ControlFrame, ControlType, CTRL_TOPIC};

pub(crate) struct Controller {
    sub: SubSocket,
    publisher: PubSocket,
    router: RouterSocket,
    verbose: bool,
}

impl Controller {
    /// Bind the control port and connect to the relay.
    ///
    /// Sockets created before a failure are dropped, which closes them.
    pub(crate) async fn bind(
        factory: &SocketFactory,
        address: &ProxyAddress,
        verbose: bool,
    ) -> Result<Self> {
        let router = factory.new_router(address.control_endpoint()).await?;
        let sub = factory.new_sub(address.sub_endpoint())?;
        sub.subscribe(CTRL_TOPIC)?;
        let publisher = factory.new_pub(address.pub_endpoint())?;

        Ok(Self {
            sub,
            publisher,
            router,
            verbose,
        })
    }

    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        loop {
            let frames = tokio::select! {
                _ = cancel.cancelled() => break,
                frames = self.sub.recv() => match frames {
                    Some(frames) => frames,
                    None => break,
                },
            };

            let request = match ControlFrame::from_frames(&frames) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring malformed control frame");
                    continue;
                }
            };

            if self.verbose {
                tracing::info!(kind = %request.kind, id = %request.id, "Control request");
            }

            match request.kind {
                ControlType::Connect | ControlType::Reply => {
                    let sent = self
                        .router
                        .send(request.id.as_bytes(), routed_reply(request.kind, &request.id));
                    if !sent {
                        // The dealer retries until its router link is up
                        tracing::trace!(id = %request.id, "Control peer not connected yet");
                    }
                }
                ControlType::Subscribe => {
                    if let Err(e) = self.publisher.send(subscribe_echo(&request.id)) {
                        tracing::warn!(topic = %request.id, error = %e, "Subscribe echo failed");
                    }
                }
            }
        }

        self.sub.close(Duration::ZERO).await;
        self.publisher.close(Duration::ZERO).await;
        self.router.close().await;
        tracing::debug!("Controller stopped");
    }
}
