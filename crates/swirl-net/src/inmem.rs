//! In-process transport
//!
//! Transports registered on the same [`InmemNetwork`] reach each other by
//! address without touching sockets. Used by tests and single-process
//! clusters.

use crate::messages::{Command, CommandResponse};
use crate::transport::{Rpc, Transport, TransportError, CONSUMER_CAPACITY};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Address registry shared by in-memory transports
#[derive(Default)]
pub struct InmemNetwork {
    routes: RwLock<HashMap<String, mpsc::Sender<Rpc>>>,
}

impl InmemNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn route(&self, addr: &str) -> Option<mpsc::Sender<Rpc>> {
        self.routes.read().get(addr).cloned()
    }

    /// Cut `addr` off the network; requests to it fail as unreachable
    pub fn disconnect(&self, addr: &str) {
        self.routes.write().remove(addr);
    }

    pub fn is_connected(&self, addr: &str) -> bool {
        self.routes.read().contains_key(addr)
    }
}

pub struct InmemTransport {
    addr: String,
    network: Arc<InmemNetwork>,
    timeout: Duration,
    join_timeout: Duration,
    consumer: Mutex<Option<mpsc::Receiver<Rpc>>>,
}

impl InmemTransport {
    /// Register a new transport at `addr` on `network`
    pub fn new(network: Arc<InmemNetwork>, addr: impl Into<String>, timeout: Duration) -> Self {
        let addr = addr.into();
        let (tx, rx) = mpsc::channel(CONSUMER_CAPACITY);
        network.routes.write().insert(addr.clone(), tx);
        Self {
            addr,
            network,
            timeout,
            join_timeout: timeout,
            consumer: Mutex::new(Some(rx)),
        }
    }

    /// Join requests wait for consensus and get their own, longer timeout
    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }
}

#[async_trait]
impl Transport for InmemTransport {
    fn local_addr(&self) -> String {
        self.addr.clone()
    }

    fn consumer(&self) -> Option<mpsc::Receiver<Rpc>> {
        self.consumer.lock().take()
    }

    async fn request(
        &self,
        target: &str,
        command: Command,
    ) -> Result<CommandResponse, TransportError> {
        if !self.network.is_connected(&self.addr) {
            return Err(TransportError::Shutdown);
        }
        let route = self
            .network
            .route(target)
            .ok_or_else(|| TransportError::Unreachable(target.to_string()))?;

        debug!(from = %self.addr, to = %target, cmd = command.name(), "inmem request");
        let timeout = match command {
            Command::Join(_) => self.join_timeout,
            _ => self.timeout,
        };
        let (rpc, resp_rx) = Rpc::new(command);

        let exchange = async {
            route
                .send(rpc)
                .await
                .map_err(|_| TransportError::Unreachable(target.to_string()))?;
            resp_rx.await.map_err(|_| TransportError::ConnectionClosed)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(Ok(resp))) => Ok(resp),
            Ok(Ok(Err(message))) => Err(TransportError::Remote(message)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Timeout(target.to_string())),
        }
    }

    async fn close(&self) {
        self.network.disconnect(&self.addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::*;
    use std::collections::BTreeMap;
    use swirl_core::PeerId;

    fn echo(transport: &InmemTransport) {
        let mut rx = transport.consumer().unwrap();
        tokio::spawn(async move {
            while let Some(rpc) = rx.recv().await {
                let resp = match &rpc.command {
                    Command::Sync(req) => Ok(CommandResponse::Sync(SyncResponse {
                        from_id: PeerId(2),
                        sync_limit: false,
                        events: vec![],
                        known: req.known.clone(),
                    })),
                    _ => Err("unsupported".to_string()),
                };
                rpc.respond(resp);
            }
        });
    }

    #[tokio::test]
    async fn test_request_response() {
        let net = InmemNetwork::new();
        let a = InmemTransport::new(net.clone(), "a", Duration::from_secs(1));
        let b = InmemTransport::new(net.clone(), "b", Duration::from_secs(1));
        echo(&b);

        let mut known = BTreeMap::new();
        known.insert(PeerId(1), 4);
        let resp = a
            .sync("b", SyncRequest { from_id: PeerId(1), known: known.clone() })
            .await
            .unwrap();
        assert_eq!(resp.from_id, PeerId(2));
        assert_eq!(resp.known, known);

        let err = a
            .fast_forward("b", FastForwardRequest { from_id: PeerId(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Remote(_)));
    }

    #[tokio::test]
    async fn test_consumer_taken_once() {
        let net = InmemNetwork::new();
        let a = InmemTransport::new(net, "a", Duration::from_secs(1));
        assert!(a.consumer().is_some());
        assert!(a.consumer().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_and_closed() {
        let net = InmemNetwork::new();
        let a = InmemTransport::new(net.clone(), "a", Duration::from_secs(1));
        let b = InmemTransport::new(net.clone(), "b", Duration::from_secs(1));
        echo(&b);

        let req = SyncRequest { from_id: PeerId(1), known: BTreeMap::new() };
        assert!(matches!(
            a.sync("nowhere", req.clone()).await,
            Err(TransportError::Unreachable(_))
        ));

        b.close().await;
        assert!(matches!(
            a.sync("b", req.clone()).await,
            Err(TransportError::Unreachable(_))
        ));

        a.close().await;
        assert!(matches!(a.sync("b", req).await, Err(TransportError::Shutdown)));
    }

    #[tokio::test]
    async fn test_timeout_when_nobody_answers() {
        let net = InmemNetwork::new();
        let a = InmemTransport::new(net.clone(), "a", Duration::from_millis(50));
        let b = InmemTransport::new(net.clone(), "b", Duration::from_millis(50));
        // Hold the consumer without ever responding
        let _rx = b.consumer().unwrap();

        let req = SyncRequest { from_id: PeerId(1), known: BTreeMap::new() };
        assert!(matches!(
            a.sync("b", req).await,
            Err(TransportError::Timeout(_))
        ));
    }
}
