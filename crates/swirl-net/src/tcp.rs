//! TCP transport
//!
//! One connection per request: the client writes a request packet, the
//! server answers with exactly one response or error packet.

use crate::framing::{Packet, PacketCodec};
use crate::messages::{error_packet, Command, CommandResponse};
use crate::transport::{Rpc, Transport, TransportError, CONSUMER_CAPACITY};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

pub struct TcpTransport {
    local_addr: SocketAddr,
    timeout: Duration,
    join_timeout: Duration,
    consumer: Mutex<Option<mpsc::Receiver<Rpc>>>,
    shutdown_tx: broadcast::Sender<()>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Bind `listen` and start accepting requests
    pub async fn bind(listen: &str, timeout: Duration) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(listen).await?;
        let local_addr = listener.local_addr()?;
        info!("Transport listening on {}", local_addr);

        let (rpc_tx, rpc_rx) = mpsc::channel(CONSUMER_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);
        let accept_handle = tokio::spawn(accept_loop(
            listener,
            rpc_tx,
            shutdown_tx.subscribe(),
            timeout,
        ));

        Ok(Self {
            local_addr,
            timeout,
            join_timeout: timeout,
            consumer: Mutex::new(Some(rpc_rx)),
            shutdown_tx,
            accept_handle: Mutex::new(Some(accept_handle)),
        })
    }

    /// Join requests wait for consensus and get their own, longer timeout
    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    async fn exchange(&self, target: &str, packet: Packet) -> Result<Packet, TransportError> {
        let stream = TcpStream::connect(target)
            .await
            .map_err(|_| TransportError::Unreachable(target.to_string()))?;
        let mut framed = Framed::new(stream, PacketCodec::new());
        framed.send(packet).await?;
        match framed.next().await {
            Some(packet) => Ok(packet?),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    rpc_tx: mpsc::Sender<Rpc>,
    mut shutdown_rx: broadcast::Receiver<()>,
    timeout: Duration,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!("Accepted connection from {}", addr);
                        let rpc_tx = rpc_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, rpc_tx, timeout).await {
                                warn!("Connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("Accept loop stopped");
                break;
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    rpc_tx: mpsc::Sender<Rpc>,
    timeout: Duration,
) -> Result<(), TransportError> {
    let mut framed = Framed::new(stream, PacketCodec::new());
    let packet = match framed.next().await {
        Some(packet) => packet?,
        None => return Ok(()),
    };

    let reply = match Command::from_packet(&packet)? {
        Some(command) => {
            // The node bounds its own wait on joins
            let is_join = matches!(command, Command::Join(_));
            let (rpc, resp_rx) = Rpc::new(command);
            rpc_tx.send(rpc).await.map_err(|_| TransportError::Shutdown)?;
            let resp = if is_join {
                Ok(resp_rx.await)
            } else {
                tokio::time::timeout(timeout, resp_rx).await
            };
            match resp {
                Ok(Ok(Ok(resp))) => resp.to_packet()?,
                Ok(Ok(Err(message))) => error_packet(&message)?,
                Ok(Err(_)) => error_packet("request dropped")?,
                Err(_) => error_packet("request timed out")?,
            }
        }
        None => error_packet("expected a request packet")?,
    };

    framed.send(reply).await?;
    Ok(())
}

#[async_trait]
impl Transport for TcpTransport {
    fn local_addr(&self) -> String {
        self.local_addr.to_string()
    }

    fn consumer(&self) -> Option<mpsc::Receiver<Rpc>> {
        self.consumer.lock().take()
    }

    async fn request(
        &self,
        target: &str,
        command: Command,
    ) -> Result<CommandResponse, TransportError> {
        if self.accept_handle.lock().is_none() {
            return Err(TransportError::Shutdown);
        }
        debug!(to = %target, cmd = command.name(), "tcp request");
        let timeout = match command {
            Command::Join(_) => self.join_timeout,
            _ => self.timeout,
        };
        let packet = command.to_packet()?;

        let reply = tokio::time::timeout(timeout, self.exchange(target, packet))
            .await
            .map_err(|_| TransportError::Timeout(target.to_string()))??;

        CommandResponse::from_packet(&reply)?.map_err(TransportError::Remote)
    }

    async fn close(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.accept_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::*;
    use std::collections::BTreeMap;
    use swirl_core::PeerId;

    #[tokio::test]
    async fn test_tcp_request_response() {
        let server = TcpTransport::bind("127.0.0.1:0", Duration::from_secs(2))
            .await
            .unwrap();
        let client = TcpTransport::bind("127.0.0.1:0", Duration::from_secs(2))
            .await
            .unwrap();

        let mut rx = server.consumer().unwrap();
        tokio::spawn(async move {
            while let Some(rpc) = rx.recv().await {
                let resp = match &rpc.command {
                    Command::EagerSync(req) => Ok(CommandResponse::EagerSync(EagerSyncResponse {
                        from_id: PeerId(9),
                        success: req.events.is_empty(),
                    })),
                    _ => Err("not here".to_string()),
                };
                rpc.respond(resp);
            }
        });

        let target = server.local_addr();
        let resp = client
            .eager_sync(&target, EagerSyncRequest { from_id: PeerId(1), events: vec![] })
            .await
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.from_id, PeerId(9));

        let err = client
            .sync(&target, SyncRequest { from_id: PeerId(1), known: BTreeMap::new() })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Remote(m) if m == "not here"));

        server.close().await;
        client.close().await;
        assert!(matches!(
            client
                .sync(&target, SyncRequest { from_id: PeerId(1), known: BTreeMap::new() })
                .await,
            Err(TransportError::Shutdown)
        ));
    }
}
