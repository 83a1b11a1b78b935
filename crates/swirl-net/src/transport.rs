//! Request/response transport abstraction
//!
//! A transport delivers outbound requests to a peer address and hands
//! inbound requests to the node through a consumer channel. Each inbound
//! request carries a one-shot responder.

use crate::framing::PacketError;
use crate::messages::*;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Capacity of the inbound request channel
pub const CONSUMER_CAPACITY: usize = 64;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),
    #[error("Request to {0} timed out")]
    Timeout(String),
    #[error("Peer unreachable: {0}")]
    Unreachable(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Unexpected response to {0}")]
    UnexpectedResponse(&'static str),
    #[error("Transport is shut down")]
    Shutdown,
}

/// Inbound request awaiting a response
#[derive(Debug)]
pub struct Rpc {
    pub command: Command,
    resp_tx: oneshot::Sender<Result<CommandResponse, String>>,
}

impl Rpc {
    pub fn new(command: Command) -> (Self, oneshot::Receiver<Result<CommandResponse, String>>) {
        let (resp_tx, resp_rx) = oneshot::channel();
        (Self { command, resp_tx }, resp_rx)
    }

    /// Answer the request. The requester may already have given up, in which
    /// case the response is dropped.
    pub fn respond(self, response: Result<CommandResponse, String>) {
        let _ = self.resp_tx.send(response);
    }

    /// Separate the command from its responder so handlers can consume it
    pub fn into_parts(self) -> (Command, Responder) {
        (self.command, Responder(self.resp_tx))
    }
}

/// Response half of an [`Rpc`]
#[derive(Debug)]
pub struct Responder(oneshot::Sender<Result<CommandResponse, String>>);

impl Responder {
    pub fn respond(self, response: Result<CommandResponse, String>) {
        let _ = self.0.send(response);
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Address other peers use to reach this transport
    fn local_addr(&self) -> String;

    /// Take the inbound request stream. Returns `None` after the first call.
    fn consumer(&self) -> Option<mpsc::Receiver<Rpc>>;

    /// Send one request and wait for its response
    async fn request(&self, target: &str, command: Command)
        -> Result<CommandResponse, TransportError>;

    /// Stop accepting requests and release resources
    async fn close(&self);

    async fn sync(&self, target: &str, req: SyncRequest) -> Result<SyncResponse, TransportError> {
        match self.request(target, Command::Sync(req)).await? {
            CommandResponse::Sync(resp) => Ok(resp),
            _ => Err(TransportError::UnexpectedResponse("sync")),
        }
    }

    async fn eager_sync(
        &self,
        target: &str,
        req: EagerSyncRequest,
    ) -> Result<EagerSyncResponse, TransportError> {
        match self.request(target, Command::EagerSync(req)).await? {
            CommandResponse::EagerSync(resp) => Ok(resp),
            _ => Err(TransportError::UnexpectedResponse("eager_sync")),
        }
    }

    async fn fast_forward(
        &self,
        target: &str,
        req: FastForwardRequest,
    ) -> Result<FastForwardResponse, TransportError> {
        match self.request(target, Command::FastForward(req)).await? {
            CommandResponse::FastForward(resp) => Ok(*resp),
            _ => Err(TransportError::UnexpectedResponse("fast_forward")),
        }
    }

    async fn join(&self, target: &str, req: JoinRequest) -> Result<JoinResponse, TransportError> {
        match self.request(target, Command::Join(req)).await? {
            CommandResponse::Join(resp) => Ok(resp),
            _ => Err(TransportError::UnexpectedResponse("join")),
        }
    }
}
