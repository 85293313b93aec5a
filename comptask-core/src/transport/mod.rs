//! Message transport seam between the process core and the bus.

pub mod codec;
pub mod mqtt;

use crate::message::{EndpointId, Message};
use codec::CodecError;
use std::time::Duration;
use thiserror::Error;

pub use mqtt::MqttTransport;

/// A received message together with the endpoint that handed it over.
/// The deliverer differs from `message.source` when a relay forwarded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub deliverer: EndpointId,
    pub message: Message,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no message within the receive timeout")]
    Timeout,
    #[error("out of buffer space")]
    NoMemory,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("transport closed")]
    Closed,
    #[error("no route to endpoint {0}")]
    UnknownEndpoint(EndpointId),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl TransportError {
    /// Errors after which the process cannot keep talking to the bus.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoMemory | Self::SendFailed(_) | Self::Closed)
    }
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Sends `message` to `dest`, which is the relay when the message
    /// cannot be delivered directly to `message.dest`.
    async fn send(&mut self, dest: EndpointId, message: &Message) -> Result<(), TransportError>;

    async fn receive(&mut self, timeout: Duration) -> Result<Delivery, TransportError>;

    /// Flushes outstanding sends and releases the connection.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!TransportError::Timeout.is_fatal());
        assert!(TransportError::NoMemory.is_fatal());
        assert!(TransportError::SendFailed("broker gone".into()).is_fatal());
        assert!(!TransportError::UnknownEndpoint(EndpointId(3)).is_fatal());
    }
}
