//! Connection layer: socket management, wire protocol, and channel routing
//!
//! One persistent WebSocket carries three logical channels (chat,
//! transcription, video-frame). The [`Connection`] owns the socket lifecycle,
//! [`protocol`] defines the tagged event unions decoded at the boundary, and
//! the [`ChannelRouter`] fans decoded inbound events out to one handler per
//! channel while preserving per-channel order.

mod protocol;
mod router;
mod socket;

pub use protocol::{frame_data_uri, Channel, ClientEvent, ServerEvent};
pub use router::{ChannelRouter, InboundHandler};
pub use socket::{Connection, ConnectionStatus};

/// Errors that can occur while establishing the connection.
///
/// Connection loss after establishment is not an error value; it surfaces as
/// a `closed` status and an ended inbound stream.
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// The WebSocket handshake failed.
    OpenFailed(String),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::OpenFailed(e) => {
                write!(f, "Failed to connect to assistant service: {}", e)
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_display() {
        let err = ConnectionError::OpenFailed("refused".to_string());
        assert!(err.to_string().contains("refused"));
    }
}
