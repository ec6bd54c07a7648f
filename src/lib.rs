//! Session coordinator for the Check-in Charlie realtime assistant client
//!
//! One persistent WebSocket connection carries three logical channels:
//! chat, transcription, and a still-frame video feed. This crate owns the
//! connection lifecycle, multiplexes the channels, drives the capture and
//! query state machines, and maintains the append-only conversation log that
//! the presentation layer renders.
//!
//! ```no_run
//! use std::sync::Arc;
//! use charlie_client::{Microphone, Session, SessionConfig};
//!
//! # async fn demo() {
//! let session = Session::init(SessionConfig::from_env(), Arc::new(Microphone::new()));
//! let handle = session.handle();
//! let mut view = session.view();
//!
//! handle.submit("hi").await.ok();
//! view.changed().await.ok();
//! for turn in &view.borrow().turns {
//!     println!("{:?}: {}", turn.role, turn.text);
//! }
//! # session.teardown().await;
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod connection;
pub mod conversation;
pub mod effects;
pub mod session;
pub mod state_machine;

pub use capture::{
    CaptureDevice, CaptureError, CaptureFormat, CaptureHandle, CaptureSignal, Microphone,
};
pub use config::SessionConfig;
pub use connection::{
    Channel, ChannelRouter, ClientEvent, Connection, ConnectionError, ConnectionStatus,
    ServerEvent,
};
pub use conversation::{ConversationLog, Role, Turn};
pub use session::{Session, SessionHandle, SessionView};
pub use state_machine::{CapturePhase, SessionEvent, SessionState};
