//! State machine for the session coordinator
//!
//! This module implements the coordinator state using a single-writer
//! pattern. All state transitions go through the `reduce()` function, which
//! returns a new state and a list of effects to execute. The session loop
//! processes one event to completion at a time, so a transition never needs
//! locking.
//!
//! Two independent cycles are tracked: the capture cycle
//! (idle → arming → recording → transcribing → idle) and the query cycle
//! (idle → awaiting-reply → idle). The conversation log, the chat-input
//! text, the latest video frame and the connection status ride along in the
//! same state so every published view is one coherent snapshot.

use uuid::Uuid;

use crate::capture::CaptureFormat;
use crate::connection::{frame_data_uri, ConnectionStatus};
use crate::conversation::{ConversationLog, Role};

/// Presentation-facing name for the capture cycle position.
///
/// `Arming` is the suspension point between idle and recording: the device
/// is being acquired and the outcome is not in yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    Idle,
    Arming,
    Recording,
    Transcribing,
}

/// Internal state of one capture cycle.
///
/// Each recording attempt gets a fresh id; device events carrying a stale id
/// are dropped by the reducer.
#[derive(Debug, Clone)]
pub enum CaptureState {
    Idle,
    Arming {
        capture_id: Uuid,
    },
    Recording {
        capture_id: Uuid,
        /// Chat-input text snapshotted when recording started, so the
        /// transcription result extends it instead of overwriting it.
        pending_text: String,
        format: CaptureFormat,
        samples: Vec<i16>,
    },
    Transcribing {
        capture_id: Uuid,
        pending_text: String,
    },
}

impl CaptureState {
    pub fn phase(&self) -> CapturePhase {
        match self {
            CaptureState::Idle => CapturePhase::Idle,
            CaptureState::Arming { .. } => CapturePhase::Arming,
            CaptureState::Recording { .. } => CapturePhase::Recording,
            CaptureState::Transcribing { .. } => CapturePhase::Transcribing,
        }
    }
}

/// Position in the query cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    AwaitingReply,
}

/// The authoritative coordinator state. All transitions go through the
/// reducer.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub log: ConversationLog,
    pub query: QueryState,
    pub capture: CaptureState,
    pub input_text: String,
    /// Most recent video frame as an image-data URI; overwritten in place,
    /// never queued.
    pub video_frame: Option<String>,
    pub connection: ConnectionStatus,
    /// Most recent surfaced failure, for user-visible display.
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn new(greeting: &str) -> Self {
        Self {
            log: ConversationLog::with_greeting(greeting),
            query: QueryState::Idle,
            capture: CaptureState::Idle,
            input_text: String::new(),
            video_frame: None,
            connection: ConnectionStatus::Connecting,
            last_error: None,
        }
    }

    /// Chat submission is disabled while a reply is outstanding and while
    /// audio is being captured or transcribed.
    pub fn submit_enabled(&self) -> bool {
        self.query == QueryState::Idle
            && matches!(
                self.capture,
                CaptureState::Idle | CaptureState::Arming { .. }
            )
    }

    /// The input control is disabled while transcribing (its text belongs to
    /// the pending transcription) and while a reply is outstanding.
    pub fn input_enabled(&self) -> bool {
        self.query == QueryState::Idle
            && !matches!(self.capture, CaptureState::Transcribing { .. })
    }

    /// Recording can start from idle and stop from recording; both require
    /// no outstanding reply.
    pub fn toggle_enabled(&self) -> bool {
        self.query == QueryState::Idle
            && matches!(
                self.capture,
                CaptureState::Idle | CaptureState::Recording { .. }
            )
    }
}

/// Events that can trigger state transitions.
///
/// These are sent from the presentation layer, the connection dispatcher,
/// and the capture device bridge.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    // Presentation layer
    /// User submitted the chat input.
    Submit { text: String },
    /// User edited the chat input.
    SetInput { text: String },
    /// User pressed the microphone control (toggle start/stop).
    ToggleRecording,
    /// Session teardown requested; handled at the loop edge.
    Shutdown,

    // Connection lifecycle
    ConnectionOpened,
    ConnectionClosed { reason: Option<String> },

    // Capture device
    CaptureStarted { id: Uuid, format: CaptureFormat },
    CaptureUnavailable { id: Uuid, reason: String },
    CaptureChunk { id: Uuid, samples: Vec<i16> },
    CaptureFailed { id: Uuid, reason: String },

    // Remote replies, one per inbound channel
    ChatReply { text: String },
    FrameUpdate { data: String },
    TranscriptionDone { text: String },
    TranscriptionFailed { reason: String },
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug, Clone)]
pub enum Effect {
    AcquireCapture { id: Uuid },
    ReleaseCapture { id: Uuid },
    SendChat { text: String },
    SendTranscribe { samples: Vec<i16>, format: CaptureFormat },
    /// Publish a fresh view snapshot; handled at the loop edge.
    PublishView,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate shared state outside the returned value
/// - Drop capture events with stale ids
/// - Emit `PublishView` whenever something the presentation layer reads
///   changed
pub fn reduce(state: &SessionState, event: SessionEvent) -> (SessionState, Vec<Effect>) {
    use Effect::*;

    let mut next = state.clone();

    match event {
        SessionEvent::SetInput { text } => {
            if !next.input_enabled() {
                log::debug!("Input edit ignored: control disabled");
                return (next, vec![]);
            }
            next.input_text = text;
            (next, vec![PublishView])
        }

        SessionEvent::Submit { text } => {
            if !next.submit_enabled() {
                log::debug!("Submit ignored: control disabled");
                return (next, vec![]);
            }
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return (next, vec![]);
            }
            let trimmed = trimmed.to_string();
            next.log.append(Role::User, trimmed.clone());
            next.query = QueryState::AwaitingReply;
            next.input_text.clear();
            (next, vec![SendChat { text: trimmed }, PublishView])
        }

        SessionEvent::ChatReply { text } => {
            // Accepted regardless of query state: a late or duplicate reply
            // appends a turn instead of corrupting the log.
            if next.query != QueryState::AwaitingReply {
                log::warn!("Chat reply arrived with no outstanding request");
            }
            next.log.append(Role::Assistant, text);
            next.query = QueryState::Idle;
            (next, vec![PublishView])
        }

        SessionEvent::ToggleRecording => match next.capture.phase() {
            CapturePhase::Idle => {
                if next.query != QueryState::Idle {
                    log::debug!("Recording ignored: reply outstanding");
                    return (next, vec![]);
                }
                let id = Uuid::new_v4();
                next.capture = CaptureState::Arming { capture_id: id };
                (next, vec![AcquireCapture { id }, PublishView])
            }
            CapturePhase::Arming => {
                log::debug!("Toggle ignored: device acquisition in flight");
                (next, vec![])
            }
            CapturePhase::Recording => stop_recording(next),
            CapturePhase::Transcribing => {
                log::debug!("Toggle ignored: transcription in flight");
                (next, vec![])
            }
        },

        SessionEvent::CaptureStarted { id, format } => {
            let armed =
                matches!(next.capture, CaptureState::Arming { capture_id } if capture_id == id);
            if armed {
                let pending_text = next.input_text.clone();
                next.capture = CaptureState::Recording {
                    capture_id: id,
                    pending_text,
                    format,
                    samples: Vec::new(),
                };
                (next, vec![PublishView])
            } else {
                // A stale acquisition still holds the device; make sure it
                // gets released.
                log::warn!("Stale capture acquisition {}; releasing", id);
                (next, vec![ReleaseCapture { id }])
            }
        }

        SessionEvent::CaptureUnavailable { id, reason } => {
            let armed =
                matches!(next.capture, CaptureState::Arming { capture_id } if capture_id == id);
            if armed {
                log::error!("Capture device unavailable: {}", reason);
                next.capture = CaptureState::Idle;
                next.last_error = Some(reason);
                (next, vec![PublishView])
            } else {
                (next, vec![])
            }
        }

        SessionEvent::CaptureChunk { id, samples } => {
            if let CaptureState::Recording {
                capture_id,
                samples: buffer,
                ..
            } = &mut next.capture
            {
                if *capture_id == id {
                    buffer.extend_from_slice(&samples);
                }
            }
            // The buffer is not part of the view; nothing to publish.
            (next, vec![])
        }

        SessionEvent::CaptureFailed { id, reason } => {
            let active = matches!(
                &next.capture,
                CaptureState::Recording { capture_id, .. } if *capture_id == id
            );
            if active {
                // A device error while recording takes the normal stop path:
                // whatever was captured is finalized and transmitted.
                log::error!("Capture device failed mid-recording: {}", reason);
                next.last_error = Some(reason);
                stop_recording(next)
            } else {
                (next, vec![])
            }
        }

        SessionEvent::TranscriptionDone { text } => {
            if let CaptureState::Transcribing { pending_text, .. } = next.capture.clone() {
                next.input_text = merge_transcription(&pending_text, &text);
                next.capture = CaptureState::Idle;
                (next, vec![PublishView])
            } else {
                log::debug!("Dropping transcription result: no transcription in flight");
                (next, vec![])
            }
        }

        SessionEvent::TranscriptionFailed { reason } => {
            if matches!(next.capture, CaptureState::Transcribing { .. }) {
                log::error!("Transcription failed: {}", reason);
                // Input was cleared on stop and stays that way; no retry.
                next.capture = CaptureState::Idle;
                next.last_error = Some(reason);
                (next, vec![PublishView])
            } else {
                (next, vec![])
            }
        }

        SessionEvent::FrameUpdate { data } => {
            // Only the latest frame is retained; older frames are discarded
            // by overwrite.
            next.video_frame = Some(frame_data_uri(&data));
            (next, vec![PublishView])
        }

        SessionEvent::ConnectionOpened => {
            next.connection = ConnectionStatus::Open;
            (next, vec![PublishView])
        }

        SessionEvent::ConnectionClosed { reason } => {
            next.connection = ConnectionStatus::Closed;
            if let Some(reason) = reason {
                log::warn!("Connection lost: {}", reason);
                next.last_error = Some(reason);
            }
            (next, vec![PublishView])
        }

        // Handled at the loop edge; no transition here.
        SessionEvent::Shutdown => (next, vec![]),
    }
}

/// Shared exit from recording, for user stop and device error alike:
/// release the device, finalize and transmit the buffer, clear the input.
fn stop_recording(mut next: SessionState) -> (SessionState, Vec<Effect>) {
    let CaptureState::Recording {
        capture_id,
        pending_text,
        format,
        samples,
    } = std::mem::replace(&mut next.capture, CaptureState::Idle)
    else {
        return (next, vec![]);
    };

    next.capture = CaptureState::Transcribing {
        capture_id,
        pending_text,
    };
    next.input_text.clear();

    (
        next,
        vec![
            Effect::ReleaseCapture { id: capture_id },
            Effect::SendTranscribe { samples, format },
            Effect::PublishView,
        ],
    )
}

/// Merge rule for a transcription result: pending text and result joined by
/// a single space, collapsing to the result alone when pending is empty.
fn merge_transcription(pending: &str, transcription: &str) -> String {
    format!("{} {}", pending.trim(), transcription.trim())
        .trim()
        .to_string()
}
