//! The session object: lifecycle, event loop, and the published view
//!
//! A [`Session`] owns everything for one connection lifetime: the event
//! queue, the connection, the channel router, the effect runner, and the
//! session loop. It is constructed explicitly (`init`) and torn down
//! explicitly (`teardown`); nothing lives in ambient global state.
//!
//! # Architecture
//!
//! ```text
//! presentation ──SessionHandle──▶ event queue ──▶ session loop ──▶ reduce()
//!                                      ▲                │
//!      connection ──▶ dispatcher ──────┘                ├─▶ effects (runner)
//!        (inbound)     (router)                         └─▶ SessionView (watch)
//! ```
//!
//! The loop processes one event to completion at a time: the single-threaded,
//! cooperative scheduling model every invariant in the state machine relies
//! on.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::capture::CaptureDevice;
use crate::config::SessionConfig;
use crate::connection::{Channel, ChannelRouter, Connection, ConnectionStatus, ServerEvent};
use crate::conversation::Turn;
use crate::effects::{EffectRunner, SessionEffectRunner};
use crate::state_machine::{reduce, CapturePhase, Effect, QueryState, SessionEvent, SessionState};

/// Snapshot of everything the presentation layer reads.
///
/// Published on every observable change; always one coherent picture of the
/// coordinator state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub turns: Vec<Turn>,
    /// Id of the newest assistant turn, for progressive-reveal treatment.
    pub latest_assistant_id: Option<u64>,
    pub input_text: String,
    pub capture: CapturePhase,
    /// True while an assistant reply is outstanding.
    pub querying: bool,
    pub submit_enabled: bool,
    pub input_enabled: bool,
    pub toggle_enabled: bool,
    /// Most recent video frame as an image-data URI.
    pub video_frame: Option<String>,
    pub connection: ConnectionStatus,
    pub last_error: Option<String>,
}

/// Convert coordinator state to the presentation snapshot.
fn state_to_view(state: &SessionState) -> SessionView {
    SessionView {
        turns: state.log.snapshot(),
        latest_assistant_id: state.log.latest_assistant().map(|t| t.id),
        input_text: state.input_text.clone(),
        capture: state.capture.phase(),
        querying: state.query == QueryState::AwaitingReply,
        submit_enabled: state.submit_enabled(),
        input_enabled: state.input_enabled(),
        toggle_enabled: state.toggle_enabled(),
        video_frame: state.video_frame.clone(),
        connection: state.connection,
        last_error: state.last_error.clone(),
    }
}

/// Cloneable surface the presentation layer drives the session through.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Send an event to the session loop.
    pub async fn send(
        &self,
        event: SessionEvent,
    ) -> Result<(), mpsc::error::SendError<SessionEvent>> {
        self.tx.send(event).await
    }

    /// Submit the chat input as one user turn.
    pub async fn submit(
        &self,
        text: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<SessionEvent>> {
        self.send(SessionEvent::Submit { text: text.into() }).await
    }

    /// Replace the chat-input text.
    pub async fn set_input(
        &self,
        text: impl Into<String>,
    ) -> Result<(), mpsc::error::SendError<SessionEvent>> {
        self.send(SessionEvent::SetInput { text: text.into() }).await
    }

    /// Start recording if idle, stop (and transcribe) if recording.
    pub async fn toggle_recording(&self) -> Result<(), mpsc::error::SendError<SessionEvent>> {
        self.send(SessionEvent::ToggleRecording).await
    }
}

/// One assistant session: connection, channels, capture cycle, and
/// conversation log, from `init` to `teardown`.
pub struct Session {
    handle: SessionHandle,
    view_rx: watch::Receiver<SessionView>,
    connection: Arc<Connection>,
    router: Arc<Mutex<ChannelRouter>>,
    loop_task: tokio::task::JoinHandle<()>,
    dispatch_task: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Build and start a session. Must be called inside a tokio runtime.
    ///
    /// The connection is opened in the background; the session (and its
    /// presentation surface) is usable immediately, with sends silently
    /// dropped until the connection is up.
    pub fn init(config: SessionConfig, device: Arc<dyn CaptureDevice>) -> Self {
        let (tx, rx) = mpsc::channel::<SessionEvent>(config.event_capacity);

        let state = SessionState::new(&config.greeting);
        let (view_tx, view_rx) = watch::channel(state_to_view(&state));

        let connection = Arc::new(Connection::new());
        let router = Arc::new(Mutex::new(ChannelRouter::new()));
        subscribe_channels(&mut router.lock().unwrap(), &tx);

        // Dispatcher: the one task that routes inbound events, so each
        // channel's handler runs serially in arrival order. When the inbound
        // stream ends the connection is gone.
        let dispatch_task = {
            let router = router.clone();
            let inbound = connection.take_events();
            let closed_tx = tx.clone();
            tokio::spawn(async move {
                if let Some(mut inbound) = inbound {
                    while let Some(event) = inbound.recv().await {
                        router.lock().unwrap().dispatch(event);
                    }
                }
                let _ = closed_tx
                    .send(SessionEvent::ConnectionClosed { reason: None })
                    .await;
            })
        };

        // Open the connection without blocking init; the UI stays
        // interactive while the handshake is pending.
        {
            let connection = connection.clone();
            let url = config.server_url.clone();
            let opened_tx = tx.clone();
            tokio::spawn(async move {
                match connection.open(&url).await {
                    Ok(()) => {
                        let _ = opened_tx.send(SessionEvent::ConnectionOpened).await;
                    }
                    Err(e) => {
                        let _ = opened_tx
                            .send(SessionEvent::ConnectionClosed {
                                reason: Some(e.to_string()),
                            })
                            .await;
                    }
                }
            });
        }

        let runner = SessionEffectRunner::new(connection.clone(), device);
        let loop_task = tokio::spawn(run_session_loop(state, rx, tx.clone(), runner, view_tx));

        Self {
            handle: SessionHandle { tx },
            view_rx,
            connection,
            router,
            loop_task,
            dispatch_task,
        }
    }

    /// The presentation-layer surface for this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Subscribe to view snapshots.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view_rx.clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Tear the session down: detach the channel handlers, stop the loop,
    /// and release the connection. The socket is closed unconditionally.
    pub async fn teardown(self) {
        log::info!("Tearing down session");

        // Handlers first, so nothing is invoked while the connection winds
        // down.
        self.router.lock().unwrap().clear();

        let _ = self.handle.send(SessionEvent::Shutdown).await;
        self.connection.close().await;

        self.dispatch_task.abort();
        if self.loop_task.await.is_err() {
            log::warn!("Session loop did not shut down cleanly");
        }
    }
}

/// Register the one inbound handler per channel, each mapping its channel's
/// events into the session queue.
fn subscribe_channels(router: &mut ChannelRouter, tx: &mpsc::Sender<SessionEvent>) {
    let chat_tx = tx.clone();
    router.subscribe(
        Channel::Chat,
        Box::new(move |event| {
            if let ServerEvent::ChatResponse { text } = event {
                forward(&chat_tx, SessionEvent::ChatReply { text });
            }
        }),
    );

    let transcription_tx = tx.clone();
    router.subscribe(
        Channel::Transcription,
        Box::new(move |event| {
            let mapped = match event {
                ServerEvent::TranscriptionResult { transcription } => {
                    Some(SessionEvent::TranscriptionDone {
                        text: transcription,
                    })
                }
                ServerEvent::TranscriptionError { error } => {
                    Some(SessionEvent::TranscriptionFailed { reason: error })
                }
                _ => None,
            };
            if let Some(event) = mapped {
                forward(&transcription_tx, event);
            }
        }),
    );

    let frame_tx = tx.clone();
    router.subscribe(
        Channel::VideoFrame,
        Box::new(move |event| {
            if let ServerEvent::Frame { data } = event {
                forward(&frame_tx, SessionEvent::FrameUpdate { data });
            }
        }),
    );
}

/// Enqueue without blocking the dispatcher. A full queue drops the event;
/// the wire protocol has no backpressure to offer anyway.
fn forward(tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = tx.try_send(event) {
        log::warn!("Event queue full; dropping inbound event: {}", e);
    }
}

/// Run the main session loop.
async fn run_session_loop(
    mut state: SessionState,
    mut rx: mpsc::Receiver<SessionEvent>,
    tx: mpsc::Sender<SessionEvent>,
    effect_runner: Arc<dyn EffectRunner>,
    view_tx: watch::Sender<SessionView>,
) {
    log::info!("Session loop started");

    while let Some(event) = rx.recv().await {
        // Handle Shutdown at the edge
        if matches!(event, SessionEvent::Shutdown) {
            log::info!("Shutdown requested, stopping session loop");
            break;
        }

        log::debug!("Received event: {:?}", event);

        let before = (state.capture.phase(), state.query);
        let (next, effects) = reduce(&state, event);
        state = next;
        let after = (state.capture.phase(), state.query);

        if before != after {
            log::info!(
                "State transition: {:?}/{:?} -> {:?}/{:?}",
                before.0,
                before.1,
                after.0,
                after.1
            );
        }

        // Execute effects
        for effect in effects {
            match effect {
                Effect::PublishView => {
                    view_tx.send_replace(state_to_view(&state));
                }
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    log::info!("Session loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::StubEffectRunner;
    use std::time::Duration;

    /// Wait until the view satisfies a predicate (or time out).
    async fn wait_for<F>(rx: &mut watch::Receiver<SessionView>, mut predicate: F) -> SessionView
    where
        F: FnMut(&SessionView) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let matched = {
                    let view = rx.borrow();
                    if predicate(&view) {
                        Some(view.clone())
                    } else {
                        None
                    }
                };
                if let Some(view) = matched {
                    return view;
                }
                rx.changed().await.expect("view channel closed");
            }
        })
        .await
        .expect("timed out waiting for view condition")
    }

    fn start_loop() -> (
        SessionHandle,
        watch::Receiver<SessionView>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::channel(16);
        let state = SessionState::new("Hi");
        let (view_tx, view_rx) = watch::channel(state_to_view(&state));
        let runner: Arc<dyn EffectRunner> = Arc::new(StubEffectRunner);
        let task = tokio::spawn(run_session_loop(state, rx, tx.clone(), runner, view_tx));
        (SessionHandle { tx }, view_rx, task)
    }

    #[test]
    fn view_reflects_state() {
        let state = SessionState::new("Hi");
        let view = state_to_view(&state);

        assert_eq!(view.turns.len(), 1);
        assert_eq!(view.latest_assistant_id, Some(1));
        assert_eq!(view.capture, CapturePhase::Idle);
        assert!(!view.querying);
        assert!(view.submit_enabled);
        assert!(view.input_enabled);
        assert!(view.toggle_enabled);
        assert_eq!(view.connection, ConnectionStatus::Connecting);
        assert!(view.video_frame.is_none());

        let mut state = state;
        state.query = QueryState::AwaitingReply;
        let view = state_to_view(&state);
        assert!(view.querying);
        assert!(!view.submit_enabled);
        assert!(!view.toggle_enabled);
    }

    #[tokio::test]
    async fn loop_runs_a_full_capture_cycle() {
        let (handle, mut view_rx, task) = start_loop();

        handle.toggle_recording().await.unwrap();
        wait_for(&mut view_rx, |v| v.capture == CapturePhase::Recording).await;

        handle.toggle_recording().await.unwrap();
        let view = wait_for(&mut view_rx, |v| v.capture == CapturePhase::Transcribing).await;
        assert!(view.input_text.is_empty());

        handle
            .send(SessionEvent::TranscriptionDone {
                text: "test".to_string(),
            })
            .await
            .unwrap();
        let view = wait_for(&mut view_rx, |v| v.capture == CapturePhase::Idle).await;
        assert_eq!(view.input_text, "test");

        handle.send(SessionEvent::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn loop_processes_submissions_in_order() {
        let (handle, mut view_rx, task) = start_loop();

        handle.submit("hi").await.unwrap();
        let view = wait_for(&mut view_rx, |v| v.querying).await;
        assert_eq!(view.turns.len(), 2);
        assert!(!view.submit_enabled);

        handle
            .send(SessionEvent::ChatReply {
                text: "hello back".to_string(),
            })
            .await
            .unwrap();
        let view = wait_for(&mut view_rx, |v| !v.querying).await;
        assert_eq!(view.turns.len(), 3);
        assert_eq!(view.latest_assistant_id, Some(3));

        handle.send(SessionEvent::Shutdown).await.unwrap();
        task.await.unwrap();
    }
}
