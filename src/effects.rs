//! Effect runner for the session coordinator
//!
//! This module handles executing effects produced by the state machine:
//! device acquisition and release, and outbound sends on the connection.
//! Completion events are sent back via the provided channel so the state
//! machine stays the single writer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::capture::{wav, CaptureDevice, CaptureHandle, CaptureSignal};
use crate::connection::{ClientEvent, Connection};
use crate::state_machine::{Effect, SessionEvent};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<SessionEvent>);
}

/// Real effect runner: capture via a [`CaptureDevice`], sends via the
/// session's [`Connection`].
pub struct SessionEffectRunner {
    connection: Arc<Connection>,
    device: Arc<dyn CaptureDevice>,
    active_captures: Arc<Mutex<HashMap<Uuid, Box<dyn CaptureHandle>>>>,
}

impl SessionEffectRunner {
    pub fn new(connection: Arc<Connection>, device: Arc<dyn CaptureDevice>) -> Arc<Self> {
        Arc::new(Self {
            connection,
            device,
            active_captures: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

impl EffectRunner for SessionEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<SessionEvent>) {
        match effect {
            Effect::AcquireCapture { id } => {
                let device = self.device.clone();
                let active = self.active_captures.clone();

                tokio::spawn(async move {
                    let (signal_tx, mut signal_rx) = mpsc::channel::<CaptureSignal>(256);

                    // Acquisition can block on the audio backend; keep it off
                    // the async workers.
                    let acquired =
                        tokio::task::spawn_blocking(move || device.acquire(signal_tx)).await;

                    let (handle, format) = match acquired {
                        Ok(Ok(pair)) => pair,
                        Ok(Err(e)) => {
                            log::error!("Failed to acquire capture device: {}", e);
                            let _ = tx
                                .send(SessionEvent::CaptureUnavailable {
                                    id,
                                    reason: e.to_string(),
                                })
                                .await;
                            return;
                        }
                        Err(e) => {
                            log::error!("Capture acquisition task failed: {}", e);
                            let _ = tx
                                .send(SessionEvent::CaptureUnavailable {
                                    id,
                                    reason: e.to_string(),
                                })
                                .await;
                            return;
                        }
                    };

                    active.lock().await.insert(id, handle);
                    let _ = tx.send(SessionEvent::CaptureStarted { id, format }).await;

                    // Bridge device signals into session events until the
                    // device is released (which drops its signal sender).
                    while let Some(signal) = signal_rx.recv().await {
                        let event = match signal {
                            CaptureSignal::Chunk(samples) => {
                                SessionEvent::CaptureChunk { id, samples }
                            }
                            CaptureSignal::Error(reason) => {
                                SessionEvent::CaptureFailed { id, reason }
                            }
                        };
                        if tx.send(event).await.is_err() {
                            log::debug!("Capture bridge stopping: session loop gone");
                            break;
                        }
                    }
                });
            }

            Effect::ReleaseCapture { id } => {
                let active = self.active_captures.clone();

                tokio::spawn(async move {
                    let handle = active.lock().await.remove(&id);
                    match handle {
                        Some(handle) => {
                            // Hardware release may block; it must happen
                            // regardless of how recording ended.
                            let _ = tokio::task::spawn_blocking(move || handle.release()).await;
                        }
                        None => log::warn!("ReleaseCapture: no active handle for id={}", id),
                    }
                });
            }

            Effect::SendChat { text } => {
                let connection = self.connection.clone();
                tokio::spawn(async move {
                    connection.send(ClientEvent::chat(text)).await;
                });
            }

            Effect::SendTranscribe { samples, format } => {
                let connection = self.connection.clone();
                tokio::spawn(async move {
                    log::info!(
                        "Finalizing audio artifact: {} samples at {} Hz",
                        samples.len(),
                        format.sample_rate
                    );
                    match wav::encode_wav(&samples, format) {
                        Ok(artifact) => {
                            connection.send(ClientEvent::transcribe_wav(&artifact)).await;
                        }
                        Err(e) => {
                            log::error!("Failed to encode audio artifact: {}", e);
                            let _ = tx
                                .send(SessionEvent::TranscriptionFailed {
                                    reason: e.to_string(),
                                })
                                .await;
                        }
                    }
                });
            }

            Effect::PublishView => {
                // Handled in the session loop, not here
                unreachable!("PublishView should be handled in run_session_loop");
            }
        }
    }
}

/// Stub effect runner for loop tests: acquisition always succeeds instantly
/// and produces one fixed chunk, sends go nowhere.
#[cfg(test)]
pub struct StubEffectRunner;

#[cfg(test)]
impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<SessionEvent>) {
        match effect {
            Effect::AcquireCapture { id } => {
                tokio::spawn(async move {
                    let format = crate::capture::CaptureFormat {
                        sample_rate: 16_000,
                        channels: 1,
                    };
                    let _ = tx.send(SessionEvent::CaptureStarted { id, format }).await;
                    let _ = tx
                        .send(SessionEvent::CaptureChunk {
                            id,
                            samples: vec![1, 2, 3],
                        })
                        .await;
                });
            }
            Effect::ReleaseCapture { .. } => {}
            Effect::SendChat { text } => {
                log::info!("Stub: would send chat: {}", text);
            }
            Effect::SendTranscribe { samples, .. } => {
                log::info!("Stub: would send {} samples", samples.len());
            }
            Effect::PublishView => {
                unreachable!("PublishView should be handled in run_session_loop");
            }
        }
    }
}
