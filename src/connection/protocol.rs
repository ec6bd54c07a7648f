//! Wire protocol for the assistant service connection
//!
//! This module defines the JSON event types exchanged with the assistant
//! service over the WebSocket, as tagged unions decoded and validated at the
//! boundary before anything reaches the state machine.
//!
//! # Protocol Overview
//!
//! Three logical channels are multiplexed over the one connection:
//!
//! | Channel       | Outbound                    | Inbound                                      |
//! |---------------|-----------------------------|----------------------------------------------|
//! | chat          | `chat_message`              | `chat_response`                              |
//! | transcription | `transcribe`                | `transcription_result`, `transcription_error`|
//! | video-frame   | `request_frame`             | `frame`                                      |
//!
//! Binary payloads (the WAV artifact, the JPEG frame) travel base64-encoded
//! inside the JSON text frame.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// A named, independently-ordered logical stream over the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Chat,
    Transcription,
    VideoFrame,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Chat => "chat",
            Channel::Transcription => "transcription",
            Channel::VideoFrame => "video-frame",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events sent from client to the assistant service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Ask the service for the current video frame.
    RequestFrame,

    /// Submit one user turn.
    ChatMessage { text: String },

    /// Request transcription of a captured utterance.
    Transcribe {
        /// Base64-encoded WAV artifact.
        audio: String,
    },
}

impl ClientEvent {
    pub fn chat(text: impl Into<String>) -> Self {
        Self::ChatMessage { text: text.into() }
    }

    /// Build a transcription request from an encoded WAV artifact.
    pub fn transcribe_wav(wav: &[u8]) -> Self {
        Self::Transcribe {
            audio: STANDARD.encode(wav),
        }
    }

    /// The logical channel this event is sent on.
    pub fn channel(&self) -> Channel {
        match self {
            ClientEvent::RequestFrame => Channel::VideoFrame,
            ClientEvent::ChatMessage { .. } => Channel::Chat,
            ClientEvent::Transcribe { .. } => Channel::Transcription,
        }
    }
}

/// Events received from the assistant service.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// One assistant turn to append to the conversation log.
    ChatResponse { text: String },

    /// A new still frame for the video feed, base64-encoded JPEG bytes.
    Frame { data: String },

    /// Transcription of the last submitted utterance.
    TranscriptionResult { transcription: String },

    /// Transcription failed; surfaced, never retried automatically.
    TranscriptionError { error: String },

    /// Catch-all for event kinds we don't handle, so an unknown or future
    /// event never fails decoding and never reaches the state machine.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// The logical channel this event arrived on; `None` for [`Unknown`].
    ///
    /// [`Unknown`]: ServerEvent::Unknown
    pub fn channel(&self) -> Option<Channel> {
        match self {
            ServerEvent::ChatResponse { .. } => Some(Channel::Chat),
            ServerEvent::Frame { .. } => Some(Channel::VideoFrame),
            ServerEvent::TranscriptionResult { .. } | ServerEvent::TranscriptionError { .. } => {
                Some(Channel::Transcription)
            }
            ServerEvent::Unknown => None,
        }
    }
}

/// Decorate raw frame bytes with the image-data URI prefix the presentation
/// layer renders directly.
pub fn frame_data_uri(data: &str) -> String {
    format!("data:image/jpeg;base64,{}", data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serialization() {
        let event = ClientEvent::chat("hello there");
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"event\":\"chat_message\""));
        assert!(json.contains("\"text\":\"hello there\""));
    }

    #[test]
    fn request_frame_serialization() {
        let json = serde_json::to_string(&ClientEvent::RequestFrame).unwrap();
        assert_eq!(json, "{\"event\":\"request_frame\"}");
    }

    #[test]
    fn transcribe_wav_encodes_base64() {
        let wav = vec![0x52u8, 0x49, 0x46, 0x46];
        let event = ClientEvent::transcribe_wav(&wav);

        if let ClientEvent::Transcribe { audio } = &event {
            assert_eq!(STANDARD.decode(audio).unwrap(), wav);
        } else {
            panic!("Expected Transcribe");
        }

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"transcribe\""));
    }

    #[test]
    fn chat_response_deserialization() {
        let json = r#"{"event": "chat_response", "text": "hello back"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();

        match event {
            ServerEvent::ChatResponse { text } => assert_eq!(text, "hello back"),
            _ => panic!("Expected ChatResponse"),
        }
    }

    #[test]
    fn transcription_result_deserialization() {
        let json = r#"{"event": "transcription_result", "transcription": "test"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();

        match event {
            ServerEvent::TranscriptionResult { transcription } => {
                assert_eq!(transcription, "test");
            }
            _ => panic!("Expected TranscriptionResult"),
        }
    }

    #[test]
    fn transcription_error_deserialization() {
        let json = r#"{"event": "transcription_error", "error": "no speech"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();

        match event {
            ServerEvent::TranscriptionError { error } => assert_eq!(error, "no speech"),
            _ => panic!("Expected TranscriptionError"),
        }
    }

    #[test]
    fn unknown_event_kind_is_tolerated() {
        let json = r#"{"event": "some.future.event", "data": "whatever"}"#;
        let event: ServerEvent = serde_json::from_str(json).unwrap();

        assert!(matches!(event, ServerEvent::Unknown));
        assert!(event.channel().is_none());
    }

    #[test]
    fn channel_mapping() {
        assert_eq!(ClientEvent::RequestFrame.channel(), Channel::VideoFrame);
        assert_eq!(ClientEvent::chat("x").channel(), Channel::Chat);
        assert_eq!(
            ClientEvent::transcribe_wav(&[]).channel(),
            Channel::Transcription
        );

        let frame: ServerEvent =
            serde_json::from_str(r#"{"event": "frame", "data": "abc"}"#).unwrap();
        assert_eq!(frame.channel(), Some(Channel::VideoFrame));
    }

    #[test]
    fn frame_data_uri_prefixes_payload() {
        assert_eq!(
            frame_data_uri("abc123"),
            "data:image/jpeg;base64,abc123"
        );
    }
}
