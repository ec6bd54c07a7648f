//! Session configuration

use serde::{Deserialize, Serialize};

/// Configuration for one assistant session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// WebSocket endpoint of the assistant service.
    pub server_url: String,

    /// Assistant turn a fresh conversation log is seeded with.
    pub greeting: String,

    /// Capacity of the coordinator event queue.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:5000/ws".to_string(),
            greeting: "Hello, I am Check-in Charlie! How can I help you today?".to_string(),
            event_capacity: 64,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by `CHARLIE_SERVER_URL` / `CHARLIE_GREETING` from
    /// the environment (a `.env` file is honored when present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Ok(url) = std::env::var("CHARLIE_SERVER_URL") {
            if !url.is_empty() {
                config.server_url = url;
            }
        }
        if let Ok(greeting) = std::env::var("CHARLIE_GREETING") {
            if !greeting.is_empty() {
                config.greeting = greeting;
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_targets_local_service() {
        let config = SessionConfig::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:5000/ws");
        assert!(config.greeting.contains("Check-in Charlie"));
        assert!(config.event_capacity > 0);
    }

    #[test]
    fn from_env_does_not_panic() {
        // Actual values depend on the environment; just verify the lookup
        // path works.
        let _ = SessionConfig::from_env();
    }
}
