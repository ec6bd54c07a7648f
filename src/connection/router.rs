//! Channel router for inbound events
//!
//! Routes each decoded [`ServerEvent`] to the handler registered for its
//! channel. All dispatch happens from the session's single dispatcher task,
//! so events on the same channel are handled in arrival order and at most one
//! handler per channel is ever in flight. Nothing is guaranteed about
//! ordering *across* channels.

use std::collections::HashMap;

use super::protocol::{Channel, ServerEvent};

/// Handler invoked for every inbound event on one channel.
pub type InboundHandler = Box<dyn FnMut(ServerEvent) + Send>;

/// Registry of at most one handler per channel.
#[derive(Default)]
pub struct ChannelRouter {
    handlers: HashMap<Channel, InboundHandler>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a channel.
    ///
    /// Any previous handler for the channel is detached before the new one is
    /// attached, so a channel never has two handlers reachable at once.
    pub fn subscribe(&mut self, channel: Channel, handler: InboundHandler) {
        if self.handlers.remove(&channel).is_some() {
            log::debug!("Replacing handler for {} channel", channel);
        }
        self.handlers.insert(channel, handler);
    }

    /// Detach the handler for a channel. No further invocations happen for
    /// events dispatched after this returns.
    pub fn unsubscribe(&mut self, channel: Channel) {
        self.handlers.remove(&channel);
    }

    /// Detach every handler (teardown path).
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Route one inbound event to its channel's handler.
    ///
    /// Events with no channel (unknown kinds) and events on channels with no
    /// registered handler are dropped.
    pub fn dispatch(&mut self, event: ServerEvent) {
        let Some(channel) = event.channel() else {
            log::warn!("Dropping inbound event with unknown kind");
            return;
        };

        match self.handlers.get_mut(&channel) {
            Some(handler) => handler(event),
            None => log::debug!("No handler for {} channel; event dropped", channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn chat_response(text: &str) -> ServerEvent {
        serde_json::from_str(&format!(
            "{{\"event\": \"chat_response\", \"text\": \"{}\"}}",
            text
        ))
        .unwrap()
    }

    fn frame(data: &str) -> ServerEvent {
        serde_json::from_str(&format!("{{\"event\": \"frame\", \"data\": \"{}\"}}", data)).unwrap()
    }

    #[test]
    fn dispatch_preserves_per_channel_order() {
        let mut router = ChannelRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        router.subscribe(
            Channel::Chat,
            Box::new(move |event| {
                if let ServerEvent::ChatResponse { text } = event {
                    sink.lock().unwrap().push(text);
                }
            }),
        );

        router.dispatch(chat_response("one"));
        router.dispatch(chat_response("two"));
        router.dispatch(chat_response("three"));

        assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn dispatch_routes_by_channel() {
        let mut router = ChannelRouter::new();
        let chat_seen = Arc::new(Mutex::new(0u32));
        let frame_seen = Arc::new(Mutex::new(0u32));

        let chat_sink = chat_seen.clone();
        router.subscribe(
            Channel::Chat,
            Box::new(move |_| *chat_sink.lock().unwrap() += 1),
        );
        let frame_sink = frame_seen.clone();
        router.subscribe(
            Channel::VideoFrame,
            Box::new(move |_| *frame_sink.lock().unwrap() += 1),
        );

        router.dispatch(frame("aaa"));
        router.dispatch(chat_response("hi"));
        router.dispatch(frame("bbb"));

        assert_eq!(*chat_seen.lock().unwrap(), 1);
        assert_eq!(*frame_seen.lock().unwrap(), 2);
    }

    #[test]
    fn subscribe_replaces_previous_handler() {
        let mut router = ChannelRouter::new();
        let first = Arc::new(Mutex::new(0u32));
        let second = Arc::new(Mutex::new(0u32));

        let sink = first.clone();
        router.subscribe(Channel::Chat, Box::new(move |_| *sink.lock().unwrap() += 1));
        let sink = second.clone();
        router.subscribe(Channel::Chat, Box::new(move |_| *sink.lock().unwrap() += 1));

        router.dispatch(chat_response("hi"));

        // Only the most recent handler is attached.
        assert_eq!(*first.lock().unwrap(), 0);
        assert_eq!(*second.lock().unwrap(), 1);
    }

    #[test]
    fn unsubscribe_prevents_further_invocation() {
        let mut router = ChannelRouter::new();
        let seen = Arc::new(Mutex::new(0u32));

        let sink = seen.clone();
        router.subscribe(Channel::Chat, Box::new(move |_| *sink.lock().unwrap() += 1));

        router.dispatch(chat_response("hi"));
        router.unsubscribe(Channel::Chat);
        router.dispatch(chat_response("again"));

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn unknown_and_unhandled_events_are_dropped() {
        let mut router = ChannelRouter::new();

        // No handlers at all, unknown kind: neither may panic.
        let unknown: ServerEvent = serde_json::from_str(r#"{"event": "nope"}"#).unwrap();
        router.dispatch(unknown);
        router.dispatch(chat_response("nobody listening"));
    }
}
