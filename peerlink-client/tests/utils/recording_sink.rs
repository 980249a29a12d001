use std::sync::Mutex;

use peerlink_client::{SessionEvent, StateSink};

/// Keeps every event it sees, in publish order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(SessionEvent::name)
            .collect()
    }

    /// Names of recorded events, restricted to the ones listed.
    pub fn names_among(&self, wanted: &[&str]) -> Vec<&'static str> {
        self.names()
            .into_iter()
            .filter(|name| wanted.contains(name))
            .collect()
    }
}

impl StateSink for RecordingSink {
    fn on_event(&self, event: &SessionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
