use std::sync::Mutex;

use autowifi_core::traits::StatusSink;
use tracing::info;

/// The daemon's stand-in for a persistent notification: status strings land
/// in the log. Deduplicated so a stable status does not repeat every tick.
pub struct LogNotifier {
    last: Mutex<String>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(String::new()),
        }
    }
}

impl StatusSink for LogNotifier {
    fn update_status(&self, text: &str) {
        let mut last = self.last.lock().unwrap();
        if *last != text {
            info!("🔔 {text}");
            *last = text.to_string();
        }
    }
}
