#![allow(dead_code)]

use std::sync::{Mutex, Once};

use jiff::Timestamp;
use jsonwebtoken::{EncodingKey, Header};
use jwt_autorefresh::{LogCode, LogEvent, RefreshLogger};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn mint(claims: &serde_json::Value) -> String {
    jsonwebtoken::encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(b"xxx"),
    )
    .expect("claims must encode")
}

pub fn now_secs() -> i64 {
    Timestamp::now().as_second()
}

pub fn token_expiring_in(ttl_secs: i64) -> String {
    let now = now_secs();
    mint(&serde_json::json!({ "iat": now, "exp": now + ttl_secs }))
}

#[derive(Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingLogger {
    pub fn codes(&self) -> Vec<LogCode> {
        self.events.lock().unwrap().iter().map(|e| e.code).collect()
    }

    pub fn count(&self, code: LogCode) -> usize {
        self.codes().iter().filter(|c| **c == code).count()
    }
}

impl RefreshLogger for RecordingLogger {
    fn info(&self, event: &LogEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn error(&self, event: &LogEvent, _error: &(dyn std::error::Error + 'static)) {
        self.events.lock().unwrap().push(event.clone());
    }
}
