use std::fmt;

use tracing::{Level, event};
use uuid::Uuid;

/// Tags carried by every scheduler log event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogCode {
    Delay,
    DelayError,
    InvalidJwt,
    InvalidDelayFunc,
    InvalidRefresh,
    Execute,
    Schedule,
    Start,
    Cancel,
}

impl LogCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCode::Delay => "DELAY",
            LogCode::DelayError => "DELAY_ERROR",
            LogCode::InvalidJwt => "INVALID_JWT",
            LogCode::InvalidDelayFunc => "INVALID_DELAY_FUNC",
            LogCode::InvalidRefresh => "INVALID_REFRESH",
            LogCode::Execute => "EXECUTE",
            LogCode::Schedule => "SCHEDULE",
            LogCode::Start => "START",
            LogCode::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for LogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct LogEvent {
    pub scheduler_id: Uuid,
    pub code: LogCode,
    pub message: String,
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.code, self.message)
    }
}

/// Sink for scheduler events. Plug in a custom one to route events somewhere
/// other than `tracing`.
pub trait RefreshLogger: Send + Sync {
    fn info(&self, event: &LogEvent);
    fn error(&self, event: &LogEvent, error: &(dyn std::error::Error + 'static));
}

/// Default logger; emits structured `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl RefreshLogger for TracingLogger {
    fn info(&self, ev: &LogEvent) {
        event!(
            Level::INFO,
            scheduler_id = %ev.scheduler_id,
            code = %ev.code,
            "{}",
            ev.message
        );
    }

    fn error(&self, ev: &LogEvent, error: &(dyn std::error::Error + 'static)) {
        event!(
            Level::ERROR,
            scheduler_id = %ev.scheduler_id,
            code = %ev.code,
            error = %error,
            "{}",
            ev.message
        );
    }
}
