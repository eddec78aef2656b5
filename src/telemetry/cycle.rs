use std::sync::Arc;

use uuid::Uuid;

use super::events::{LogCode, LogEvent, RefreshLogger};

/// Emits the events of one refresh cycle, stamped with the scheduler id.
#[derive(Clone)]
pub struct CycleTelemetry {
    scheduler_id: Uuid,
    logger: Arc<dyn RefreshLogger>,
}

impl CycleTelemetry {
    pub fn new(logger: Arc<dyn RefreshLogger>) -> Self {
        Self {
            scheduler_id: Uuid::new_v4(),
            logger,
        }
    }

    pub fn scheduler_id(&self) -> Uuid {
        self.scheduler_id
    }

    fn event(&self, code: LogCode, message: String) -> LogEvent {
        LogEvent {
            scheduler_id: self.scheduler_id,
            code,
            message,
        }
    }

    pub fn info(&self, code: LogCode, message: impl Into<String>) {
        self.logger.info(&self.event(code, message.into()));
    }

    pub fn error(
        &self,
        code: LogCode,
        error: &(dyn std::error::Error + 'static),
        message: impl Into<String>,
    ) {
        self.logger.error(&self.event(code, message.into()), error);
    }

    pub fn emit_start(&self) {
        self.info(LogCode::Start, "autorefresh started");
    }

    pub fn emit_downgrade(&self, expected_ms: f64, max_ms: f64) {
        self.info(
            LogCode::Delay,
            format!(
                "expected {expected_ms}(ms) downgrade to {max_ms}(ms), caused by timer limit of {max_ms}(ms)"
            ),
        );
    }

    pub fn emit_delay(&self, delay_ms: f64) {
        self.info(
            LogCode::Delay,
            format!(
                "calculated autorefresh delay => {:.1} seconds",
                delay_ms / 1000.0
            ),
        );
    }

    pub fn emit_schedule(&self, delay_ms: f64) {
        self.info(
            LogCode::Schedule,
            format!("scheduled refresh in {:.1} seconds", delay_ms / 1000.0),
        );
    }

    pub fn emit_execute(&self) {
        self.info(LogCode::Execute, "executing refresh");
    }

    pub fn emit_cancel(&self) {
        self.info(LogCode::Cancel, "autorefresh cancelled");
    }
}
