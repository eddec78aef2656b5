pub mod cycle;
pub mod events;

pub use cycle::CycleTelemetry;
pub use events::{LogCode, LogEvent, RefreshLogger, TracingLogger};
