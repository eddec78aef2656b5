//! Refreshes a JWT shortly before it expires.
//!
//! The delay is derived from the token's own `exp`/`iat` claims minus a
//! caller-chosen lead time. When it elapses the caller's refresh operation
//! runs, and the token it returns schedules the next refresh.
//!
//! ```no_run
//! use jwt_autorefresh::{AutoRefresh, AutoRefreshOptions};
//!
//! # async fn fetch_token() -> Result<String, std::io::Error> { Ok(String::new()) }
//! # async fn run(initial: String) -> Result<(), jwt_autorefresh::Error> {
//! let autorefresh = AutoRefresh::new(
//!     AutoRefreshOptions::new()
//!         .refresh_async(fetch_token)
//!         .lead_seconds(30.0),
//! )?;
//! let handle = autorefresh.start(initial)?;
//! // ...
//! handle.cancel();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod schedule;
pub mod telemetry;
pub mod token;

pub use config::{Settings, SettingsLocation};
pub use errors::{BoxError, Error, TokenError};
pub use schedule::{
    AutoRefresh, AutoRefreshOptions, CancelHandle, CycleStatus, DelayInput, LeadSeconds,
    MAX_DELAY_MS, Refreshed,
};
pub use telemetry::{LogCode, LogEvent, RefreshLogger, TracingLogger};
pub use token::{Claims, JwtDecoder, TokenDecoder};
