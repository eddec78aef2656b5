use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;

use crate::errors::{BoxError, Error};
use crate::telemetry::{RefreshLogger, TracingLogger};
use crate::token::{JwtDecoder, TokenDecoder};

use super::delay::{DelayCalculator, MAX_DELAY_MS};
use super::refresh::{RefreshFn, Refreshed};

pub type DelayFn = Arc<dyn Fn(&DelayInput) -> Result<f64, BoxError> + Send + Sync>;
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Safety margin before expiry, either fixed or re-evaluated every cycle.
#[derive(Clone)]
pub enum LeadSeconds {
    Fixed(f64),
    Dynamic(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl LeadSeconds {
    pub fn dynamic(f: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        LeadSeconds::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self) -> f64 {
        match self {
            LeadSeconds::Fixed(secs) => *secs,
            LeadSeconds::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for LeadSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadSeconds::Fixed(secs) => f.debug_tuple("Fixed").field(secs).finish(),
            LeadSeconds::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

impl From<f64> for LeadSeconds {
    fn from(secs: f64) -> Self {
        LeadSeconds::Fixed(secs)
    }
}

impl From<u32> for LeadSeconds {
    fn from(secs: u32) -> Self {
        LeadSeconds::Fixed(f64::from(secs))
    }
}

impl From<Duration> for LeadSeconds {
    fn from(lead: Duration) -> Self {
        LeadSeconds::Fixed(lead.as_secs_f64())
    }
}

/// Everything a delay function gets to look at. All values are seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DelayInput {
    pub expires_at: f64,
    pub issued_at: f64,
    pub not_before: Option<f64>,
    pub lead: f64,
    pub now: f64,
}

impl DelayInput {
    /// Time left until expiry minus the lead.
    pub fn default_delay(&self) -> f64 {
        self.expires_at - self.now - self.lead
    }
}

/// Construction options for [`AutoRefresh`](super::AutoRefresh).
///
/// `refresh` and `lead_seconds` are required; everything else has a default.
#[derive(Clone, Default)]
pub struct AutoRefreshOptions {
    refresh: Option<RefreshFn>,
    lead_seconds: Option<LeadSeconds>,
    delay_func: Option<DelayFn>,
    logger: Option<Arc<dyn RefreshLogger>>,
    decoder: Option<Arc<dyn TokenDecoder>>,
    clock: Option<Clock>,
    max_delay: Option<Duration>,
}

impl AutoRefreshOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the refresh operation. It may return a token, a `Result`, or a
    /// [`Refreshed`] for asynchronous refreshes.
    pub fn refresh<F, R>(mut self, f: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Into<Refreshed>,
    {
        self.refresh = Some(Arc::new(move || -> Refreshed { f().into() }));
        self
    }

    pub fn refresh_async<F, Fut, E>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.refresh = Some(Arc::new(move || -> Refreshed { Refreshed::pending(f()) }));
        self
    }

    pub fn lead_seconds(mut self, lead: impl Into<LeadSeconds>) -> Self {
        self.lead_seconds = Some(lead.into());
        self
    }

    pub fn lead_seconds_with(mut self, f: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.lead_seconds = Some(LeadSeconds::dynamic(f));
        self
    }

    /// Replaces the delay policy. The function returns signed seconds.
    pub fn delay_func(mut self, f: impl Fn(&DelayInput) -> f64 + Send + Sync + 'static) -> Self {
        self.delay_func = Some(Arc::new(move |input: &DelayInput| {
            Ok::<f64, BoxError>(f(input))
        }));
        self
    }

    pub fn try_delay_func<F, E>(mut self, f: F) -> Self
    where
        F: Fn(&DelayInput) -> Result<f64, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.delay_func = Some(Arc::new(move |input: &DelayInput| {
            f(input).map_err(Into::<BoxError>::into)
        }));
        self
    }

    pub fn logger(mut self, logger: Arc<dyn RefreshLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn TokenDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Lowers the ceiling applied to computed delays.
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = Some(max);
        self
    }

    pub(crate) fn validate(self) -> Result<ValidatedOptions, Error> {
        let refresh = self.refresh.ok_or_else(|| {
            Error::Config("autorefresh requires a refresh function parameter".into())
        })?;
        let lead = self.lead_seconds.ok_or_else(|| {
            Error::Config(
                "autorefresh requires a leadSeconds number or function returning a number in seconds"
                    .into(),
            )
        })?;
        if let LeadSeconds::Fixed(secs) = lead
            && !(secs.is_finite() && secs > 0.0)
        {
            return Err(Error::Config(format!(
                "leadSeconds must be a positive number of seconds (got {secs})"
            )));
        }
        let max_delay_ms = match self.max_delay {
            None => MAX_DELAY_MS,
            Some(max) if max.is_zero() => {
                return Err(Error::Config("max delay must be > 0".into()));
            }
            Some(max) if max.as_millis() > u128::from(MAX_DELAY_MS) => {
                return Err(Error::Config(format!(
                    "max delay cannot exceed the timer limit of {MAX_DELAY_MS}(ms)"
                )));
            }
            Some(max) => max.as_millis() as u64,
        };
        let delay_func: DelayFn = match self.delay_func {
            Some(f) => f,
            None => Arc::new(|input: &DelayInput| Ok::<f64, BoxError>(input.default_delay())),
        };
        let logger: Arc<dyn RefreshLogger> = match self.logger {
            Some(logger) => logger,
            None => Arc::new(TracingLogger),
        };
        let decoder: Arc<dyn TokenDecoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(JwtDecoder::new()),
        };
        let clock: Clock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(Timestamp::now),
        };

        Ok(ValidatedOptions {
            refresh,
            logger,
            calculator: DelayCalculator {
                lead,
                delay_func,
                decoder,
                clock,
                max_delay_ms: max_delay_ms as f64,
            },
        })
    }
}

/// Options after validation and defaulting. Immutable for the scheduler's lifetime.
pub(crate) struct ValidatedOptions {
    pub refresh: RefreshFn,
    pub logger: Arc<dyn RefreshLogger>,
    pub calculator: DelayCalculator,
}
