use std::sync::Arc;

use crate::errors::Error;
use crate::telemetry::{CycleTelemetry, LogCode};
use crate::token::TokenDecoder;

use super::options::{Clock, DelayFn, DelayInput, LeadSeconds};

/// Largest delay a single-shot timer accepts, in milliseconds (2^31 - 1).
pub const MAX_DELAY_MS: u64 = (1 << 31) - 1;

/// Turns a token into the number of milliseconds to wait before refreshing it.
pub struct DelayCalculator {
    pub(crate) lead: LeadSeconds,
    pub(crate) delay_func: DelayFn,
    pub(crate) decoder: Arc<dyn TokenDecoder>,
    pub(crate) clock: Clock,
    pub(crate) max_delay_ms: f64,
}

impl DelayCalculator {
    /// Returns the delay in milliseconds, clamped to the configured maximum.
    /// Zero or negative means the token should be refreshed right away.
    pub fn calculate(&self, token: &str, telemetry: &CycleTelemetry) -> Result<f64, Error> {
        let claims = match self.decoder.decode(token) {
            Ok(claims) => claims,
            Err(err) => {
                telemetry.error(LogCode::InvalidJwt, &err, "JWT token was not a valid format");
                return Err(Error::InvalidToken(err));
            }
        };

        let lead = self.lead.resolve();
        if !(lead.is_finite() && lead > 0.0) {
            let err = Error::InvalidLead(lead);
            telemetry.error(
                LogCode::DelayError,
                &err,
                "error occurred calculating autorefresh delay",
            );
            return Err(err);
        }

        let input = DelayInput {
            expires_at: claims.expires_at,
            issued_at: claims.issued_at,
            not_before: claims.not_before,
            lead,
            now: self.now_secs(),
        };
        let seconds = match (self.delay_func)(&input) {
            Ok(seconds) if seconds.is_finite() => seconds,
            Ok(seconds) => {
                return Err(self.rejected(
                    telemetry,
                    Error::delay_computation(format!(
                        "delay function returned {seconds}, expected a finite number of seconds"
                    )),
                ));
            }
            Err(source) => {
                return Err(self.rejected(telemetry, Error::DelayComputation(source)));
            }
        };

        let expected_ms = seconds * 1000.0;
        let delay_ms = if expected_ms > self.max_delay_ms {
            telemetry.emit_downgrade(expected_ms, self.max_delay_ms);
            self.max_delay_ms
        } else {
            expected_ms
        };
        telemetry.emit_delay(delay_ms);
        Ok(delay_ms)
    }

    fn rejected(&self, telemetry: &CycleTelemetry, err: Error) -> Error {
        telemetry.error(
            LogCode::InvalidDelayFunc,
            &err,
            "delay function did not produce a delay",
        );
        err
    }

    fn now_secs(&self) -> f64 {
        (self.clock)().as_millisecond() as f64 / 1000.0
    }
}
