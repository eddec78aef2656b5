//! read scheduler settings from a file or the environment

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::Error;
use crate::schedule::AutoRefreshOptions;

pub const LEAD_SECONDS_VAR: &str = "AUTOREFRESH_LEAD_SECONDS";
pub const MAX_DELAY_MS_VAR: &str = "AUTOREFRESH_MAX_DELAY_MS";

pub enum SettingsLocation {
    File(PathBuf),
    Env,
}

/// Tunables that can live outside the code. The refresh operation itself is
/// always supplied programmatically.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Settings {
    pub lead_seconds: f64,
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

impl Settings {
    pub fn load(loc: SettingsLocation) -> Result<Self, Error> {
        match loc {
            SettingsLocation::File(path) => Self::from_file(path),
            SettingsLocation::Env => Self::from_env(),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path.into())?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let lead_seconds = lookup(LEAD_SECONDS_VAR)
            .ok_or_else(|| Error::Config(format!("Missing {LEAD_SECONDS_VAR} env var")))?
            .trim()
            .parse::<f64>()
            .map_err(|e| Error::Config(format!("Invalid {LEAD_SECONDS_VAR}: {e}")))?;
        let max_delay_ms = lookup(MAX_DELAY_MS_VAR)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| Error::Config(format!("Invalid {MAX_DELAY_MS_VAR}: {e}")))
            })
            .transpose()?;
        Ok(Self {
            lead_seconds,
            max_delay_ms,
        })
    }

    /// Folds these settings into `options`; validation happens when the
    /// scheduler is built.
    pub fn apply(&self, options: AutoRefreshOptions) -> AutoRefreshOptions {
        let options = options.lead_seconds(self.lead_seconds);
        match self.max_delay_ms {
            Some(ms) => options.max_delay(Duration::from_millis(ms)),
            None => options,
        }
    }
}
