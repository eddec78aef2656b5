use thiserror::Error as ThisError;

/// Boxed error returned by caller-supplied refresh and delay functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("invalid autorefresh configuration: {0}")]
    Config(String),
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("lead seconds must resolve to a positive number of seconds (got {0})")]
    InvalidLead(f64),
    #[error("error occurred calculating autorefresh delay: {0}")]
    DelayComputation(#[source] BoxError),
    #[error("refresh rejected with an error: {0}")]
    Refresh(#[source] BoxError),
    #[error("autorefresh needs a tokio runtime to schedule work: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Reasons a token cannot drive the refresh schedule.
#[derive(Debug, ThisError)]
pub enum TokenError {
    #[error("token was not a valid JWT: {0}")]
    Malformed(#[source] BoxError),
    #[error("token is missing the \"{0}\" claim")]
    MissingClaim(&'static str),
    #[error("\"{claim}\" claim ({value}) must be less than \"exp\" claim ({expires_at})")]
    ClaimOrder {
        claim: &'static str,
        value: f64,
        expires_at: f64,
    },
}

impl Error {
    /// Wraps any error raised by the delay function.
    pub fn delay_computation(err: impl Into<BoxError>) -> Self {
        Error::DelayComputation(err.into())
    }

    pub fn refresh(err: impl Into<BoxError>) -> Self {
        Error::Refresh(err.into())
    }
}

impl TokenError {
    pub fn malformed(err: impl Into<BoxError>) -> Self {
        TokenError::Malformed(err.into())
    }
}
