use serde::Deserialize;

use crate::errors::TokenError;

/// Registered claims as they appear on the wire. Every field is optional so a
/// missing claim is reported as such instead of as a JSON error.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawClaims {
    pub exp: Option<f64>,
    pub iat: Option<f64>,
    pub nbf: Option<f64>,
}

/// Timing claims extracted from a token, in NumericDate seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Claims {
    pub expires_at: f64,
    pub issued_at: f64,
    pub not_before: Option<f64>,
}

impl Claims {
    /// Builds claims, requiring `iat` and `nbf` (when present) to precede `exp`.
    pub fn try_new(
        expires_at: f64,
        issued_at: f64,
        not_before: Option<f64>,
    ) -> Result<Self, TokenError> {
        if let Some(nbf) = not_before
            && nbf >= expires_at
        {
            return Err(TokenError::ClaimOrder {
                claim: "nbf",
                value: nbf,
                expires_at,
            });
        }
        if issued_at >= expires_at {
            return Err(TokenError::ClaimOrder {
                claim: "iat",
                value: issued_at,
                expires_at,
            });
        }
        Ok(Self {
            expires_at,
            issued_at,
            not_before,
        })
    }
}

impl TryFrom<RawClaims> for Claims {
    type Error = TokenError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        let expires_at = raw.exp.ok_or(TokenError::MissingClaim("exp"))?;
        let issued_at = raw.iat.ok_or(TokenError::MissingClaim("iat"))?;
        Claims::try_new(expires_at, issued_at, raw.nbf)
    }
}
