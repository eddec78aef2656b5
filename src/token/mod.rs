mod claims;
mod decoder;

pub use claims::Claims;
pub use decoder::{JwtDecoder, TokenDecoder};
