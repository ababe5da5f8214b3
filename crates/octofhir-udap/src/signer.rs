//! JWS signing of UDAP claim sets.
//!
//! Produces compact JWS with the client certificate chain in the `x5c`
//! header, as UDAP requires for software statements and authentication
//! tokens.

use std::fmt;

use jsonwebtoken::{Algorithm, Header, encode};
use serde::{Deserialize, Serialize};

use crate::UdapResult;
use crate::claims::ClaimSet;
use crate::error::UdapError;
use crate::keys::{ClientKeyMaterial, KeyKind};

/// Supported signing algorithms for UDAP tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256; mandatory to support in UDAP.
    #[default]
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }

    /// Returns `true` if this is an EC-based algorithm.
    #[must_use]
    pub fn is_ec(&self) -> bool {
        matches!(self, Self::ES384)
    }

    /// Returns `true` if keys of the given family can sign with this
    /// algorithm.
    #[must_use]
    pub fn supports(&self, kind: KeyKind) -> bool {
        match kind {
            KeyKind::Rsa => self.is_rsa(),
            KeyKind::EcP384 => self.is_ec(),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SigningAlgorithm {
    type Err = UdapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "ES384" => Ok(Self::ES384),
            other => Err(UdapError::signing(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }
}

/// A compact JWS (`header.payload.signature`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken(String);

impl SignedToken {
    /// Returns the compact serialization.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning the compact serialization.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SignedToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Signs a claim set with the client's private key.
///
/// The header carries `alg`, `typ: JWT` and the certificate chain as `x5c`.
///
/// # Errors
///
/// Returns `UdapError::Signing` if the algorithm does not match the key
/// family or the signature cannot be produced.
pub fn sign(
    claims: &ClaimSet,
    keys: &ClientKeyMaterial,
    algorithm: SigningAlgorithm,
) -> UdapResult<SignedToken> {
    if !algorithm.supports(keys.key_kind()) {
        return Err(UdapError::signing(format!(
            "{} cannot sign with an {} key",
            algorithm,
            keys.key_kind()
        )));
    }

    let mut header = Header::new(algorithm.to_jwt_algorithm());
    header.typ = Some("JWT".to_string());
    header.x5c = Some(keys.x5c().to_vec());

    let token = encode(&header, claims.as_map(), keys.encoding_key())
        .map_err(|e| UdapError::signing(e.to_string()))?;

    tracing::debug!(alg = %algorithm, jti = ?claims.jwt_id(), "signed claim set");

    Ok(SignedToken(token))
}
