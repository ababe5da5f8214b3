//! Verification of signed server metadata and the trust decision.
//!
//! A UDAP authorization server re-asserts its endpoints in
//! `signed_metadata`, a JWS signed with the key of the first certificate of
//! its `x5c` header. The client trusts the server when that signature
//! verifies, the claims are complete and issued by the expected issuer, and
//! the signed endpoints agree with the ones the discovery document declares.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use serde::{Deserialize, Serialize};

use crate::UdapResult;
use crate::claims::ClaimSet;
use crate::error::{MetadataRejection, UdapError};
use crate::keys::UdapCertificate;
use crate::model::ServerMetadata;
use crate::signer::SigningAlgorithm;

/// Claims of a signed metadata token whose signature and required claims
/// have been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    issuer: String,
    token_endpoint: String,
    registration_endpoint: String,
    claims: ClaimSet,
}

impl VerifiedClaims {
    /// `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signed `token_endpoint`.
    #[must_use]
    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    /// Signed `registration_endpoint`.
    #[must_use]
    pub fn registration_endpoint(&self) -> &str {
        &self.registration_endpoint
    }

    /// Signed `authorization_endpoint`; not required by the trust check.
    #[must_use]
    pub fn authorization_endpoint(&self) -> Option<&str> {
        self.claims.get_str("authorization_endpoint")
    }

    /// All claims of the token.
    #[must_use]
    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }
}

/// Verifies a signed metadata token.
///
/// # Errors
///
/// - `MissingCertificateChain` if the header has no `x5c` entry
/// - `UntrustedMetadata` if the token is malformed, signed with another
///   algorithm, carries an unusable certificate, fails signature
///   verification, has expired, lacks a required claim (`iss`, `exp`,
///   `iat`, `jti`, `token_endpoint`, `registration_endpoint`) or was issued
///   by someone other than `expected_issuer`
pub fn verify_signed_metadata(
    token: &str,
    expected_issuer: &str,
    algorithm: SigningAlgorithm,
) -> UdapResult<VerifiedClaims> {
    let header =
        decode_header(token).map_err(|e| MetadataRejection::Malformed(e.to_string()))?;

    if header.alg != algorithm.to_jwt_algorithm() {
        return Err(MetadataRejection::AlgorithmMismatch {
            expected: algorithm.as_str().to_string(),
            actual: format!("{:?}", header.alg),
        }
        .into());
    }

    let leaf = header
        .x5c
        .as_ref()
        .and_then(|chain| chain.first())
        .ok_or(UdapError::MissingCertificateChain)?;

    let der = STANDARD
        .decode(leaf)
        .map_err(|e| MetadataRejection::InvalidCertificate(e.to_string()))?;
    let certificate = UdapCertificate::from_der(&der)
        .map_err(|e| MetadataRejection::InvalidCertificate(e.to_string()))?;

    let kind = certificate
        .key_kind()
        .map_err(|e| MetadataRejection::InvalidCertificate(e.to_string()))?;
    if !algorithm.supports(kind) {
        return Err(MetadataRejection::InvalidCertificate(format!(
            "{kind} key of {} cannot verify {algorithm}",
            certificate.subject()
        ))
        .into());
    }

    let decoding_key = certificate
        .decoding_key()
        .map_err(|e| MetadataRejection::InvalidCertificate(e.to_string()))?;

    let mut validation = Validation::new(algorithm.to_jwt_algorithm());
    validation.validate_exp = true;
    validation.validate_aud = false;

    let claims = decode::<ClaimSet>(token, &decoding_key, &validation)
        .map_err(rejection_from_jwt)?
        .claims;

    let issuer = require_str(&claims, "iss")?;
    if normalize(issuer) != normalize(expected_issuer) {
        return Err(MetadataRejection::issuer_mismatch(expected_issuer, issuer).into());
    }

    if claims.expires_at().is_none() {
        return Err(MetadataRejection::MissingClaim("exp".to_string()).into());
    }
    if claims.issued_at().is_none() {
        return Err(MetadataRejection::MissingClaim("iat".to_string()).into());
    }
    require_str(&claims, "jti")?;

    let verified = VerifiedClaims {
        issuer: issuer.to_string(),
        token_endpoint: require_str(&claims, "token_endpoint")?.to_string(),
        registration_endpoint: require_str(&claims, "registration_endpoint")?.to_string(),
        claims,
    };

    tracing::debug!(
        issuer = %verified.issuer,
        signer = %certificate.subject(),
        "verified signed metadata"
    );

    Ok(verified)
}

fn require_str<'a>(claims: &'a ClaimSet, name: &str) -> Result<&'a str, MetadataRejection> {
    claims
        .get_str(name)
        .ok_or_else(|| MetadataRejection::MissingClaim(name.to_string()))
}

fn normalize(url: &str) -> &str {
    url.trim_end_matches('/')
}

fn rejection_from_jwt(err: jsonwebtoken::errors::Error) -> MetadataRejection {
    match err.kind() {
        ErrorKind::ExpiredSignature => MetadataRejection::Expired,
        ErrorKind::InvalidSignature => MetadataRejection::InvalidSignature,
        ErrorKind::MissingRequiredClaim(claim) => MetadataRejection::MissingClaim(claim.clone()),
        _ => MetadataRejection::Malformed(err.to_string()),
    }
}

// =============================================================================
// Trust Decision
// =============================================================================

/// How the signed endpoints must agree with the declared ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMatch {
    /// Registration endpoint or token endpoint must match.
    #[default]
    Any,
    /// Both endpoints must match.
    All,
}

/// Whether signed metadata must be verified before talking to a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// Verify signed metadata; refuse untrusted servers.
    #[default]
    Required,
    /// Skip verification and treat the server as trusted.
    AssumeTrusted,
}

impl TrustPolicy {
    /// Returns `true` if verification is mandatory.
    #[must_use]
    pub fn must_be_trusted(&self) -> bool {
        matches!(self, Self::Required)
    }
}

impl From<bool> for TrustPolicy {
    fn from(must_be_trusted: bool) -> Self {
        if must_be_trusted {
            Self::Required
        } else {
            Self::AssumeTrusted
        }
    }
}

/// Why a trust decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustReason {
    /// Signed metadata verified and the endpoints agree.
    Verified,
    /// Verification was skipped by policy.
    Bypassed,
    /// Signed metadata verified but the endpoints disagree.
    EndpointMismatch,
}

/// Outcome of evaluating a server's metadata against a trust policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrustDecision {
    pub trusted: bool,
    pub reason: TrustReason,
}

impl TrustDecision {
    fn new(trusted: bool, reason: TrustReason) -> Self {
        Self { trusted, reason }
    }
}

/// Applies the default endpoint rule: the signed registration endpoint or
/// the signed token endpoint equals the declared one.
#[must_use]
pub fn is_trusted(metadata: &ServerMetadata, claims: &VerifiedClaims) -> bool {
    is_trusted_with(metadata, claims, EndpointMatch::Any)
}

/// Compares signed and declared endpoints with the given rule.
#[must_use]
pub fn is_trusted_with(
    metadata: &ServerMetadata,
    claims: &VerifiedClaims,
    rule: EndpointMatch,
) -> bool {
    let registration_matches =
        metadata.registration_endpoint.as_deref() == Some(claims.registration_endpoint());
    let token_matches = metadata.token_endpoint.as_deref() == Some(claims.token_endpoint());

    match rule {
        EndpointMatch::Any => registration_matches || token_matches,
        EndpointMatch::All => registration_matches && token_matches,
    }
}

/// Evaluates a discovery document against a trust policy.
///
/// With [`TrustPolicy::AssumeTrusted`] the signed metadata is not looked at.
///
/// # Errors
///
/// With [`TrustPolicy::Required`], returns `UntrustedMetadata` when the
/// document has no `signed_metadata` or it fails verification, and
/// `MissingCertificateChain` when its header has no `x5c`.
pub fn evaluate(
    metadata: &ServerMetadata,
    expected_issuer: &str,
    policy: TrustPolicy,
    rule: EndpointMatch,
    algorithm: SigningAlgorithm,
) -> UdapResult<TrustDecision> {
    if !policy.must_be_trusted() {
        tracing::warn!(
            issuer = expected_issuer,
            "signed metadata verification skipped; server assumed trusted"
        );
        return Ok(TrustDecision::new(true, TrustReason::Bypassed));
    }

    let token = metadata
        .signed_metadata
        .as_deref()
        .ok_or(MetadataRejection::MissingSignedMetadata)?;

    let claims = verify_signed_metadata(token, expected_issuer, algorithm).inspect_err(|e| {
        tracing::warn!(issuer = expected_issuer, error = %e, "signed metadata rejected");
    })?;

    if is_trusted_with(metadata, &claims, rule) {
        Ok(TrustDecision::new(true, TrustReason::Verified))
    } else {
        tracing::warn!(
            issuer = expected_issuer,
            signed_token_endpoint = claims.token_endpoint(),
            signed_registration_endpoint = claims.registration_endpoint(),
            "signed endpoints do not match the discovery document"
        );
        Ok(TrustDecision::new(false, TrustReason::EndpointMismatch))
    }
}
