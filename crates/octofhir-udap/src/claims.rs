//! Claim set construction for software statements and authentication tokens.
//!
//! Builders are pure: the current time is passed in, so every claim set is
//! reproducible except for its `jti`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::UdapResult;
use crate::error::UdapError;
use crate::identity::{ClientIdentity, check_lifetime};
use crate::keys::UdapCertificate;

/// A JWT claim set under construction.
///
/// Claims are kept as JSON values so that registered claims, UDAP
/// registration parameters and authorization extensions share one map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    /// Creates an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a claim, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns a claim value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a string claim.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Returns a numeric claim as seconds since the epoch.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    /// Returns `true` if the claim is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    /// `sub` claim.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// `aud` claim.
    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.get_str("aud")
    }

    /// `iat` claim.
    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.get_i64("iat")
    }

    /// `exp` claim.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.get_i64("exp")
    }

    /// `jti` claim.
    #[must_use]
    pub fn jwt_id(&self) -> Option<&str> {
        self.get_str("jti")
    }

    pub(crate) fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub(crate) fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }
}

impl From<Map<String, Value>> for ClaimSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ClaimSet> for Value {
    fn from(claims: ClaimSet) -> Self {
        Value::Object(claims.0)
    }
}

/// Starts a claim set with the registered claims shared by every UDAP token.
fn registered_claims(
    issuer: &str,
    audience: &str,
    now: OffsetDateTime,
    ttl: Duration,
    ttl_name: &str,
) -> UdapResult<ClaimSet> {
    let lifetime = check_lifetime(ttl_name, ttl)?;
    let iat = now.unix_timestamp();

    let mut claims = ClaimSet::new();
    claims.insert("iss", issuer);
    claims.insert("sub", issuer);
    claims.insert("aud", audience);
    claims.insert("iat", iat);
    claims.insert("exp", iat + lifetime);
    claims.insert("jti", uuid::Uuid::new_v4().to_string());
    Ok(claims)
}

/// Builds the claims of a software statement for dynamic client
/// registration.
///
/// `iss` and `sub` are the Subject Alternative Name URI of the client
/// certificate; `aud` is the registration endpoint.
///
/// # Errors
///
/// - `IdentityExtraction` if the certificate does not carry exactly one SAN URI
/// - `PolicyViolation` if the software statement TTL is zero or above 300s
pub fn build_software_statement(
    identity: &ClientIdentity,
    certificate: &UdapCertificate,
    audience: &str,
    now: OffsetDateTime,
) -> UdapResult<ClaimSet> {
    let client_uri = certificate.san_uri()?;
    let mut claims = registered_claims(
        &client_uri,
        audience,
        now,
        identity.software_statement_ttl,
        "software_statement_ttl",
    )?;

    claims.insert("client_name", identity.client_name.as_str());
    claims.insert("contacts", identity.contacts.clone());
    claims.insert(
        "grant_types",
        identity
            .grant_types
            .iter()
            .map(|g| g.as_str())
            .collect::<Vec<_>>(),
    );
    if let Some(scope) = identity.scope_string() {
        claims.insert("scope", scope);
    }
    claims.insert(
        "token_endpoint_auth_method",
        identity.token_endpoint_auth_method.as_str(),
    );

    if identity.uses_authorization_code() {
        if let Some(logo_uri) = &identity.logo_uri {
            claims.insert("logo_uri", logo_uri.as_str());
        }
        claims.insert("response_types", identity.response_types.clone());
        claims.insert("redirect_uris", identity.redirect_uris.clone());
    }

    tracing::debug!(
        iss = %client_uri,
        aud = %audience,
        jti = ?claims.jwt_id(),
        "built software statement claims"
    );

    Ok(claims)
}

/// Builds the claims of an authentication token for the client credentials
/// grant.
///
/// `iss` and `sub` are the registered client id; `aud` is the token endpoint.
///
/// # Errors
///
/// - `PolicyViolation` if the identity has no client id
/// - `PolicyViolation` if the auth token TTL is zero or above 300s
pub fn build_authentication_token(
    identity: &ClientIdentity,
    audience: &str,
    now: OffsetDateTime,
) -> UdapResult<ClaimSet> {
    let client_id = identity.client_id.as_deref().ok_or_else(|| {
        UdapError::policy_violation(format!(
            "client {} has no client_id; register it first",
            identity.client_name
        ))
    })?;

    let claims = registered_claims(
        client_id,
        audience,
        now,
        identity.auth_token_ttl,
        "auth_token_ttl",
    )?;

    tracing::debug!(
        client_id,
        aud = %audience,
        jti = ?claims.jwt_id(),
        "built authentication token claims"
    );

    Ok(claims)
}
