//! Client identity profile.
//!
//! A [`ClientIdentity`] describes one UDAP client application: the values it
//! asserts in its software statement and the lifetimes of the tokens it
//! signs. It does not own key material; keys are handed to every flow
//! explicitly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::UdapResult;
use crate::error::UdapError;

/// Upper bound for the lifetime of software statements and authentication
/// tokens (`exp - iat`).
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

/// Fixed `token_endpoint_auth_method` for UDAP clients.
pub const PRIVATE_KEY_JWT: &str = "private_key_jwt";

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types a UDAP client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow.
    AuthorizationCode,
    /// Client Credentials flow (B2B).
    ClientCredentials,
    /// Refresh Token flow; only alongside `authorization_code`.
    RefreshToken,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client Identity
// =============================================================================

/// Profile of a registered or registering UDAP client.
///
/// # Example (TOML)
///
/// ```toml
/// nickname = "b2b"
/// client_name = "Example B2B Client"
/// contacts = ["mailto:ops@client.example"]
/// grant_types = ["client_credentials"]
/// scopes = ["system/Patient.read"]
/// software_statement_ttl = "5m"
/// auth_token_ttl = "5m"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Short name used by configuration to select this profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Human readable client application name.
    pub client_name: String,

    /// Contact URIs for the application operator (e.g. `mailto:` URIs).
    #[serde(default)]
    pub contacts: Vec<String>,

    /// Logo URL; required with `authorization_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,

    /// Requested grant types.
    pub grant_types: Vec<GrantType>,

    /// Requested response types; `["code"]` with `authorization_code`,
    /// empty otherwise.
    #[serde(default)]
    pub response_types: Vec<String>,

    /// Redirection URIs; required with `authorization_code`, empty otherwise.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Requested scopes.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Token endpoint authentication method.
    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: String,

    /// Client id assigned by the authorization server after registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Lifetime of software statements.
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub software_statement_ttl: Duration,

    /// Lifetime of authentication tokens.
    #[serde(default = "default_ttl", with = "humantime_serde")]
    pub auth_token_ttl: Duration,

    /// Signed certification JWTs forwarded with the registration request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,
}

fn default_auth_method() -> String {
    PRIVATE_KEY_JWT.to_string()
}

fn default_ttl() -> Duration {
    MAX_TOKEN_LIFETIME
}

impl ClientIdentity {
    /// Creates a new identity with the given name and grant types.
    ///
    /// TTLs default to [`MAX_TOKEN_LIFETIME`]; with `authorization_code`,
    /// `response_types` defaults to `["code"]`.
    #[must_use]
    pub fn new(client_name: impl Into<String>, grant_types: Vec<GrantType>) -> Self {
        let response_types = if grant_types.contains(&GrantType::AuthorizationCode) {
            vec!["code".to_string()]
        } else {
            Vec::new()
        };

        Self {
            nickname: None,
            client_name: client_name.into(),
            contacts: Vec::new(),
            logo_uri: None,
            grant_types,
            response_types,
            redirect_uris: Vec::new(),
            scopes: Vec::new(),
            token_endpoint_auth_method: default_auth_method(),
            client_id: None,
            software_statement_ttl: MAX_TOKEN_LIFETIME,
            auth_token_ttl: MAX_TOKEN_LIFETIME,
            certifications: Vec::new(),
        }
    }

    /// Sets the nickname.
    #[must_use]
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Sets the contact URIs.
    #[must_use]
    pub fn with_contacts(mut self, contacts: Vec<String>) -> Self {
        self.contacts = contacts;
        self
    }

    /// Sets the logo URL.
    #[must_use]
    pub fn with_logo_uri(mut self, logo_uri: impl Into<String>) -> Self {
        self.logo_uri = Some(logo_uri.into());
        self
    }

    /// Sets the redirection URIs.
    #[must_use]
    pub fn with_redirect_uris(mut self, redirect_uris: Vec<String>) -> Self {
        self.redirect_uris = redirect_uris;
        self
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the registered client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the software statement lifetime.
    #[must_use]
    pub fn with_software_statement_ttl(mut self, ttl: Duration) -> Self {
        self.software_statement_ttl = ttl;
        self
    }

    /// Sets the authentication token lifetime.
    #[must_use]
    pub fn with_auth_token_ttl(mut self, ttl: Duration) -> Self {
        self.auth_token_ttl = ttl;
        self
    }

    /// Sets the certification JWTs sent with registration requests.
    #[must_use]
    pub fn with_certifications(mut self, certifications: Vec<String>) -> Self {
        self.certifications = certifications;
        self
    }

    /// Returns `true` if `authorization_code` is among the grant types.
    #[must_use]
    pub fn uses_authorization_code(&self) -> bool {
        self.grant_types.contains(&GrantType::AuthorizationCode)
    }

    /// Returns the requested scopes as a space-delimited string, or `None`
    /// when no scope is configured.
    #[must_use]
    pub fn scope_string(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(" "))
        }
    }

    /// Validates the profile against the UDAP registration rules.
    ///
    /// # Errors
    ///
    /// Returns `UdapError::PolicyViolation` if:
    /// - `client_name` is empty
    /// - grant types do not contain exactly one of `authorization_code` and
    ///   `client_credentials`
    /// - `refresh_token` is requested without `authorization_code`
    /// - redirect URIs, response types or logo do not follow the grant types
    /// - a token lifetime is zero, has a fractional second or exceeds
    ///   [`MAX_TOKEN_LIFETIME`]
    pub fn validate(&self) -> UdapResult<()> {
        if self.client_name.trim().is_empty() {
            return Err(UdapError::policy_violation("client_name must not be empty"));
        }

        let has_code = self.uses_authorization_code();
        let has_credentials = self.grant_types.contains(&GrantType::ClientCredentials);
        if has_code == has_credentials {
            return Err(UdapError::policy_violation(
                "grant_types must contain exactly one of authorization_code and client_credentials",
            ));
        }

        if self.grant_types.contains(&GrantType::RefreshToken) && !has_code {
            return Err(UdapError::policy_violation(
                "refresh_token requires the authorization_code grant type",
            ));
        }

        if has_code {
            if self.redirect_uris.is_empty() {
                return Err(UdapError::policy_violation(
                    "redirect_uris are required with authorization_code",
                ));
            }
            if self.response_types != ["code"] {
                return Err(UdapError::policy_violation(
                    "response_types must be [\"code\"] with authorization_code",
                ));
            }
            if self.logo_uri.is_none() {
                return Err(UdapError::policy_violation(
                    "logo_uri is required with authorization_code",
                ));
            }
        } else if !self.redirect_uris.is_empty() || !self.response_types.is_empty() {
            return Err(UdapError::policy_violation(
                "redirect_uris and response_types must be absent without authorization_code",
            ));
        }

        check_lifetime("software_statement_ttl", self.software_statement_ttl)?;
        check_lifetime("auth_token_ttl", self.auth_token_ttl)?;

        Ok(())
    }
}

/// Returns the lifetime in whole seconds, rejecting zero, fractional
/// seconds and anything above [`MAX_TOKEN_LIFETIME`].
pub(crate) fn check_lifetime(name: &str, ttl: Duration) -> UdapResult<i64> {
    if ttl.is_zero() {
        return Err(UdapError::policy_violation(format!("{name} must be positive")));
    }
    if ttl.subsec_nanos() != 0 {
        return Err(UdapError::policy_violation(format!(
            "{name} of {ttl:?} must be a whole number of seconds"
        )));
    }
    if ttl > MAX_TOKEN_LIFETIME {
        return Err(UdapError::policy_violation(format!(
            "{name} of {}s exceeds the {}s ceiling",
            ttl.as_secs(),
            MAX_TOKEN_LIFETIME.as_secs()
        )));
    }
    Ok(ttl.as_secs() as i64)
}
