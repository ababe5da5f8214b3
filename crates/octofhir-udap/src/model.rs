//! Wire types exchanged with UDAP authorization servers.
//!
//! # References
//!
//! - [UDAP Security IG, Discovery](https://hl7.org/fhir/us/udap-security/discovery.html)
//! - [RFC 7591 - OAuth 2.0 Dynamic Client Registration](https://tools.ietf.org/html/rfc7591)
//! - [RFC 7523 - JWT Profile for OAuth 2.0 Client Authentication](https://tools.ietf.org/html/rfc7523)

use serde::{Deserialize, Serialize};

use crate::identity::GrantType;

/// Path of the UDAP discovery document relative to the FHIR base URL.
pub const WELL_KNOWN_UDAP_PATH: &str = ".well-known/udap";

/// `client_assertion_type` for JWT bearer client authentication.
pub const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// UDAP version sent with registration and token requests.
pub const DEFAULT_UDAP_VERSION: &str = "1";

// =============================================================================
// Discovery
// =============================================================================

/// UDAP server metadata (`/.well-known/udap`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    #[serde(default)]
    pub udap_versions_supported: Vec<String>,

    #[serde(default)]
    pub udap_profiles_supported: Vec<String>,

    #[serde(default)]
    pub udap_authorization_extensions_supported: Vec<String>,

    #[serde(default)]
    pub udap_authorization_extensions_required: Vec<String>,

    #[serde(default)]
    pub udap_certifications_supported: Vec<String>,

    #[serde(default)]
    pub udap_certifications_required: Vec<String>,

    #[serde(default)]
    pub grant_types_supported: Vec<String>,

    #[serde(default)]
    pub scopes_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Vec<String>,

    #[serde(default)]
    pub token_endpoint_auth_signing_alg_values_supported: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(default)]
    pub registration_endpoint_jwt_signing_alg_values_supported: Vec<String>,

    /// Compact JWS re-asserting the endpoints, signed by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_metadata: Option<String>,
}

impl ServerMetadata {
    /// Returns `true` if the server advertises the grant type.
    #[must_use]
    pub fn supports_grant_type(&self, grant_type: GrantType) -> bool {
        self.grant_types_supported
            .iter()
            .any(|g| g == grant_type.as_str())
    }

    /// Returns the required authorization extensions that are not in
    /// `supplied`.
    #[must_use]
    pub fn missing_required_extensions<'a>(&'a self, supplied: &[&str]) -> Vec<&'a str> {
        self.udap_authorization_extensions_required
            .iter()
            .map(String::as_str)
            .filter(|required| !supplied.contains(required))
            .collect()
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Dynamic client registration request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Signed software statement.
    pub software_statement: String,

    /// Signed certification JWTs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certifications: Vec<String>,

    /// UDAP version.
    pub udap: String,
}

/// Successful registration response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    /// Client id assigned by the server.
    pub client_id: String,

    /// Software statement echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub software_statement: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    #[serde(default)]
    pub redirect_uris: Vec<String>,

    #[serde(default)]
    pub grant_types: Vec<String>,

    #[serde(default)]
    pub response_types: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
}

// =============================================================================
// Token
// =============================================================================

/// Client credentials token request (form encoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentialsTokenRequest {
    /// Signed authentication token.
    pub client_assertion: String,
    /// Requested scope, space delimited.
    pub scope: Option<String>,
    /// UDAP version.
    pub udap: String,
}

impl ClientCredentialsTokenRequest {
    /// Returns the form fields in submission order.
    #[must_use]
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            (
                "grant_type".to_string(),
                GrantType::ClientCredentials.as_str().to_string(),
            ),
            (
                "client_assertion_type".to_string(),
                CLIENT_ASSERTION_TYPE.to_string(),
            ),
            ("client_assertion".to_string(), self.client_assertion.clone()),
        ];
        if let Some(scope) = &self.scope {
            fields.push(("scope".to_string(), scope.clone()));
        }
        fields.push(("udap".to_string(), self.udap.clone()));
        fields
    }
}

/// Successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,

    pub token_type: String,

    /// Lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Granted scope, if different from the requested one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// OAuth 2.0 error response (RFC 6749 section 5.2, RFC 7591 section 3.2.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuthErrorResponse {
    /// Parses an error body, falling back to a generic summary built from
    /// the status when the body is not an OAuth error.
    #[must_use]
    pub fn from_body(status: u16, body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self {
            error: format!("http_{status}"),
            error_description: if body.trim().is_empty() {
                None
            } else {
                Some(body.chars().take(512).collect())
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_metadata() {
        let json = r#"{
            "udap_versions_supported": ["1"],
            "udap_profiles_supported": ["udap_dcr", "udap_authn", "udap_authz"],
            "udap_authorization_extensions_supported": ["hl7-b2b"],
            "udap_authorization_extensions_required": ["hl7-b2b"],
            "udap_certifications_supported": [],
            "grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
            "token_endpoint": "https://as.example/token",
            "token_endpoint_auth_methods_supported": ["private_key_jwt"],
            "token_endpoint_auth_signing_alg_values_supported": ["RS256"],
            "registration_endpoint": "https://as.example/register",
            "registration_endpoint_jwt_signing_alg_values_supported": ["RS256"],
            "signed_metadata": "a.b.c"
        }"#;

        let metadata: ServerMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.token_endpoint.as_deref(), Some("https://as.example/token"));
        assert_eq!(metadata.authorization_endpoint, None);
        assert!(metadata.udap_certifications_required.is_empty());
        assert!(metadata.scopes_supported.is_empty());
        assert!(metadata.supports_grant_type(GrantType::ClientCredentials));
        assert_eq!(metadata.signed_metadata.as_deref(), Some("a.b.c"));
    }

    #[test]
    fn test_missing_required_extensions() {
        let metadata = ServerMetadata {
            udap_authorization_extensions_required: vec![
                "hl7-b2b".to_string(),
                "tefca-ias".to_string(),
            ],
            ..Default::default()
        };
        assert_eq!(
            metadata.missing_required_extensions(&["hl7-b2b"]),
            vec!["tefca-ias"]
        );
        assert!(
            metadata
                .missing_required_extensions(&["tefca-ias", "hl7-b2b"])
                .is_empty()
        );
    }

    #[test]
    fn test_registration_request_serialization() {
        let request = RegistrationRequest {
            software_statement: "a.b.c".to_string(),
            certifications: vec![],
            udap: DEFAULT_UDAP_VERSION.to_string(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"software_statement": "a.b.c", "udap": "1"})
        );
    }

    #[test]
    fn test_token_request_form_fields() {
        let request = ClientCredentialsTokenRequest {
            client_assertion: "a.b.c".to_string(),
            scope: Some("system/Patient.read".to_string()),
            udap: DEFAULT_UDAP_VERSION.to_string(),
        };
        let fields = request.form_fields();
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("grant_type"), Some("client_credentials"));
        assert_eq!(get("client_assertion_type"), Some(CLIENT_ASSERTION_TYPE));
        assert_eq!(get("client_assertion"), Some("a.b.c"));
        assert_eq!(get("scope"), Some("system/Patient.read"));
        assert_eq!(get("udap"), Some("1"));

        let without_scope = ClientCredentialsTokenRequest {
            scope: None,
            ..request
        };
        assert!(!without_scope.form_fields().iter().any(|(k, _)| k == "scope"));
    }

    #[test]
    fn test_oauth_error_from_body() {
        let error = OAuthErrorResponse::from_body(
            400,
            r#"{"error":"invalid_client","error_description":"unknown client"}"#,
        );
        assert_eq!(error.error, "invalid_client");
        assert_eq!(error.error_description.as_deref(), Some("unknown client"));

        let error = OAuthErrorResponse::from_body(502, "Bad Gateway");
        assert_eq!(error.error, "http_502");
        assert_eq!(error.error_description.as_deref(), Some("Bad Gateway"));

        let error = OAuthErrorResponse::from_body(500, "");
        assert_eq!(error.error_description, None);
    }

    #[test]
    fn test_access_token_response() {
        let response: AccessTokenResponse = serde_json::from_str(
            r#"{"access_token":"tok","token_type":"Bearer","expires_in":300}"#,
        )
        .unwrap();
        assert_eq!(response.expires_in, Some(300));
        assert_eq!(response.scope, None);
    }
}
