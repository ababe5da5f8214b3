//! UDAP registration and token flows.
//!
//! [`UdapClient`] drives the two UDAP client flows against an
//! [`AuthorizationServer`]:
//!
//! - **Trusted dynamic client registration**: discovery, trust decision,
//!   signed software statement, `POST` to the registration endpoint.
//! - **Client credentials token request**: discovery, trust decision,
//!   signed authentication token with optional authorization extensions,
//!   `POST` to the token endpoint.
//!
//! The client holds no identity, key or metadata state. Discovery runs on
//! every call, so a server's metadata is never cached.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_udap::{AuthorizationServer, ClientIdentity, ClientKeyMaterial, GrantType, UdapClient};
//! use url::Url;
//!
//! let client = UdapClient::with_defaults()?;
//! let server = AuthorizationServer::new(Url::parse("https://fhir.example.com/r4")?);
//! let keys = ClientKeyMaterial::from_pem(&key_pem, &chain_pem)?;
//!
//! let identity = ClientIdentity::new("My B2B App", vec![GrantType::ClientCredentials])
//!     .with_scopes(vec!["system/Patient.read".into()]);
//! let registration = client.register(&identity, &keys, &server, "1").await?;
//!
//! let identity = identity.with_client_id(registration.client_id);
//! let token = client.access_token(&identity, &keys, &server, None, &[]).await?;
//! ```

use time::OffsetDateTime;
use url::Url;

use crate::UdapResult;
use crate::claims::{build_authentication_token, build_software_statement};
use crate::error::UdapError;
use crate::extensions::{AuthorizationExtension, ExtensionRegistry, attach};
use crate::identity::{ClientIdentity, GrantType};
use crate::keys::ClientKeyMaterial;
use crate::model::{
    AccessTokenResponse, ClientCredentialsTokenRequest, DEFAULT_UDAP_VERSION, OAuthErrorResponse,
    RegistrationRequest, RegistrationResponse, ServerMetadata, WELL_KNOWN_UDAP_PATH,
};
use crate::signer::{SigningAlgorithm, sign};
use crate::transport::{ReqwestTransport, TransportResponse, UdapTransport};
use crate::trust::{EndpointMatch, TrustDecision, TrustPolicy, evaluate};

// =============================================================================
// Authorization Server
// =============================================================================

/// An authorization server and how far it is to be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationServer {
    /// FHIR base URL; discovery is at `{base_url}/.well-known/udap`.
    pub base_url: Url,

    /// Expected `iss` of the signed metadata.
    pub expected_issuer: String,

    /// Whether signed metadata must verify.
    pub trust_policy: TrustPolicy,

    /// How signed and declared endpoints must agree.
    pub endpoint_match: EndpointMatch,

    /// Algorithm the server signs its metadata with.
    pub metadata_algorithm: SigningAlgorithm,
}

impl AuthorizationServer {
    /// Creates a server whose signed metadata is expected to be issued by
    /// its base URL.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        let expected_issuer = base_url.as_str().trim_end_matches('/').to_string();
        Self {
            base_url,
            expected_issuer,
            trust_policy: TrustPolicy::Required,
            endpoint_match: EndpointMatch::Any,
            metadata_algorithm: SigningAlgorithm::RS256,
        }
    }

    /// Sets the expected issuer.
    #[must_use]
    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = issuer.into();
        self
    }

    /// Sets the trust policy.
    #[must_use]
    pub fn with_trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = policy;
        self
    }

    /// Sets the endpoint match rule.
    #[must_use]
    pub fn with_endpoint_match(mut self, rule: EndpointMatch) -> Self {
        self.endpoint_match = rule;
        self
    }

    /// Sets the metadata signing algorithm.
    #[must_use]
    pub fn with_metadata_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.metadata_algorithm = algorithm;
        self
    }

    /// Returns the UDAP discovery URL.
    #[must_use]
    pub fn discovery_url(&self) -> Url {
        let mut url = self.base_url.clone();
        let path = self.base_url.path().trim_end_matches('/');
        url.set_path(&format!("{path}/{WELL_KNOWN_UDAP_PATH}"));
        url
    }
}

// =============================================================================
// Client
// =============================================================================

/// Stateless driver of the UDAP registration and token flows.
///
/// `UdapClient` is `Send + Sync` when its transport is, and can be shared
/// across tasks.
#[derive(Debug, Clone)]
pub struct UdapClient<T = ReqwestTransport> {
    transport: T,
    signing_algorithm: SigningAlgorithm,
    registry: ExtensionRegistry,
}

impl UdapClient<ReqwestTransport> {
    /// Creates a client with the default reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns `UdapError::Transport` if the HTTP client cannot be created.
    pub fn with_defaults() -> UdapResult<Self> {
        Ok(Self::new(ReqwestTransport::new()?))
    }
}

impl<T: UdapTransport> UdapClient<T> {
    /// Creates a client over the given transport, signing with RS256 and
    /// using the default extension registry.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            signing_algorithm: SigningAlgorithm::RS256,
            registry: ExtensionRegistry::default(),
        }
    }

    /// Sets the algorithm for software statements and authentication tokens.
    #[must_use]
    pub fn with_signing_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.signing_algorithm = algorithm;
        self
    }

    /// Replaces the extension registry.
    #[must_use]
    pub fn with_extension_registry(mut self, registry: ExtensionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Returns the signing algorithm.
    #[must_use]
    pub fn signing_algorithm(&self) -> SigningAlgorithm {
        self.signing_algorithm
    }

    /// Returns the extension registry.
    #[must_use]
    pub fn extension_registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Fetches the UDAP discovery document.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the request fails, and `Discovery` for non-2xx
    /// responses or unparseable bodies.
    pub async fn fetch_metadata(&self, server: &AuthorizationServer) -> UdapResult<ServerMetadata> {
        let url = server.discovery_url();
        let response = self.transport.get(url.as_str()).await?;

        if !response.is_success() {
            tracing::warn!(url = %url, status = response.status, "UDAP discovery failed");
            return Err(UdapError::discovery(
                url.as_str(),
                Some(response.status),
                format!("unexpected status {}", response.status),
            ));
        }

        let metadata: ServerMetadata = serde_json::from_str(&response.body).map_err(|e| {
            tracing::warn!(url = %url, error = %e, "failed to parse UDAP discovery document");
            UdapError::discovery(url.as_str(), None, format!("invalid discovery document: {e}"))
        })?;

        tracing::debug!(url = %url, "fetched UDAP discovery document");
        Ok(metadata)
    }

    /// Fetches the discovery document and evaluates it against the server's
    /// trust policy.
    ///
    /// # Errors
    ///
    /// Returns discovery errors, and the verification errors of
    /// [`evaluate`] when the trust policy is `Required`.
    pub async fn evaluate_trust(
        &self,
        server: &AuthorizationServer,
    ) -> UdapResult<(ServerMetadata, TrustDecision)> {
        let metadata = self.fetch_metadata(server).await?;
        let decision = evaluate(
            &metadata,
            &server.expected_issuer,
            server.trust_policy,
            server.endpoint_match,
            server.metadata_algorithm,
        )?;
        Ok((metadata, decision))
    }

    async fn trusted_metadata(&self, server: &AuthorizationServer) -> UdapResult<ServerMetadata> {
        let (metadata, decision) = self.evaluate_trust(server).await?;
        if !decision.trusted {
            return Err(UdapError::server_not_trusted(server.base_url.as_str()));
        }
        Ok(metadata)
    }

    /// Registers a client with the server's registration endpoint.
    ///
    /// # Arguments
    /// * `identity` - client profile to register
    /// * `keys` - client private key and certificate chain
    /// * `server` - target server and trust settings
    /// * `udap_version` - value of the `udap` request parameter
    ///
    /// # Errors
    ///
    /// - `PolicyViolation` if the identity is invalid (checked before any
    ///   request is sent)
    /// - discovery and trust errors; `ServerNotTrusted` if the endpoints do
    ///   not match (no registration request is sent)
    /// - `IdentityExtraction` / `Signing` while building the software
    ///   statement
    /// - `Registration` if the server rejects the request
    pub async fn register(
        &self,
        identity: &ClientIdentity,
        keys: &ClientKeyMaterial,
        server: &AuthorizationServer,
        udap_version: &str,
    ) -> UdapResult<RegistrationResponse> {
        identity.validate()?;

        let metadata = self.trusted_metadata(server).await?;
        let endpoint = require_endpoint(
            server,
            metadata.registration_endpoint.as_deref(),
            "registration_endpoint",
        )?;

        let claims = build_software_statement(
            identity,
            keys.certificate(),
            endpoint,
            OffsetDateTime::now_utc(),
        )?;
        let software_statement = sign(&claims, keys, self.signing_algorithm)?;

        let request = RegistrationRequest {
            software_statement: software_statement.into_string(),
            certifications: identity.certifications.clone(),
            udap: udap_version.to_string(),
        };
        let body = serde_json::to_value(&request).map_err(|e| {
            UdapError::policy_violation(format!("cannot encode registration request: {e}"))
        })?;

        tracing::debug!(endpoint, client_name = %identity.client_name, "submitting registration");
        let response = self.transport.post_json(endpoint, &body).await?;

        if !response.is_success() {
            return Err(rejection(&response, |error| UdapError::Registration {
                endpoint: endpoint.to_string(),
                status: response.status,
                error: error.error,
                description: error.error_description,
            }));
        }

        let registration: RegistrationResponse =
            serde_json::from_str(&response.body).map_err(|e| UdapError::Registration {
                endpoint: endpoint.to_string(),
                status: response.status,
                error: "invalid_response".to_string(),
                description: Some(e.to_string()),
            })?;

        tracing::info!(
            endpoint,
            client_id = %registration.client_id,
            "client registered"
        );

        Ok(registration)
    }

    /// Registers a client with the default UDAP version (`"1"`).
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub async fn register_default(
        &self,
        identity: &ClientIdentity,
        keys: &ClientKeyMaterial,
        server: &AuthorizationServer,
    ) -> UdapResult<RegistrationResponse> {
        self.register(identity, keys, server, DEFAULT_UDAP_VERSION)
            .await
    }

    /// Requests an access token with the client credentials grant.
    ///
    /// # Arguments
    /// * `identity` - registered client profile (must carry a client id)
    /// * `keys` - client private key and certificate chain
    /// * `server` - target server and trust settings
    /// * `scope` - requested scope; defaults to the identity's scopes
    /// * `extensions` - authorization extensions, attached in order
    ///
    /// # Errors
    ///
    /// - `PolicyViolation` if the identity is invalid, is not a client
    ///   credentials client, or has no client id
    /// - discovery and trust errors; `ServerNotTrusted` if the endpoints do
    ///   not match (no token request is sent)
    /// - `UnsupportedExtension` / `ExtensionConflict` while attaching
    ///   extensions
    /// - `TokenRequest` if the server rejects the request
    pub async fn access_token(
        &self,
        identity: &ClientIdentity,
        keys: &ClientKeyMaterial,
        server: &AuthorizationServer,
        scope: Option<&str>,
        extensions: &[AuthorizationExtension],
    ) -> UdapResult<AccessTokenResponse> {
        identity.validate()?;
        if !identity.grant_types.contains(&GrantType::ClientCredentials) {
            return Err(UdapError::policy_violation(format!(
                "client {} is not registered for the client_credentials grant",
                identity.client_name
            )));
        }
        if identity.client_id.is_none() {
            return Err(UdapError::policy_violation(format!(
                "client {} has no client_id; register it first",
                identity.client_name
            )));
        }

        let metadata = self.trusted_metadata(server).await?;
        let endpoint =
            require_endpoint(server, metadata.token_endpoint.as_deref(), "token_endpoint")?;
        if !metadata.supports_grant_type(GrantType::ClientCredentials) {
            tracing::warn!(
                endpoint,
                advertised = ?metadata.grant_types_supported,
                "server does not advertise the client_credentials grant"
            );
        }

        let mut claims = build_authentication_token(identity, endpoint, OffsetDateTime::now_utc())?;
        for extension in extensions {
            claims = attach(claims, extension, &self.registry)?;
        }

        let supplied: Vec<&str> = extensions.iter().map(|e| e.namespace()).collect();
        let missing = metadata.missing_required_extensions(&supplied);
        if !missing.is_empty() {
            tracing::warn!(
                endpoint,
                missing = ?missing,
                "server requires authorization extensions that were not supplied"
            );
        }

        let assertion = sign(&claims, keys, self.signing_algorithm)?;
        let request = ClientCredentialsTokenRequest {
            client_assertion: assertion.into_string(),
            scope: scope.map(str::to_string).or_else(|| identity.scope_string()),
            udap: DEFAULT_UDAP_VERSION.to_string(),
        };

        tracing::debug!(endpoint, scope = ?request.scope, "requesting access token");
        let response = self
            .transport
            .post_form(endpoint, &request.form_fields())
            .await?;

        if !response.is_success() {
            return Err(rejection(&response, |error| UdapError::TokenRequest {
                endpoint: endpoint.to_string(),
                status: response.status,
                error: error.error,
                description: error.error_description,
            }));
        }

        let token: AccessTokenResponse =
            serde_json::from_str(&response.body).map_err(|e| UdapError::TokenRequest {
                endpoint: endpoint.to_string(),
                status: response.status,
                error: "invalid_response".to_string(),
                description: Some(e.to_string()),
            })?;

        tracing::info!(
            endpoint,
            token_type = %token.token_type,
            expires_in = ?token.expires_in,
            "access token issued"
        );

        Ok(token)
    }
}

fn require_endpoint<'a>(
    server: &AuthorizationServer,
    endpoint: Option<&'a str>,
    name: &str,
) -> UdapResult<&'a str> {
    endpoint.ok_or_else(|| {
        UdapError::discovery(
            server.discovery_url().as_str(),
            None,
            format!("discovery document has no {name}"),
        )
    })
}

fn rejection(
    response: &TransportResponse,
    into_error: impl FnOnce(OAuthErrorResponse) -> UdapError,
) -> UdapError {
    let error = OAuthErrorResponse::from_body(response.status, &response.body);
    tracing::warn!(
        status = response.status,
        error = %error.error,
        description = ?error.error_description,
        "authorization server rejected the request"
    );
    into_error(error)
}
