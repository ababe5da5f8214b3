//! UDAP client error types.
//!
//! Every failure of a registration or token flow is terminal for that call
//! and is reported through [`UdapError`]. Variants carry the endpoint,
//! issuer or extension namespace involved so callers can act on them.

use crate::keys::CertificateError;
use crate::transport::TransportError;

/// Errors that can occur while establishing trust with an authorization
/// server, building and signing UDAP tokens, or exchanging them.
#[derive(Debug, thiserror::Error)]
pub enum UdapError {
    /// The client certificate does not carry exactly one SAN URI entry.
    #[error("Identity extraction failed: {reason}")]
    IdentityExtraction {
        /// Description of what was wrong with the certificate.
        reason: String,
    },

    /// A protocol constraint was violated (TTL ceiling, grant type
    /// combination, missing client id, ...).
    #[error("Policy violation: {message}")]
    PolicyViolation {
        /// Description of the violated constraint.
        message: String,
    },

    /// The authorization extension namespace is not known to the registry.
    #[error("Unsupported authorization extension: {namespace}")]
    UnsupportedExtension {
        /// The extension namespace (e.g. `hl7-b2b`).
        namespace: String,
    },

    /// A different payload is already attached under the same namespace.
    #[error("Authorization extension {namespace} is already attached with a different payload")]
    ExtensionConflict {
        /// The extension namespace (e.g. `hl7-b2b`).
        namespace: String,
    },

    /// The private key or certificate chain could not be loaded, or the key
    /// does not belong to the leaf certificate.
    #[error("Invalid key material: {message}")]
    InvalidKeyMaterial {
        /// Description of the problem.
        message: String,
    },

    /// An X.509 certificate could not be decoded or used.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Signing a claim set failed (key/algorithm mismatch, bad key).
    #[error("Signing failed: {message}")]
    Signing {
        /// Description of the signing error.
        message: String,
    },

    /// The signed metadata header carries no `x5c` certificate chain.
    #[error("Signed metadata has no x5c certificate chain")]
    MissingCertificateChain,

    /// The signed metadata could not be verified.
    #[error("Untrusted signed metadata: {0}")]
    UntrustedMetadata(#[from] MetadataRejection),

    /// The verified metadata does not vouch for the declared endpoints.
    #[error("Authorization server {server} is not trusted")]
    ServerNotTrusted {
        /// Base URL of the authorization server.
        server: String,
    },

    /// The UDAP discovery document could not be retrieved or parsed.
    #[error("UDAP discovery failed for {url}: {message}")]
    Discovery {
        /// The discovery URL.
        url: String,
        /// HTTP status, when the server answered.
        status: Option<u16>,
        /// Description of the failure.
        message: String,
    },

    /// The registration endpoint rejected the registration request.
    #[error("Registration failed at {endpoint} (status {status}): {error}{}", describe(.description))]
    Registration {
        /// The registration endpoint URL.
        endpoint: String,
        /// HTTP status returned by the server; a 2xx status means the reply
        /// body could not be parsed.
        status: u16,
        /// OAuth/RFC 7591 error code, or a generic summary.
        error: String,
        /// Optional error description from the server.
        description: Option<String>,
    },

    /// The token endpoint rejected the client-credentials request.
    #[error("Token request failed at {endpoint} (status {status}): {error}{}", describe(.description))]
    TokenRequest {
        /// The token endpoint URL.
        endpoint: String,
        /// HTTP status returned by the server; a 2xx status means the reply
        /// body could not be parsed.
        status: u16,
        /// OAuth error code, or a generic summary.
        error: String,
        /// Optional error description from the server.
        description: Option<String>,
    },

    /// The HTTP exchange itself failed (timeout, connection failure).
    #[error(transparent)]
    Transport(#[from] TransportError),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(" - {d}"))
        .unwrap_or_default()
}

impl UdapError {
    /// Creates a new `IdentityExtraction` error.
    #[must_use]
    pub fn identity_extraction(reason: impl Into<String>) -> Self {
        Self::IdentityExtraction {
            reason: reason.into(),
        }
    }

    /// Creates a new `PolicyViolation` error.
    #[must_use]
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedExtension` error.
    #[must_use]
    pub fn unsupported_extension(namespace: impl Into<String>) -> Self {
        Self::UnsupportedExtension {
            namespace: namespace.into(),
        }
    }

    /// Creates a new `ExtensionConflict` error.
    #[must_use]
    pub fn extension_conflict(namespace: impl Into<String>) -> Self {
        Self::ExtensionConflict {
            namespace: namespace.into(),
        }
    }

    /// Creates a new `InvalidKeyMaterial` error.
    #[must_use]
    pub fn invalid_key_material(message: impl Into<String>) -> Self {
        Self::InvalidKeyMaterial {
            message: message.into(),
        }
    }

    /// Creates a new `Signing` error.
    #[must_use]
    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    /// Creates a new `ServerNotTrusted` error.
    #[must_use]
    pub fn server_not_trusted(server: impl Into<String>) -> Self {
        Self::ServerNotTrusted {
            server: server.into(),
        }
    }

    /// Creates a new `Discovery` error.
    #[must_use]
    pub fn discovery(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Discovery {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Returns `true` if the server could not be trusted, either because its
    /// signed metadata was rejected or because its endpoints did not match.
    #[must_use]
    pub fn is_trust_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCertificateChain | Self::UntrustedMetadata(_) | Self::ServerNotTrusted { .. }
        )
    }

    /// Returns `true` if the HTTP exchange failed below the protocol layer.
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if the authorization server answered with a rejection.
    #[must_use]
    pub fn is_server_rejection(&self) -> bool {
        matches!(
            self,
            Self::Discovery { status: Some(_), .. }
                | Self::Registration { .. }
                | Self::TokenRequest { .. }
        )
    }

    /// Returns `true` if the error was raised locally before anything was
    /// sent to the authorization server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::IdentityExtraction { .. }
                | Self::PolicyViolation { .. }
                | Self::UnsupportedExtension { .. }
                | Self::ExtensionConflict { .. }
                | Self::InvalidKeyMaterial { .. }
                | Self::Certificate(_)
                | Self::Signing { .. }
        )
    }
}

/// Reasons a signed metadata token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataRejection {
    /// The discovery document has no `signed_metadata` element.
    #[error("discovery document carries no signed_metadata")]
    MissingSignedMetadata,

    /// The token is not a well-formed compact JWS.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The leaf certificate of the `x5c` chain could not be used.
    #[error("invalid x5c certificate: {0}")]
    InvalidCertificate(String),

    /// The token was signed with another algorithm than the expected one.
    #[error("algorithm mismatch: expected {expected}, got {actual}")]
    AlgorithmMismatch {
        /// The algorithm the caller expects.
        expected: String,
        /// The algorithm declared in the token header.
        actual: String,
    },

    /// The signature does not verify against the leaf certificate key.
    #[error("signature verification failed")]
    InvalidSignature,

    /// The token `exp` is in the past.
    #[error("signed metadata has expired")]
    Expired,

    /// A required claim is absent or has the wrong type.
    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// The `iss` claim is not the expected issuer.
    #[error("issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch {
        /// The issuer the caller expects.
        expected: String,
        /// The issuer found in the token.
        actual: String,
    },
}

impl MetadataRejection {
    /// Creates an `IssuerMismatch` rejection.
    #[must_use]
    pub fn issuer_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IssuerMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
