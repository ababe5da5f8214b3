//! UDAP client for OctoFHIR.
//!
//! Implements the client side of the UDAP (Unified Data Access Profiles)
//! trust and authentication protocol used by health data applications:
//!
//! - Verification of an authorization server's signed metadata against the
//!   certificate in its `x5c` header ([`trust`])
//! - Software statements for trusted dynamic client registration
//!   ([`claims`], [`signer`])
//! - Authentication tokens for the client credentials grant, with pluggable
//!   authorization extensions such as HL7 B2B ([`extensions`])
//! - Registration and token orchestration ([`client`])
//!
//! # Example
//!
//! ```ignore
//! use octofhir_udap::{AuthorizationServer, B2bAuthorization, UdapClient};
//!
//! let client = UdapClient::with_defaults()?;
//! let server = AuthorizationServer::new("https://fhir.example.com/r4".parse()?);
//!
//! let b2b = B2bAuthorization::new("https://client.example/org/123", vec!["TREAT".into()]);
//! let token = client
//!     .access_token(&identity, &keys, &server, None, &[b2b.into()])
//!     .await?;
//! ```
//!
//! # References
//!
//! - [UDAP Security for Scalable Registration, Authentication, and Authorization](https://hl7.org/fhir/us/udap-security/)
//! - [UDAP Dynamic Client Registration](https://www.udap.org/udap-dynamic-client-registration.html)

pub mod claims;
pub mod client;
pub mod error;
pub mod extensions;
pub mod identity;
pub mod keys;
pub mod model;
pub mod signer;
pub mod transport;
pub mod trust;

#[cfg(test)]
mod test_support;

pub use claims::{ClaimSet, build_authentication_token, build_software_statement};
pub use client::{AuthorizationServer, UdapClient};
pub use error::{MetadataRejection, UdapError};
pub use extensions::{
    AuthorizationExtension, B2bAuthorization, B2bUserAuthorization, ExtensionCodec,
    ExtensionRegistry, attach,
};
pub use identity::{ClientIdentity, GrantType, MAX_TOKEN_LIFETIME};
pub use keys::{CertificateError, ClientKeyMaterial, KeyKind, UdapCertificate};
pub use model::{AccessTokenResponse, RegistrationResponse, ServerMetadata};
pub use signer::{SignedToken, SigningAlgorithm, sign};
pub use transport::{ReqwestTransport, TransportError, TransportResponse, UdapTransport};
pub use trust::{
    EndpointMatch, TrustDecision, TrustPolicy, TrustReason, VerifiedClaims, evaluate, is_trusted,
    is_trusted_with, verify_signed_metadata,
};

/// Result type for UDAP operations.
pub type UdapResult<T> = Result<T, UdapError>;
