//! Authorization extensions for authentication tokens.
//!
//! UDAP authentication tokens may carry profile specific claim bundles under
//! the `extensions` claim, keyed by namespace:
//!
//! ```json
//! {
//!   "extensions": {
//!     "hl7-b2b": { "version": "1", "organization_id": "...", "purpose_of_use": ["..."] }
//!   }
//! }
//! ```
//!
//! [`ExtensionRegistry`] maps each namespace to an [`ExtensionCodec`];
//! [`attach`] encodes an extension through the registry and merges it into a
//! claim set. New profiles are supported by registering a codec.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::UdapResult;
use crate::claims::ClaimSet;
use crate::error::UdapError;

/// Name of the claim holding all authorization extensions.
pub const EXTENSIONS_CLAIM: &str = "extensions";

/// Namespace of the HL7 B2B authorization extension.
pub const HL7_B2B: &str = "hl7-b2b";

/// Namespace of the HL7 B2B user authorization extension.
pub const HL7_B2B_USER: &str = "hl7-b2b-user";

/// Extension object version supported by the HL7 profiles.
pub const HL7_EXTENSION_VERSION: &str = "1";

// =============================================================================
// Extension Payloads
// =============================================================================

/// HL7 B2B authorization extension (`hl7-b2b`).
///
/// Identifies the requesting organization and, optionally, the person on
/// whose behalf the request is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct B2bAuthorization {
    /// Extension object version; always `"1"`.
    pub version: String,

    /// Name of the person making the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,

    /// Identifier of the person making the request (e.g. NPI URI).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,

    /// Role of the person making the request (coded value).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_role: Option<String>,

    /// Name of the requesting organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,

    /// Identifier of the requesting organization (URI).
    pub organization_id: String,

    /// Purposes of use for the request (coded values).
    pub purpose_of_use: Vec<String>,

    /// Consent policies under which the request is made.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consent_policy: Vec<String>,

    /// References to consent documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consent_reference: Vec<String>,
}

impl B2bAuthorization {
    /// Creates a version 1 extension for an organization and purpose of use.
    #[must_use]
    pub fn new(organization_id: impl Into<String>, purpose_of_use: Vec<String>) -> Self {
        Self {
            version: HL7_EXTENSION_VERSION.to_string(),
            subject_name: None,
            subject_id: None,
            subject_role: None,
            organization_name: None,
            organization_id: organization_id.into(),
            purpose_of_use,
            consent_policy: Vec::new(),
            consent_reference: Vec::new(),
        }
    }

    /// Sets the organization name.
    #[must_use]
    pub fn with_organization_name(mut self, name: impl Into<String>) -> Self {
        self.organization_name = Some(name.into());
        self
    }

    /// Sets the requesting person.
    #[must_use]
    pub fn with_subject(
        mut self,
        name: impl Into<String>,
        id: Option<String>,
        role: Option<String>,
    ) -> Self {
        self.subject_name = Some(name.into());
        self.subject_id = id;
        self.subject_role = role;
        self
    }

    /// Sets the consent policies.
    #[must_use]
    pub fn with_consent_policy(mut self, policies: Vec<String>) -> Self {
        self.consent_policy = policies;
        self
    }

    /// Sets the consent references.
    #[must_use]
    pub fn with_consent_reference(mut self, references: Vec<String>) -> Self {
        self.consent_reference = references;
        self
    }

    fn validate(&self) -> UdapResult<()> {
        check_version(HL7_B2B, &self.version)?;
        if self.organization_id.trim().is_empty() {
            return Err(UdapError::policy_violation(
                "hl7-b2b extension requires organization_id",
            ));
        }
        check_purpose_of_use(HL7_B2B, &self.purpose_of_use)
    }
}

/// HL7 B2B user authorization extension (`hl7-b2b-user`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct B2bUserAuthorization {
    /// Extension object version; always `"1"`.
    pub version: String,

    /// FHIR Person resource describing the user.
    pub user_person: Value,

    /// Purposes of use for the request (coded values).
    pub purpose_of_use: Vec<String>,

    /// Consent policies under which the request is made.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consent_policy: Vec<String>,

    /// References to consent documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consent_reference: Vec<String>,
}

impl B2bUserAuthorization {
    /// Creates a version 1 extension for a user and purpose of use.
    #[must_use]
    pub fn new(user_person: Value, purpose_of_use: Vec<String>) -> Self {
        Self {
            version: HL7_EXTENSION_VERSION.to_string(),
            user_person,
            purpose_of_use,
            consent_policy: Vec::new(),
            consent_reference: Vec::new(),
        }
    }

    fn validate(&self) -> UdapResult<()> {
        check_version(HL7_B2B_USER, &self.version)?;
        if !self.user_person.is_object() {
            return Err(UdapError::policy_violation(
                "hl7-b2b-user extension requires a user_person resource",
            ));
        }
        check_purpose_of_use(HL7_B2B_USER, &self.purpose_of_use)
    }
}

fn check_version(namespace: &str, version: &str) -> UdapResult<()> {
    if version == HL7_EXTENSION_VERSION {
        Ok(())
    } else {
        Err(UdapError::policy_violation(format!(
            "{namespace} extension version must be \"{HL7_EXTENSION_VERSION}\", got \"{version}\""
        )))
    }
}

fn check_purpose_of_use(namespace: &str, purpose_of_use: &[String]) -> UdapResult<()> {
    if purpose_of_use.iter().any(|p| !p.trim().is_empty()) {
        Ok(())
    } else {
        Err(UdapError::policy_violation(format!(
            "{namespace} extension requires at least one purpose_of_use"
        )))
    }
}

/// An authorization extension to attach to an authentication token.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorizationExtension {
    /// HL7 B2B extension.
    Hl7B2b(B2bAuthorization),
    /// HL7 B2B user extension.
    Hl7B2bUser(B2bUserAuthorization),
    /// Any other profile; needs a codec registered for `namespace`.
    Custom {
        /// Extension namespace.
        namespace: String,
        /// Extension object.
        payload: Value,
    },
}

impl AuthorizationExtension {
    /// Creates a custom extension.
    #[must_use]
    pub fn custom(namespace: impl Into<String>, payload: Value) -> Self {
        Self::Custom {
            namespace: namespace.into(),
            payload,
        }
    }

    /// Returns the namespace the extension is attached under.
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Hl7B2b(_) => HL7_B2B,
            Self::Hl7B2bUser(_) => HL7_B2B_USER,
            Self::Custom { namespace, .. } => namespace,
        }
    }
}

impl From<B2bAuthorization> for AuthorizationExtension {
    fn from(extension: B2bAuthorization) -> Self {
        Self::Hl7B2b(extension)
    }
}

impl From<B2bUserAuthorization> for AuthorizationExtension {
    fn from(extension: B2bUserAuthorization) -> Self {
        Self::Hl7B2bUser(extension)
    }
}

// =============================================================================
// Codecs
// =============================================================================

/// Converts one extension profile to and from its JSON claim value.
pub trait ExtensionCodec: Send + Sync {
    /// Encodes the extension as the value stored under its namespace.
    ///
    /// # Errors
    ///
    /// Returns `PolicyViolation` if the payload is not valid for the profile.
    fn encode(&self, extension: &AuthorizationExtension) -> UdapResult<Value>;

    /// Decodes a value found under the codec's namespace.
    ///
    /// # Errors
    ///
    /// Returns `PolicyViolation` if the value is not valid for the profile.
    fn decode(&self, namespace: &str, value: &Value) -> UdapResult<AuthorizationExtension>;
}

/// Codec for [`AuthorizationExtension::Hl7B2b`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Hl7B2bCodec;

impl ExtensionCodec for Hl7B2bCodec {
    fn encode(&self, extension: &AuthorizationExtension) -> UdapResult<Value> {
        let b2b = match extension {
            AuthorizationExtension::Hl7B2b(b2b) => b2b.clone(),
            AuthorizationExtension::Custom { payload, .. } => parse_payload(HL7_B2B, payload)?,
            other => return Err(codec_mismatch(HL7_B2B, other)),
        };
        b2b.validate()?;
        to_value(HL7_B2B, &b2b)
    }

    fn decode(&self, _namespace: &str, value: &Value) -> UdapResult<AuthorizationExtension> {
        let b2b: B2bAuthorization = parse_payload(HL7_B2B, value)?;
        b2b.validate()?;
        Ok(AuthorizationExtension::Hl7B2b(b2b))
    }
}

/// Codec for [`AuthorizationExtension::Hl7B2bUser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Hl7B2bUserCodec;

impl ExtensionCodec for Hl7B2bUserCodec {
    fn encode(&self, extension: &AuthorizationExtension) -> UdapResult<Value> {
        let user = match extension {
            AuthorizationExtension::Hl7B2bUser(user) => user.clone(),
            AuthorizationExtension::Custom { payload, .. } => {
                parse_payload(HL7_B2B_USER, payload)?
            }
            other => return Err(codec_mismatch(HL7_B2B_USER, other)),
        };
        user.validate()?;
        to_value(HL7_B2B_USER, &user)
    }

    fn decode(&self, _namespace: &str, value: &Value) -> UdapResult<AuthorizationExtension> {
        let user: B2bUserAuthorization = parse_payload(HL7_B2B_USER, value)?;
        user.validate()?;
        Ok(AuthorizationExtension::Hl7B2bUser(user))
    }
}

/// Codec that accepts any JSON object unchanged.
///
/// Register it for profiles that need no validation on the client side.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonObjectCodec;

impl ExtensionCodec for JsonObjectCodec {
    fn encode(&self, extension: &AuthorizationExtension) -> UdapResult<Value> {
        match extension {
            AuthorizationExtension::Custom { namespace, payload } => {
                if payload.is_object() {
                    Ok(payload.clone())
                } else {
                    Err(UdapError::policy_violation(format!(
                        "{namespace} extension must be a JSON object"
                    )))
                }
            }
            other => Err(codec_mismatch("custom", other)),
        }
    }

    fn decode(&self, namespace: &str, value: &Value) -> UdapResult<AuthorizationExtension> {
        if value.is_object() {
            Ok(AuthorizationExtension::custom(namespace, value.clone()))
        } else {
            Err(UdapError::policy_violation(format!(
                "{namespace} extension must be a JSON object"
            )))
        }
    }
}

fn parse_payload<T: DeserializeOwned>(namespace: &str, value: &Value) -> UdapResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| {
        UdapError::policy_violation(format!("invalid {namespace} extension: {e}"))
    })
}

fn to_value<T: Serialize>(namespace: &str, payload: &T) -> UdapResult<Value> {
    serde_json::to_value(payload).map_err(|e| {
        UdapError::policy_violation(format!("failed to encode {namespace} extension: {e}"))
    })
}

fn codec_mismatch(codec: &str, extension: &AuthorizationExtension) -> UdapError {
    UdapError::policy_violation(format!(
        "{codec} codec cannot encode a {} extension",
        extension.namespace()
    ))
}

// =============================================================================
// Registry
// =============================================================================

/// Maps extension namespaces to codecs.
///
/// The default registry knows `hl7-b2b` and `hl7-b2b-user`.
#[derive(Clone)]
pub struct ExtensionRegistry {
    codecs: HashMap<String, Arc<dyn ExtensionCodec>>,
}

impl ExtensionRegistry {
    /// Creates a registry without any codec.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Registers (or replaces) the codec for a namespace.
    pub fn register(&mut self, namespace: impl Into<String>, codec: impl ExtensionCodec + 'static) {
        self.codecs.insert(namespace.into(), Arc::new(codec));
    }

    /// Builder variant of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, namespace: impl Into<String>, codec: impl ExtensionCodec + 'static) -> Self {
        self.register(namespace, codec);
        self
    }

    /// Returns `true` if a codec is registered for the namespace.
    #[must_use]
    pub fn contains(&self, namespace: &str) -> bool {
        self.codecs.contains_key(namespace)
    }

    /// Returns the registered namespaces, sorted.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        namespaces.sort_unstable();
        namespaces
    }

    fn codec(&self, namespace: &str) -> UdapResult<&dyn ExtensionCodec> {
        self.codecs
            .get(namespace)
            .map(|codec| codec.as_ref())
            .ok_or_else(|| UdapError::unsupported_extension(namespace))
    }

    /// Encodes an extension with the codec registered for its namespace.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedExtension` for unknown namespaces and
    /// `PolicyViolation` for invalid payloads.
    pub fn encode(&self, extension: &AuthorizationExtension) -> UdapResult<Value> {
        self.codec(extension.namespace())?.encode(extension)
    }

    /// Decodes every extension found in the `extensions` claim.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedExtension` if a namespace has no codec, and
    /// `PolicyViolation` if the claim or a payload is malformed.
    pub fn decode_all(&self, claims: &ClaimSet) -> UdapResult<Vec<AuthorizationExtension>> {
        let Some(extensions) = claims.get(EXTENSIONS_CLAIM) else {
            return Ok(Vec::new());
        };
        let extensions = extensions.as_object().ok_or_else(|| {
            UdapError::policy_violation("extensions claim must be a JSON object")
        })?;

        extensions
            .iter()
            .map(|(namespace, value)| self.codec(namespace)?.decode(namespace, value))
            .collect()
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::empty()
            .with(HL7_B2B, Hl7B2bCodec)
            .with(HL7_B2B_USER, Hl7B2bUserCodec)
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("namespaces", &self.namespaces())
            .finish()
    }
}

// =============================================================================
// Attach
// =============================================================================

/// Attaches an extension to a claim set under `extensions.<namespace>`.
///
/// Entries for other namespaces are kept. Attaching a payload equal to the
/// one already present is a no-op.
///
/// # Errors
///
/// - `UnsupportedExtension` if no codec is registered for the namespace
/// - `ExtensionConflict` if a different payload is already attached under
///   the same namespace
/// - `PolicyViolation` if the payload is invalid or the existing
///   `extensions` claim is not an object
pub fn attach(
    mut claims: ClaimSet,
    extension: &AuthorizationExtension,
    registry: &ExtensionRegistry,
) -> UdapResult<ClaimSet> {
    let namespace = extension.namespace();
    let encoded = registry.encode(extension)?;

    let entry = claims
        .as_map_mut()
        .entry(EXTENSIONS_CLAIM)
        .or_insert_with(|| Value::Object(Map::new()));
    let extensions = entry
        .as_object_mut()
        .ok_or_else(|| UdapError::policy_violation("extensions claim must be a JSON object"))?;

    match extensions.get(namespace) {
        Some(existing) if *existing == encoded => {
            tracing::debug!(namespace, "extension already attached");
        }
        Some(_) => return Err(UdapError::extension_conflict(namespace)),
        None => {
            extensions.insert(namespace.to_string(), encoded);
            tracing::debug!(namespace, "attached authorization extension");
        }
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn b2b() -> B2bAuthorization {
        B2bAuthorization::new(
            "https://client.example/org/123",
            vec!["urn:oid:2.16.840.1.113883.5.8#TREAT".to_string()],
        )
        .with_organization_name("Example Clinic")
    }

    fn base_claims() -> ClaimSet {
        let mut claims = ClaimSet::new();
        claims.insert("iss", "client-1");
        claims
    }

    #[test]
    fn test_attach_hl7_b2b() {
        let registry = ExtensionRegistry::default();
        let claims = attach(base_claims(), &b2b().into(), &registry).unwrap();

        let extension = &claims.get(EXTENSIONS_CLAIM).unwrap()[HL7_B2B];
        assert_eq!(extension["version"], "1");
        assert_eq!(extension["organization_id"], "https://client.example/org/123");
        assert_eq!(extension["organization_name"], "Example Clinic");
        assert_eq!(
            extension["purpose_of_use"],
            json!(["urn:oid:2.16.840.1.113883.5.8#TREAT"])
        );
        assert!(extension.get("subject_name").is_none());
        assert!(extension.get("consent_policy").is_none());
        assert_eq!(claims.get_str("iss"), Some("client-1"));
    }

    #[test]
    fn test_attach_is_deterministic() {
        let registry = ExtensionRegistry::default();
        let first = attach(base_claims(), &b2b().into(), &registry).unwrap();
        let second = attach(base_claims(), &b2b().into(), &registry).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reattach_equal_payload_is_noop() {
        let registry = ExtensionRegistry::default();
        let once = attach(base_claims(), &b2b().into(), &registry).unwrap();
        let twice = attach(once.clone(), &b2b().into(), &registry).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_conflicting_payload_rejected() {
        let registry = ExtensionRegistry::default();
        let claims = attach(base_claims(), &b2b().into(), &registry).unwrap();

        let other = B2bAuthorization::new(
            "https://client.example/org/999",
            vec!["urn:oid:2.16.840.1.113883.5.8#TREAT".to_string()],
        );
        let err = attach(claims, &other.into(), &registry).unwrap_err();
        assert!(matches!(err, UdapError::ExtensionConflict { ref namespace } if namespace == HL7_B2B));
    }

    #[test]
    fn test_extensions_merge_alongside() {
        let registry = ExtensionRegistry::default().with("tefca-ias", JsonObjectCodec);
        let user = B2bUserAuthorization::new(
            json!({"resourceType": "Person", "name": [{"text": "Dr. Example"}]}),
            vec!["urn:oid:2.16.840.1.113883.5.8#TREAT".to_string()],
        );

        let claims = attach(base_claims(), &b2b().into(), &registry).unwrap();
        let claims = attach(claims, &user.into(), &registry).unwrap();
        let claims = attach(
            claims,
            &AuthorizationExtension::custom("tefca-ias", json!({"version": "1"})),
            &registry,
        )
        .unwrap();

        let extensions = claims.get(EXTENSIONS_CLAIM).unwrap().as_object().unwrap();
        assert_eq!(extensions.len(), 3);
        assert!(extensions.contains_key(HL7_B2B));
        assert!(extensions.contains_key(HL7_B2B_USER));
        assert_eq!(extensions["tefca-ias"], json!({"version": "1"}));

        let decoded = registry.decode_all(&claims).unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(decoded.contains(&AuthorizationExtension::Hl7B2b(b2b())));
    }

    #[test]
    fn test_unknown_namespace_rejected() {
        let registry = ExtensionRegistry::default();
        let err = attach(
            base_claims(),
            &AuthorizationExtension::custom("tefca-ias", json!({})),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, UdapError::UnsupportedExtension { ref namespace } if namespace == "tefca-ias"));
    }

    #[test]
    fn test_invalid_b2b_payload_rejected() {
        let registry = ExtensionRegistry::default();

        let mut wrong_version = b2b();
        wrong_version.version = "2".to_string();
        let err = attach(base_claims(), &wrong_version.into(), &registry).unwrap_err();
        assert!(err.to_string().contains("version"));

        let no_purpose = B2bAuthorization::new("https://client.example/org/123", vec![]);
        let err = attach(base_claims(), &no_purpose.into(), &registry).unwrap_err();
        assert!(err.to_string().contains("purpose_of_use"));

        let no_org = B2bAuthorization::new("", vec!["TREAT".to_string()]);
        assert!(attach(base_claims(), &no_org.into(), &registry).is_err());
    }

    #[test]
    fn test_custom_payload_under_builtin_namespace_is_validated() {
        let registry = ExtensionRegistry::default();
        let custom = AuthorizationExtension::custom(
            HL7_B2B,
            json!({
                "version": "1",
                "organization_id": "https://client.example/org/123",
                "purpose_of_use": ["TREAT"]
            }),
        );
        let claims = attach(base_claims(), &custom, &registry).unwrap();
        assert_eq!(
            registry.decode_all(&claims).unwrap(),
            vec![AuthorizationExtension::Hl7B2b(B2bAuthorization::new(
                "https://client.example/org/123",
                vec!["TREAT".to_string()]
            ))]
        );

        let invalid = AuthorizationExtension::custom(HL7_B2B, json!({"version": "1"}));
        assert!(attach(base_claims(), &invalid, &registry).is_err());
    }

    #[test]
    fn test_non_object_extensions_claim_rejected() {
        let registry = ExtensionRegistry::default();
        let mut claims = base_claims();
        claims.insert(EXTENSIONS_CLAIM, "oops");

        let err = attach(claims, &b2b().into(), &registry).unwrap_err();
        assert!(matches!(err, UdapError::PolicyViolation { .. }));
    }

    #[test]
    fn test_registry_namespaces() {
        let registry = ExtensionRegistry::default();
        assert_eq!(registry.namespaces(), vec![HL7_B2B, HL7_B2B_USER]);
        assert!(!ExtensionRegistry::empty().contains(HL7_B2B));

        let registry = registry.with("tefca-ias", JsonObjectCodec);
        assert!(registry.contains("tefca-ias"));
    }
}
