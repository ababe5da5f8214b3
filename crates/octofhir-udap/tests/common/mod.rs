//! Shared fixtures for UDAP integration tests.
#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use octofhir_udap::{
    AuthorizationServer, ClaimSet, ClientIdentity, ClientKeyMaterial, GrantType, SigningAlgorithm,
    sign,
};
use serde_json::{Value, json};
use time::OffsetDateTime;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CLIENT_KEY: &str = include_str!("../fixtures/client.key.pem");
pub const CLIENT_CERT: &str = include_str!("../fixtures/client.cert.pem");
pub const SERVER_KEY: &str = include_str!("../fixtures/server.key.pem");
pub const SERVER_CERT: &str = include_str!("../fixtures/server.cert.pem");

pub const CLIENT_SAN: &str = "https://client.example/org/123";

pub fn client_keys() -> ClientKeyMaterial {
    ClientKeyMaterial::from_pem(CLIENT_KEY, CLIENT_CERT).expect("client key material")
}

pub fn server_keys() -> ClientKeyMaterial {
    ClientKeyMaterial::from_pem(SERVER_KEY, SERVER_CERT).expect("server key material")
}

pub fn b2b_identity() -> ClientIdentity {
    ClientIdentity::new("Integration B2B Client", vec![GrantType::ClientCredentials])
        .with_contacts(vec!["mailto:ops@client.example".to_string()])
        .with_scopes(vec!["system/Patient.read".to_string()])
}

/// Endpoints as declared by a mock authorization server.
pub struct Endpoints {
    pub issuer: String,
    pub token: String,
    pub registration: String,
}

impl Endpoints {
    pub fn of(server: &MockServer) -> Self {
        let issuer = server.uri();
        Self {
            token: format!("{issuer}/token"),
            registration: format!("{issuer}/register"),
            issuer,
        }
    }
}

pub fn authorization_server(server: &MockServer) -> AuthorizationServer {
    AuthorizationServer::new(Url::parse(&server.uri()).expect("mock server url"))
}

/// Signs metadata claims with the server key.
pub fn signed_metadata(issuer: &str, token_endpoint: &str, registration_endpoint: &str) -> String {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut claims = ClaimSet::new();
    claims.insert("iss", issuer);
    claims.insert("sub", issuer);
    claims.insert("iat", now);
    claims.insert("exp", now + 300);
    claims.insert("jti", uuid::Uuid::new_v4().to_string());
    claims.insert("token_endpoint", token_endpoint);
    claims.insert("registration_endpoint", registration_endpoint);

    sign(&claims, &server_keys(), SigningAlgorithm::RS256)
        .expect("sign metadata")
        .into_string()
}

pub fn discovery_document(endpoints: &Endpoints, signed_metadata: &str) -> Value {
    json!({
        "udap_versions_supported": ["1"],
        "udap_profiles_supported": ["udap_dcr", "udap_authn", "udap_authz"],
        "udap_authorization_extensions_supported": ["hl7-b2b"],
        "udap_authorization_extensions_required": ["hl7-b2b"],
        "udap_certifications_supported": [],
        "udap_certifications_required": [],
        "grant_types_supported": ["client_credentials"],
        "token_endpoint": endpoints.token,
        "token_endpoint_auth_methods_supported": ["private_key_jwt"],
        "token_endpoint_auth_signing_alg_values_supported": ["RS256"],
        "registration_endpoint": endpoints.registration,
        "registration_endpoint_jwt_signing_alg_values_supported": ["RS256"],
        "signed_metadata": signed_metadata
    })
}

pub async fn mount_discovery(server: &MockServer, document: Value) {
    Mock::given(method("GET"))
        .and(path("/.well-known/udap"))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(server)
        .await;
}

/// Mounts a discovery document whose signed endpoints match the declared ones.
pub async fn mount_trusted_discovery(server: &MockServer) -> Endpoints {
    let endpoints = Endpoints::of(server);
    let signed = signed_metadata(&endpoints.issuer, &endpoints.token, &endpoints.registration);
    mount_discovery(server, discovery_document(&endpoints, &signed)).await;
    endpoints
}

/// Decodes the payload of a compact JWS without verifying it.
pub fn jwt_payload(token: &str) -> ClaimSet {
    let payload = token.split('.').nth(1).expect("jwt payload segment");
    let bytes = URL_SAFE_NO_PAD.decode(payload).expect("base64url payload");
    serde_json::from_slice(&bytes).expect("json payload")
}

/// Returns the bodies of the requests received at `request_path`.
pub async fn received_bodies(server: &MockServer, request_path: &str) -> Vec<Vec<u8>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.url.path() == request_path)
        .map(|request| request.body)
        .collect()
}
