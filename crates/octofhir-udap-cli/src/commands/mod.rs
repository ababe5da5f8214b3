pub mod metadata;
pub mod register;
pub mod token;

use anyhow::{Result, bail};
use octofhir_udap::{
    AuthorizationServer, EndpointMatch, ReqwestTransport, TrustPolicy, UdapClient, UdapError,
};

use crate::cli::Cli;
use crate::config::{ClientProfile, HttpConfig};

/// Builds the target server from the flags, falling back to the profile.
pub fn authorization_server(
    cli: &Cli,
    profile: Option<&ClientProfile>,
) -> Result<AuthorizationServer> {
    let Some(base_url) = cli
        .server
        .clone()
        .or_else(|| profile.and_then(|p| p.server.clone()))
    else {
        bail!("No server URL configured. Use --server, set UDAP_SERVER, or add `server` to the client profile");
    };

    let mut server = AuthorizationServer::new(base_url)
        .with_trust_policy(TrustPolicy::from(!cli.insecure_skip_trust));
    if let Some(issuer) = cli
        .issuer
        .as_deref()
        .or_else(|| profile.and_then(|p| p.issuer.as_deref()))
    {
        server = server.with_expected_issuer(issuer);
    }
    if cli.strict_endpoints {
        server = server.with_endpoint_match(EndpointMatch::All);
    }
    Ok(server)
}

pub fn udap_client(http: &HttpConfig) -> Result<UdapClient> {
    let transport = ReqwestTransport::with_timeout(http.timeout)?;
    Ok(UdapClient::new(transport))
}

/// Points at what to check after a failed command.
pub fn hint(err: &anyhow::Error) -> Option<&'static str> {
    let udap = err.chain().find_map(|e| e.downcast_ref::<UdapError>())?;
    if udap.is_client_error() {
        Some("Check the client profile and its key material; nothing was sent to the server")
    } else if udap.is_trust_error() {
        Some("The server's signed metadata was not accepted; --insecure-skip-trust skips verification for testing")
    } else if udap.is_transport_error() {
        Some("The server could not be reached; check --server and http.timeout")
    } else {
        None
    }
}
