use anyhow::{Result, bail};
use colored::Colorize;
use octofhir_udap::{AuthorizationServer, TrustReason, UdapClient};

use crate::output::{print_json, print_success, print_warning};

pub async fn metadata(client: &UdapClient, server: &AuthorizationServer) -> Result<()> {
    let (metadata, decision) = client.evaluate_trust(server).await?;

    print_json(&metadata)?;
    eprintln!("{}: {}", "Issuer".cyan(), server.expected_issuer);

    let missing = metadata.missing_required_extensions(&[]);
    if !missing.is_empty() {
        eprintln!("{}: {}", "Required extensions".cyan(), missing.join(", "));
    }

    match decision.reason {
        TrustReason::Verified => print_success("Signed metadata verified"),
        TrustReason::Bypassed => print_warning("Trust verification skipped"),
        TrustReason::EndpointMismatch => {
            bail!("Signed metadata endpoints do not match the discovery document")
        }
    }
    Ok(())
}
