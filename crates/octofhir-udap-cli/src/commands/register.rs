use anyhow::Result;
use colored::Colorize;
use octofhir_udap::{AuthorizationServer, UdapClient};

use crate::cli::RegisterArgs;
use crate::config::ClientProfile;
use crate::keys::load_key_material;
use crate::output::{print_json, print_success};

pub async fn register(
    client: UdapClient,
    server: &AuthorizationServer,
    profile: &ClientProfile,
    args: &RegisterArgs,
) -> Result<()> {
    let keys = load_key_material(profile)?;
    let client = client.with_signing_algorithm(args.algorithm);

    let registration = client
        .register(&profile.identity, &keys, server, &args.udap_version)
        .await?;

    print_json(&registration)?;
    print_success(&format!(
        "Registered {} as {}",
        profile.name().cyan(),
        registration.client_id.green()
    ));
    if profile.identity.client_id.as_deref() != Some(registration.client_id.as_str()) {
        eprintln!(
            "  Set client_id = \"{}\" in the client profile to request tokens",
            registration.client_id
        );
    }
    Ok(())
}
