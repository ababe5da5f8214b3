use anyhow::Result;
use octofhir_udap::{AuthorizationExtension, AuthorizationServer, UdapClient};

use crate::cli::TokenArgs;
use crate::config::ClientProfile;
use crate::keys::load_key_material;
use crate::output::{print_json, print_success};

pub async fn token(
    client: UdapClient,
    server: &AuthorizationServer,
    profile: &ClientProfile,
    args: &TokenArgs,
) -> Result<()> {
    let keys = load_key_material(profile)?;
    let client = client.with_signing_algorithm(args.algorithm);

    let mut identity = profile.identity.clone();
    if let Some(client_id) = &args.client_id {
        identity = identity.with_client_id(client_id);
    }

    let extensions: Vec<AuthorizationExtension> = args
        .b2b
        .to_extension()?
        .map(AuthorizationExtension::from)
        .into_iter()
        .collect();

    let token = client
        .access_token(&identity, &keys, server, args.scope.as_deref(), &extensions)
        .await?;

    print_json(&token)?;
    print_success(&format!("Issued {} token", token.token_type));
    Ok(())
}
