use std::fs;

use anyhow::{Context, Result};
use octofhir_udap::ClientKeyMaterial;

use crate::config::ClientProfile;

/// Reads the profile's private key and certificate chain from disk.
pub fn load_key_material(profile: &ClientProfile) -> Result<ClientKeyMaterial> {
    let key_pem = fs::read_to_string(&profile.private_key_path).with_context(|| {
        format!(
            "Cannot read private key {}",
            profile.private_key_path.display()
        )
    })?;
    let chain_pem = fs::read_to_string(&profile.certificate_path).with_context(|| {
        format!(
            "Cannot read certificate chain {}",
            profile.certificate_path.display()
        )
    })?;

    ClientKeyMaterial::from_pem(&key_pem, &chain_pem)
        .with_context(|| format!("Invalid key material for client '{}'", profile.name()))
}
