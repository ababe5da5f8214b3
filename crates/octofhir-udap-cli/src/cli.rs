use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use octofhir_udap::{B2bAuthorization, SigningAlgorithm};
use url::Url;

#[derive(Parser)]
#[command(
    name = "udap",
    about = "UDAP trusted registration and token client for FHIR servers",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file [default: udap.toml]
    #[arg(long, global = true, env = "UDAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Client profile nickname
    #[arg(short, long, global = true, env = "UDAP_CLIENT")]
    pub client: Option<String>,

    /// FHIR base URL of the authorization server
    #[arg(short, long, global = true, env = "UDAP_SERVER")]
    pub server: Option<Url>,

    /// Expected issuer of the signed metadata [default: server URL]
    #[arg(long, global = true)]
    pub issuer: Option<String>,

    /// Require both token and registration endpoints to match the signed metadata
    #[arg(long, global = true)]
    pub strict_endpoints: bool,

    /// Skip signed metadata verification (testing only)
    #[arg(long, global = true)]
    pub insecure_skip_trust: bool,

    /// Log level, overriding the configured one
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and verify the server's UDAP metadata
    Metadata,
    /// Register the client with the server
    Register(RegisterArgs),
    /// Request an access token with the client credentials grant
    Token(TokenArgs),
}

#[derive(Args)]
pub struct RegisterArgs {
    /// UDAP version sent with the request
    #[arg(long, default_value = "1")]
    pub udap_version: String,

    /// Software statement signing algorithm
    #[arg(long, default_value = "RS256")]
    pub algorithm: SigningAlgorithm,
}

#[derive(Args)]
pub struct TokenArgs {
    /// Requested scope [default: the client's configured scopes]
    #[arg(long)]
    pub scope: Option<String>,

    /// Client id, overriding the configured one
    #[arg(long)]
    pub client_id: Option<String>,

    /// Authentication token signing algorithm
    #[arg(long, default_value = "RS256")]
    pub algorithm: SigningAlgorithm,

    #[command(flatten)]
    pub b2b: B2bArgs,
}

/// HL7 B2B authorization extension (`hl7-b2b`).
#[derive(Args, Default)]
pub struct B2bArgs {
    /// Requesting organization identifier (URI); enables the hl7-b2b extension
    #[arg(long)]
    pub organization_id: Option<String>,

    #[arg(long)]
    pub organization_name: Option<String>,

    /// Purpose of use codes, comma separated
    #[arg(long, value_delimiter = ',')]
    pub purpose_of_use: Vec<String>,

    /// Name of the person on whose behalf the request is made
    #[arg(long)]
    pub subject_name: Option<String>,

    #[arg(long, requires = "subject_name")]
    pub subject_id: Option<String>,

    #[arg(long, requires = "subject_name")]
    pub subject_role: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub consent_policy: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    pub consent_reference: Vec<String>,
}

impl B2bArgs {
    /// Builds the extension, or `None` when no B2B flag was given.
    pub fn to_extension(&self) -> Result<Option<B2bAuthorization>> {
        let Some(organization_id) = &self.organization_id else {
            if self.organization_name.is_some()
                || !self.purpose_of_use.is_empty()
                || self.subject_name.is_some()
                || !self.consent_policy.is_empty()
                || !self.consent_reference.is_empty()
            {
                bail!("B2B extension flags require --organization-id");
            }
            return Ok(None);
        };
        if self.purpose_of_use.is_empty() {
            bail!("--purpose-of-use is required with --organization-id");
        }

        let mut extension = B2bAuthorization::new(organization_id, self.purpose_of_use.clone())
            .with_consent_policy(self.consent_policy.clone())
            .with_consent_reference(self.consent_reference.clone());
        if let Some(name) = &self.organization_name {
            extension = extension.with_organization_name(name);
        }
        if let Some(name) = &self.subject_name {
            extension =
                extension.with_subject(name, self.subject_id.clone(), self.subject_role.clone());
        }
        Ok(Some(extension))
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_token_b2b_flags() {
        let cli = Cli::parse_from([
            "udap",
            "--server",
            "https://fhir.example.com/r4",
            "token",
            "--organization-id",
            "https://client.example/org/1",
            "--purpose-of-use",
            "TREAT,ETREAT",
            "--subject-name",
            "Dr. Smith",
        ]);
        let Commands::Token(args) = cli.command else {
            panic!("expected token command");
        };
        let extension = args.b2b.to_extension().unwrap().unwrap();
        assert_eq!(extension.organization_id, "https://client.example/org/1");
        assert_eq!(extension.purpose_of_use, vec!["TREAT", "ETREAT"]);
        assert_eq!(extension.subject_name.as_deref(), Some("Dr. Smith"));
        assert_eq!(args.algorithm, SigningAlgorithm::RS256);
    }

    #[test]
    fn test_b2b_flags_optional() {
        assert!(B2bArgs::default().to_extension().unwrap().is_none());
    }

    #[test]
    fn test_b2b_flags_require_organization() {
        let args = B2bArgs {
            purpose_of_use: vec!["TREAT".to_string()],
            ..Default::default()
        };
        assert!(args.to_extension().is_err());

        let args = B2bArgs {
            organization_id: Some("https://client.example/org/1".to_string()),
            ..Default::default()
        };
        assert!(args.to_extension().is_err());
    }
}
