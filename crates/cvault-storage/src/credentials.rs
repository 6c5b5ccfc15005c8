//! S3 credentials from the process environment

use anyhow::{Context, Result};
use secrecy::SecretString;

/// Access key pair for the configured bucket
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, falling back to the
    /// `CVAULT_`-prefixed names.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let access_key_id = lookup("AWS_ACCESS_KEY_ID")
            .or_else(|| lookup("CVAULT_ACCESS_KEY_ID"))
            .filter(|v| !v.is_empty())
            .context(
                "S3 credentials not set\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.",
            )?;
        let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY")
            .or_else(|| lookup("CVAULT_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;

        Ok(Self {
            access_key_id,
            secret_access_key: SecretString::from(secret_access_key),
        })
    }
}
