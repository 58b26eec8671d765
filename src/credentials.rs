//! Credentials for sources that sit behind a login.
//!
//! Only Valor Econômico needs them today. Values come from the environment
//! (`VALOR_EMAIL`, `VALOR_PASSWORD`, surfaced through the CLI) or from the
//! `credentials` section of the config file, environment first. A snapshot is
//! taken once per run.

use crate::models::Source;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Option<Self> {
        let identity = identity.into();
        let secret = secret.into();
        if identity.trim().is_empty() || secret.is_empty() {
            return None;
        }
        Some(Self { identity, secret })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

pub trait CredentialsProvider {
    fn get_credentials(&self, source: Source) -> Option<Credentials>;
}

/// Immutable per-run copy of whatever credentials were configured.
#[derive(Debug, Clone, Default)]
pub struct CredentialSnapshot {
    entries: HashMap<Source, Credentials>,
}

impl CredentialSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Source, credentials: Option<Credentials>) -> Self {
        if let Some(c) = credentials {
            self.entries.insert(source, c);
        }
        self
    }

    /// Take a snapshot from any provider for every known source.
    pub fn capture(provider: &impl CredentialsProvider) -> Self {
        Source::ALL.iter().fold(Self::empty(), |snap, &source| {
            snap.with(source, provider.get_credentials(source))
        })
    }

    pub fn has(&self, source: Source) -> bool {
        self.entries.contains_key(&source)
    }
}

impl CredentialsProvider for CredentialSnapshot {
    fn get_credentials(&self, source: Source) -> Option<Credentials> {
        self.entries.get(&source).cloned()
    }
}

/// Layered provider: explicit values (CLI / environment) override the config
/// file.
#[derive(Debug, Clone, Default)]
pub struct LayeredCredentials {
    pub valor_email: Option<String>,
    pub valor_password: Option<String>,
    pub file_email: Option<String>,
    pub file_password: Option<String>,
}

impl CredentialsProvider for LayeredCredentials {
    fn get_credentials(&self, source: Source) -> Option<Credentials> {
        match source {
            Source::ValorEconomico => {
                let email = self.valor_email.clone().or_else(|| self.file_email.clone())?;
                let password = self
                    .valor_password
                    .clone()
                    .or_else(|| self.file_password.clone())?;
                Credentials::new(email, password)
            }
            Source::PipelineValor | Source::FusoesAquisicoes => None,
        }
    }
}
