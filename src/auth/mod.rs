//! Credentials for the JIRA client
//!
//! A [`CredentialProvider`] is chosen from the config at startup and asked
//! for a [`Credential`] once, before the client is built. Secrets come from
//! the `pass` password store or an environment variable, never from the
//! config file itself.

use crate::config::CredentialSettings;
use crate::Result;
use anyhow::Context;
use std::process::Command;

/// Credential presented to the tracker
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// HTTP basic auth (JIRA Cloud: account email + API token)
    Basic { user: String, token: String },
    /// Bearer token (JIRA Data Center personal access token)
    Bearer(String),
}

impl Credential {
    fn from_secret(user: Option<&str>, token: String) -> Self {
        match user {
            Some(user) => Credential::Basic {
                user: user.to_string(),
                token,
            },
            None => Credential::Bearer(token),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("token", &"<redacted>")
                .finish(),
            Credential::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// Source of the tracker credential
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Result<Credential>;

    /// Where the secret comes from, for diagnostics
    fn describe(&self) -> String;
}

/// Secret stored in the `pass` password manager
#[derive(Debug, Clone)]
pub struct PassEntry {
    entry: String,
    user: Option<String>,
    binary: String,
}

impl PassEntry {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            user: None,
            binary: "pass".to_string(),
        }
    }

    /// Use basic auth with this user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Use a different `pass` executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

impl CredentialProvider for PassEntry {
    fn credential(&self) -> Result<Credential> {
        tracing::debug!(entry = %self.entry, "Reading credential from pass");

        let output = Command::new(&self.binary)
            .arg(&self.entry)
            .output()
            .with_context(|| format!("Failed to run {} {}", self.binary, self.entry))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(crate::TjsError::Auth(format!(
                "{} {} failed: {}",
                self.binary,
                self.entry,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .context("Password store entry is not valid UTF-8")?;
        let secret = first_line(&stdout).ok_or_else(|| {
            crate::TjsError::Auth(format!("Password store entry {} is empty", self.entry))
        })?;

        Ok(Credential::from_secret(self.user.as_deref(), secret))
    }

    fn describe(&self) -> String {
        format!("pass {}", self.entry)
    }
}

/// Secret held in an environment variable
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
    user: Option<String>,
}

impl EnvToken {
    /// `var` may be written with a leading `$`
    pub fn new(var: impl Into<String>) -> Self {
        let var = var.into();
        Self {
            var: var.trim_start_matches('$').to_string(),
            user: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl CredentialProvider for EnvToken {
    fn credential(&self) -> Result<Credential> {
        let token = std::env::var(&self.var)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                crate::TjsError::Auth(format!("Environment variable {} is not set", self.var))
            })?;
        Ok(Credential::from_secret(self.user.as_deref(), token.trim().to_string()))
    }

    fn describe(&self) -> String {
        format!("${}", self.var)
    }
}

/// Fixed credential, for tests and embedding
#[derive(Debug, Clone)]
pub struct StaticCredential(pub Credential);

impl CredentialProvider for StaticCredential {
    fn credential(&self) -> Result<Credential> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static credential".to_string()
    }
}

/// Build the provider named by the config
pub fn provider_from_settings(settings: &CredentialSettings) -> Box<dyn CredentialProvider> {
    match settings {
        CredentialSettings::Pass { entry, user } => {
            let mut provider = PassEntry::new(entry);
            if let Some(user) = user {
                provider = provider.with_user(user);
            }
            Box::new(provider)
        }
        CredentialSettings::Env { var, user } => {
            let mut provider = EnvToken::new(var);
            if let Some(user) = user {
                provider = provider.with_user(user);
            }
            Box::new(provider)
        }
    }
}

fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}
