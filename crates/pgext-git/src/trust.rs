//! Trusted source hosts.
//!
//! Every repository URL is classified and checked against the policy before
//! any network or filesystem access. Anything that cannot be classified is
//! rejected.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Schemes that carry no transport encryption and are never trusted.
const PLAINTEXT_SCHEMES: &[&str] = &["http", "git"];

/// Where a repository URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryLocation {
    /// A network host, lowercased and without user or port.
    Remote { host: String },
    /// A `file://` URL or a bare filesystem path.
    Local,
}

impl RepositoryLocation {
    /// Classify a repository URL.
    ///
    /// Accepts `scheme://[user@]host[:port]/path`, scp-like
    /// `[user@]host:path`, `file://` URLs and bare paths.
    pub fn parse(repository: &str) -> std::result::Result<Self, String> {
        let repository = repository.trim();
        if repository.is_empty() {
            return Err("repository is empty".to_string());
        }

        if let Some((scheme, rest)) = repository.split_once("://") {
            let scheme = scheme.to_ascii_lowercase();
            if scheme == "file" {
                return Ok(Self::Local);
            }
            if PLAINTEXT_SCHEMES.contains(&scheme.as_str()) {
                return Err(format!("scheme '{scheme}' is not encrypted"));
            }
            if !matches!(scheme.as_str(), "https" | "ssh" | "git+ssh") {
                return Err(format!("unsupported scheme '{scheme}'"));
            }
            let authority = rest.split('/').next().unwrap_or_default();
            return host_of(authority).map(|host| Self::Remote { host });
        }

        if repository.starts_with('/') || repository.starts_with('.') || repository.starts_with('~') {
            return Ok(Self::Local);
        }

        // scp-like syntax: the colon comes before any slash
        if let Some((authority, _path)) = repository.split_once(':')
            && !authority.contains('/')
        {
            let host = authority.rsplit('@').next().unwrap_or(authority);
            return host_of(host).map(|host| Self::Remote { host });
        }

        Ok(Self::Local)
    }
}

fn host_of(authority: &str) -> std::result::Result<String, String> {
    let without_user = authority.rsplit('@').next().unwrap_or(authority);
    let host = if let Some(rest) = without_user.strip_prefix('[') {
        rest.split(']').next().unwrap_or_default()
    } else {
        without_user.split(':').next().unwrap_or_default()
    };
    if host.is_empty() {
        return Err("no host in repository URL".to_string());
    }
    Ok(host.to_ascii_lowercase())
}

/// Allow-list of source hosts.
///
/// A host entry matches exactly (case-insensitive); an entry of the form
/// `*.example.com` matches any subdomain of `example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustPolicy {
    pub hosts: Vec<String>,
    /// Permit `file://` URLs and bare paths.
    pub allow_local: bool,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            hosts: vec![
                "github.com".to_string(),
                "gitlab.com".to_string(),
                "codeberg.org".to_string(),
            ],
            allow_local: false,
        }
    }
}

impl TrustPolicy {
    /// A policy that trusts only local repositories.
    pub fn local_only() -> Self {
        Self {
            hosts: Vec::new(),
            allow_local: true,
        }
    }

    fn host_allowed(&self, host: &str) -> bool {
        self.hosts.iter().any(|allowed| {
            let allowed = allowed.trim().to_ascii_lowercase();
            match allowed.strip_prefix("*.") {
                Some(domain) => host
                    .strip_suffix(domain)
                    .is_some_and(|prefix| prefix.ends_with('.') && prefix.len() > 1),
                None => host == allowed,
            }
        })
    }

    /// Fail closed unless `repository` is trusted.
    pub fn check(&self, repository: &str) -> Result<()> {
        let untrusted = |reason: String| Error::UntrustedSource {
            repository: repository.to_string(),
            reason,
        };
        match RepositoryLocation::parse(repository).map_err(untrusted)? {
            RepositoryLocation::Local if self.allow_local => Ok(()),
            RepositoryLocation::Local => {
                Err(untrusted("local repositories are not allowed".to_string()))
            }
            RepositoryLocation::Remote { host } if self.host_allowed(&host) => Ok(()),
            RepositoryLocation::Remote { host } => {
                tracing::warn!(repository, host = %host, "rejected untrusted source host");
                Err(untrusted(format!("host '{host}' is not in the trusted host list")))
            }
        }
    }
}
