//! Source host aliases.
//!
//! Some platforms serve the same post under several host names but the fetch
//! tool only recognises one of them. Aliases are configuration: each entry
//! maps an alias host to its canonical host, and only the URL host is ever
//! rewritten (once).

use std::fmt;

use thiserror::Error;
use url::Url;

/// Default alias table used when nothing is configured.
pub const DEFAULT_HOST_ALIASES: &str = "x.com=twitter.com";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid host alias entry '{0}', expected alias=canonical")]
pub struct HostAliasParseError(pub String);

/// Ordered alias → canonical host table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAliases {
    entries: Vec<(String, String)>,
}

impl HostAliases {
    /// An empty table (no rewriting).
    pub fn none() -> Self {
        Self { entries: Vec::new() }
    }

    /// Parse a comma-separated `alias=canonical` list.
    pub fn parse(list: &str) -> Result<Self, HostAliasParseError> {
        let mut entries = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (alias, canonical) = entry
                .split_once('=')
                .map(|(a, c)| (a.trim().to_ascii_lowercase(), c.trim().to_ascii_lowercase()))
                .filter(|(a, c)| !a.is_empty() && !c.is_empty())
                .ok_or_else(|| HostAliasParseError(entry.to_string()))?;
            entries.push((alias, canonical));
        }
        Ok(Self { entries })
    }

    pub fn with_alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.entries
            .push((alias.into().to_ascii_lowercase(), canonical.into().to_ascii_lowercase()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical host for `host`, if it is a known alias.
    pub fn canonical_for(&self, host: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(host))
            .map(|(_, canonical)| canonical.as_str())
    }

    /// Rewrite the host of `url` if it is an alias.
    ///
    /// Returns the `(alias, canonical)` pair that was applied.
    pub fn rewrite(&self, url: &mut Url) -> Option<(String, String)> {
        let host = url.host_str()?.to_string();
        let canonical = self.canonical_for(&host)?.to_string();
        url.set_host(Some(&canonical)).ok()?;
        Some((host, canonical))
    }
}

impl Default for HostAliases {
    fn default() -> Self {
        Self::none().with_alias("x.com", "twitter.com")
    }
}

impl fmt::Display for HostAliases {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self
            .entries
            .iter()
            .map(|(alias, canonical)| format!("{}={}", alias, canonical))
            .collect();
        write!(f, "{}", joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_constant() {
        assert_eq!(HostAliases::default(), HostAliases::parse(DEFAULT_HOST_ALIASES).unwrap());
    }

    #[test]
    fn test_rewrite_host_only_once() {
        let aliases = HostAliases::default();
        let mut url = Url::parse("https://x.com/x.com/status/1").unwrap();

        let applied = aliases.rewrite(&mut url);

        assert_eq!(applied, Some(("x.com".to_string(), "twitter.com".to_string())));
        assert_eq!(url.as_str(), "https://twitter.com/x.com/status/1");
    }

    #[test]
    fn test_lookalike_hosts_untouched() {
        let aliases = HostAliases::default();
        let mut url = Url::parse("https://netflix.com/watch/1").unwrap();
        assert!(aliases.rewrite(&mut url).is_none());
        assert_eq!(url.as_str(), "https://netflix.com/watch/1");
    }

    #[test]
    fn test_parse_multiple_entries() {
        let aliases = HostAliases::parse("x.com=twitter.com, mobile.x.com = twitter.com").unwrap();
        assert_eq!(aliases.canonical_for("MOBILE.X.COM"), Some("twitter.com"));
        assert_eq!(aliases.to_string(), "x.com=twitter.com,mobile.x.com=twitter.com");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(HostAliases::parse("x.com").is_err());
        assert!(HostAliases::parse("=twitter.com").is_err());
        assert!(HostAliases::parse("").unwrap().is_empty());
    }
}
