pub mod backend;
pub mod mapping_store;

pub use backend::{MappingBackend, MemoryBackend, RedbBackend};
pub use mapping_store::{DomainSummary, FieldMatch, MappingStore, StoreStats};

use url::Url;

/// Bare, lower-cased host used as the store key: `https://Ex.test:8443/a?b`
/// and `ex.test` both become `ex.test`.
pub fn normalize_domain(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    if let Some(host) = Url::parse(&candidate)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.to_lowercase()))
    {
        return host;
    }

    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("https://Ex.test:8443/signup?x=1"), "ex.test");
        assert_eq!(normalize_domain("ex.test"), "ex.test");
        assert_eq!(normalize_domain("WWW.Example.com/path"), "www.example.com");
        assert_eq!(normalize_domain("  "), "");
    }
}
