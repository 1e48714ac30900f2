//! Chapter content providers.
//!
//! A provider knows how to turn a chapter URL into chapter text for one
//! family of sites. The [`ProviderResolver`] picks the provider for a
//! story from the story's source URL.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;

use crate::error::Result;

pub use http::{html_to_text, HttpProvider};

#[async_trait]
pub trait ChapterProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the text of one chapter. Transport failures and non-success
    /// responses are `Network` errors.
    async fn fetch_chapter_content(&self, url: &str) -> Result<String>;
}

pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, source_url: &str) -> Option<Arc<dyn ChapterProvider>>;
}

/// Resolves providers by host name, with an optional catch-all.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<(String, Arc<dyn ChapterProvider>)>,
    fallback: Option<Arc<dyn ChapterProvider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "hosts",
                &self.providers.iter().map(|(h, _)| h).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `host` and all of its subdomains.
    pub fn register(mut self, host: impl Into<String>, provider: Arc<dyn ChapterProvider>) -> Self {
        self.providers
            .push((host.into().to_ascii_lowercase(), provider));
        self
    }

    /// Provider used when no host matches.
    pub fn with_fallback(mut self, provider: Arc<dyn ChapterProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }
}

impl ProviderResolver for ProviderRegistry {
    fn resolve(&self, source_url: &str) -> Option<Arc<dyn ChapterProvider>> {
        let host = Url::parse(source_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase));

        if let Some(host) = host {
            let matched = self.providers.iter().find(|(registered, _)| {
                host == *registered || host.ends_with(&format!(".{}", registered))
            });
            if let Some((_, provider)) = matched {
                return Some(provider.clone());
            }
        }
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl ChapterProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch_chapter_content(&self, _url: &str) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn resolves_exact_host_and_subdomains() {
        let registry = ProviderRegistry::new().register("example.org", Arc::new(Named("ex")));

        let exact = registry.resolve("https://example.org/story/1").unwrap();
        assert_eq!(exact.name(), "ex");
        let sub = registry.resolve("https://www.Example.org/story/1").unwrap();
        assert_eq!(sub.name(), "ex");
        assert!(registry.resolve("https://notexample.org/story").is_none());
    }

    #[test]
    fn unmatched_or_invalid_url_uses_fallback() {
        let registry = ProviderRegistry::new()
            .register("example.org", Arc::new(Named("ex")))
            .with_fallback(Arc::new(Named("generic")));

        assert_eq!(registry.resolve("https://other.net/x").unwrap().name(), "generic");
        assert_eq!(registry.resolve("not a url").unwrap().name(), "generic");
    }

    #[test]
    fn empty_registry_resolves_nothing() {
        assert!(ProviderRegistry::new().resolve("https://example.org").is_none());
    }
}
