//! PubMed E-utilities client.
//!
//! Retrieves the raw efetch XML for one PubMed id. Requests are issued one
//! at a time by the enrichment driver; this module only knows how to make a
//! single bounded request.

use crate::error::{PaperTableError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// NCBI efetch endpoint
pub const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

const USER_AGENT: &str = concat!("papertable/", env!("CARGO_PKG_VERSION"));

/// Source of raw citation documents.
#[async_trait]
pub trait CitationFetcher: Send + Sync {
    /// Fetch the citation document for a numeric PubMed id.
    async fn fetch(&self, pmid: &str) -> Result<String>;
}

/// Options for the efetch client
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// efetch endpoint (overridable for mirrors and tests)
    pub base_url: String,
    /// NCBI API key, raises the service's rate limit
    pub api_key: Option<String>,
    /// Upper bound on a single request
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            base_url: EFETCH_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// efetch client backed by reqwest.
pub struct EutilsClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl EutilsClient {
    /// Create a new client.
    pub fn new(options: &FetchOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .build()
            .map_err(|e| PaperTableError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = Url::parse(&options.base_url).map_err(|e| {
            PaperTableError::Config(format!("Invalid efetch URL {}: {}", options.base_url, e))
        })?;

        Ok(Self {
            client,
            base_url,
            api_key: options.api_key.clone().filter(|k| !k.trim().is_empty()),
        })
    }

    /// Build the efetch URL for one id.
    fn build_fetch_url(&self, pmid: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("db", "pubmed")
                .append_pair("id", pmid)
                .append_pair("retmode", "xml");
            if let Some(key) = &self.api_key {
                query.append_pair("api_key", key);
            }
        }
        url
    }
}

#[async_trait]
impl CitationFetcher for EutilsClient {
    async fn fetch(&self, pmid: &str) -> Result<String> {
        let url = self.build_fetch_url(pmid);
        debug!(pmid = pmid, "Fetching citation document");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaperTableError::Api {
                code: status.as_u16(),
                message: format!("efetch failed for {}: {}", pmid, body.trim()),
            });
        }

        Ok(response.text().await?)
    }
}

/// Cut the outermost `<tag ...>...</tag>` span out of a raw document.
///
/// Used to inspect one part of an efetch response without parsing it.
pub fn extract_element<'a>(xml: &'a str, tag: &str) -> Result<Option<&'a str>> {
    let tag = regex::escape(tag);
    let pattern = Regex::new(&format!(r"(?s)<{tag}(?:\s[^>]*)?/?>.*</\s*{tag}\s*>"))
        .map_err(|e| PaperTableError::Config(format!("Invalid tag pattern: {}", e)))?;

    Ok(pattern.find(xml).map(|m| m.as_str()))
}
