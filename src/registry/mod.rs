mod cache;
mod types;

pub use cache::ModelInfoCache;
pub use types::{quantization_tag, FileVariant, RegistryEntry, KNOWN_QUANT_TAGS};

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::resolver::ModelIdentifier;
use types::TreeItem;

/// Timeout for registry metadata calls. Downloads use a separate client
/// with no overall deadline.
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Queries the remote model registry with a cache-first lookup policy.
///
/// Registry unavailability is never fatal: every network or decode error
/// degrades to "not found" (None or an empty variant list) so the caller
/// can fall back to manual placement.
pub struct RegistryClient {
    http: reqwest::Client,
    api_base: String,
    host_base: String,
    cache: Option<ModelInfoCache>,
}

impl RegistryClient {
    pub fn new(settings: &Settings) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .build()
            .unwrap_or_default();
        let cache = settings
            .cache_root()
            .map(|root| ModelInfoCache::new(&root));

        Self {
            http,
            api_base: settings.registry_api.trim_end_matches('/').to_string(),
            host_base: settings.registry_host.trim_end_matches('/').to_string(),
            cache,
        }
    }

    /// Looks up a model by identifier: cache first, then a direct lookup,
    /// then a search with a gguf filter. Whatever is found is cached.
    pub async fn find_model(&self, id: &ModelIdentifier) -> Option<RegistryEntry> {
        let key = id.to_string();
        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!("registry cache hit for {}", key);
            return Some(cached);
        }

        let entry = match self.lookup_direct(&key).await {
            Some(entry) => Some(entry),
            None => self.lookup_search(&key).await,
        };

        if let (Some(cache), Some(entry)) = (self.cache.as_ref(), entry.as_ref()) {
            cache.put(&key, entry);
        }
        entry
    }

    async fn lookup_direct(&self, id: &str) -> Option<RegistryEntry> {
        let url = format!("{}/models/{}", self.api_base, id);
        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<RegistryEntry>().await {
                    Ok(entry) => {
                        info!("found model {} via direct lookup", entry.id);
                        Some(entry)
                    }
                    Err(e) => {
                        warn!("failed to decode registry entry for {}: {}", id, e);
                        None
                    }
                }
            }
            Ok(response) => {
                debug!("direct lookup for {} returned {}", id, response.status());
                None
            }
            Err(e) => {
                warn!("registry lookup for {} failed: {}", id, e);
                None
            }
        }
    }

    async fn lookup_search(&self, id: &str) -> Option<RegistryEntry> {
        let query = format!("{} gguf", id.replace('/', " "));
        let url = format!("{}/models", self.api_base);
        let request = self
            .http
            .get(&url)
            .query(&[("search", query.as_str()), ("filter", "gguf"), ("limit", "10")]);

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<Vec<RegistryEntry>>().await {
                    Ok(results) => {
                        let entry = results.into_iter().next();
                        match entry.as_ref() {
                            Some(e) => info!("found model {} via search", e.id),
                            None => debug!("search for {} returned no results", id),
                        }
                        entry
                    }
                    Err(e) => {
                        warn!("failed to decode search results for {}: {}", id, e);
                        None
                    }
                }
            }
            Ok(response) => {
                debug!("search for {} returned {}", id, response.status());
                None
            }
            Err(e) => {
                warn!("registry search for {} failed: {}", id, e);
                None
            }
        }
    }

    /// Lists the entry's downloadable gguf file variants. Errors yield an
    /// empty list, not a fault.
    pub async fn list_variants(&self, entry: &RegistryEntry) -> Vec<FileVariant> {
        let url = format!("{}/models/{}/tree/main", self.api_base, entry.id);
        let items = match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<Vec<TreeItem>>().await {
                    Ok(items) => items,
                    Err(e) => {
                        warn!("failed to decode file tree for {}: {}", entry.id, e);
                        return Vec::new();
                    }
                }
            }
            Ok(response) => {
                debug!("file tree for {} returned {}", entry.id, response.status());
                return Vec::new();
            }
            Err(e) => {
                warn!("listing files for {} failed: {}", entry.id, e);
                return Vec::new();
            }
        };

        variants_from_tree(&entry.id, items, &self.host_base)
    }
}

/// Builds the variant list for an entry out of raw tree items: keep gguf
/// files, tag their quantization, and derive the resolve-URL shape.
fn variants_from_tree(entry_id: &str, items: Vec<TreeItem>, host_base: &str) -> Vec<FileVariant> {
    items
        .into_iter()
        .filter(|item| item.path.to_lowercase().ends_with(".gguf"))
        .map(|item| {
            let filename = item
                .path
                .rsplit('/')
                .next()
                .unwrap_or(item.path.as_str())
                .to_string();
            FileVariant {
                quantization: quantization_tag(&filename),
                download_url: format!("{}/{}/resolve/main/{}", host_base, entry_id, item.path),
                filename,
                remote_path: item.path,
                size_bytes: item.size.unwrap_or(0),
            }
        })
        .collect()
}
