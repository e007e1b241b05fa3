//! Optional stock-image sourcing.
//!
//! A missing credential is a supported configuration: every call becomes a
//! silent no-op. With a credential, a free-text query yields at most one
//! image URL, downloaded to `images/<slug>-hero.<ext>`.

use std::path::Path;

use tracing::{debug, warn};

/// Thin client over a stock-photo search API.
pub struct ImageSearch {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ImageSearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    /// Whether sourcing will do anything at all.
    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Search for one landscape image URL matching `query`.
    pub async fn search(&self, query: &str) -> Option<String> {
        let api_key = self.api_key.as_ref()?;
        let response = self
            .client
            .get("https://api.pexels.com/v1/search")
            .header("Authorization", api_key)
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            debug!(query, status = %response.status(), "image search not ok");
            return None;
        }
        let value: serde_json::Value = response.json().await.ok()?;
        value["photos"][0]["src"]["large"]
            .as_str()
            .map(str::to_string)
    }

    /// Download a hero image for `slug` into `<site_dir>/images/`.
    ///
    /// Returns the site-relative path on success. All failures are logged
    /// and swallowed.
    pub async fn fetch_hero(&self, site_dir: &Path, slug: &str, query: &str) -> Option<String> {
        let url = self.search(query).await?;
        let ext = extension_for(&url);
        let relative = format!("images/{slug}-hero.{ext}");

        let bytes = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(slug, error = %e, "hero image body read failed");
                    return None;
                }
            },
            Ok(resp) => {
                debug!(slug, status = %resp.status(), "hero image fetch not ok");
                return None;
            }
            Err(e) => {
                warn!(slug, error = %e, "hero image fetch failed");
                return None;
            }
        };

        let images_dir = site_dir.join("images");
        if let Err(e) = tokio::fs::create_dir_all(&images_dir).await {
            warn!(error = %e, "could not create images directory");
            return None;
        }
        if let Err(e) = tokio::fs::write(site_dir.join(&relative), &bytes).await {
            warn!(slug, error = %e, "could not write hero image");
            return None;
        }
        Some(relative)
    }
}

fn extension_for(url: &str) -> &'static str {
    let path = url.split('?').next().unwrap_or(url);
    if path.ends_with(".png") {
        "png"
    } else if path.ends_with(".webp") {
        "webp"
    } else {
        "jpg"
    }
}
