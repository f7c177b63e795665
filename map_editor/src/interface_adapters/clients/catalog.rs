use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::domain::{CatalogError, EntityPrefab, PrefabCatalog, PrefabRef};

// Prefab document served by the asset catalog.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrefabDto {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    depth_offset: Option<f64>,
    #[serde(default)]
    collision_grid: Option<Vec<Vec<i64>>>,
    #[serde(default)]
    image_path: String,
}

impl PrefabDto {
    fn into_prefab(self, key: &PrefabRef) -> EntityPrefab {
        EntityPrefab {
            collection: key.collection.clone(),
            id: key.id.clone(),
            name: self.name,
            tags: self.tags,
            depth_offset: self.depth_offset,
            collision_grid: self.collision_grid,
            image_path: self.image_path,
            revision: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

// Thin reqwest client for `GET {base}/collections/{collection}/prefabs/{id}`.
#[derive(Clone)]
pub struct HttpPrefabCatalog {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpPrefabCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CatalogError::Transport(format!("invalid catalog url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CatalogError::Transport(format!(
                "catalog url cannot be a base: {base_url}"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn prefab_url(&self, key: &PrefabRef) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::Transport("catalog url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["collections", key.collection.as_str(), "prefabs", key.id.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl PrefabCatalog for HttpPrefabCatalog {
    async fn fetch_prefab(&self, key: &PrefabRef) -> Result<Option<EntityPrefab>, CatalogError> {
        let url = self.prefab_url(key)?;
        debug!(prefab = %key, %url, "fetching prefab");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            let dto = response
                .json::<PrefabDto>()
                .await
                .map_err(|e| CatalogError::Decode(e.to_string()))?;
            return Ok(Some(dto.into_prefab(key)));
        }

        // Error bodies are best effort.
        let message = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .map(|body| body.message);
        Err(CatalogError::Upstream {
            status: status.as_u16(),
            message,
        })
    }
}
