use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::config::TuskyConfig;
use crate::error::ProviderError;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");

/// A stored asset as listed by its provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    pub id: String,
    pub name: String,
    /// URL the asset bytes are fetched from.
    pub source_url: String,
}

/// Remote storage holding the game's model files.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Assets currently in the vault. An absent vault lists as empty.
    async fn list_assets(&self) -> Result<Vec<AssetReference>, ProviderError>;

    /// Stores `data` under `name` and returns the new file id.
    async fn upload(&self, name: &str, data: Bytes) -> Result<String, ProviderError>;

    fn asset_reference(&self, id: &str) -> AssetReference;

    /// Headers every asset request must carry.
    fn auth_headers(&self) -> HeaderMap;
}

#[derive(Debug, Clone, Deserialize)]
struct Vault {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FileEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// Listing endpoints answer either a bare array or `{"items": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Paged { items: Vec<T> },
    Plain(Vec<T>),
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Listing::Paged { items } => items,
            Listing::Plain(items) => items,
        }
    }
}

/// Tusky vault client.
#[derive(Debug, Clone)]
pub struct TuskyClient {
    client: reqwest::Client,
    base_url: String,
    api_key: HeaderValue,
    vault_name: String,
}

impl TuskyClient {
    pub fn new(config: &TuskyConfig) -> Result<Self, ProviderError> {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &TuskyConfig) -> Result<Self, ProviderError> {
        let key = config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ProviderError::MissingCredentials("tusky api key"))?;
        let mut api_key = HeaderValue::from_str(key.trim())
            .map_err(|_| ProviderError::MissingCredentials("tusky api key"))?;
        api_key.set_sensitive(true);
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            vault_name: config.vault_name.clone(),
        })
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    /// Where the bytes of file `id` are served.
    pub fn data_url(&self, id: &str) -> String {
        format!("{}/files/{id}/data", self.base_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn vaults(&self) -> Result<Vec<Vault>, ProviderError> {
        let listing: Listing<Vault> = self
            .client
            .get(self.url("vaults"))
            .headers(self.auth_headers())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(listing.into_items())
    }

    async fn find_vault(&self) -> Result<Option<Vault>, ProviderError> {
        let vaults = self.vaults().await?;
        Ok(vaults.into_iter().find(|vault| vault.name == self.vault_name))
    }

    /// Returns the id of the configured vault, creating it if needed.
    pub async fn ensure_vault(&self) -> Result<String, ProviderError> {
        if let Some(vault) = self.find_vault().await? {
            return Ok(vault.id);
        }
        info!("creating vault {}", self.vault_name);
        let created: Created = self
            .client
            .post(self.url("vaults"))
            .headers(self.auth_headers())
            .json(&serde_json::json!({ "name": self.vault_name, "encrypted": false }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(created.id)
    }

    async fn files(&self, vault_id: &str) -> Result<Vec<FileEntry>, ProviderError> {
        let listing: Listing<FileEntry> = self
            .client
            .get(self.url("files"))
            .query(&[("vaultId", vault_id)])
            .headers(self.auth_headers())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(listing.into_items())
    }
}

#[async_trait]
impl StorageProvider for TuskyClient {
    async fn list_assets(&self) -> Result<Vec<AssetReference>, ProviderError> {
        let Some(vault) = self.find_vault().await? else {
            debug!("vault {} does not exist yet", self.vault_name);
            return Ok(Vec::new());
        };
        let files = self.files(&vault.id).await?;
        Ok(files
            .into_iter()
            .map(|file| AssetReference {
                source_url: self.data_url(&file.id),
                name: file.name.unwrap_or_else(|| file.id.clone()),
                id: file.id,
            })
            .collect())
    }

    async fn upload(&self, name: &str, data: Bytes) -> Result<String, ProviderError> {
        let vault_id = self.ensure_vault().await?;
        let size = data.len();
        let part = Part::bytes(data.to_vec()).file_name(name.to_string());
        let form = Form::new().part("file", part);
        let created: Created = self
            .client
            .post(self.url(&format!("vaults/{vault_id}/files")))
            .headers(self.auth_headers())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!("uploaded {name} ({size} bytes) as {}", created.id);
        Ok(created.id)
    }

    fn asset_reference(&self, id: &str) -> AssetReference {
        AssetReference {
            id: id.to_string(),
            name: id.to_string(),
            source_url: self.data_url(id),
        }
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, self.api_key.clone());
        headers
    }
}
