use log::info;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::config::PinataConfig;
use crate::error::PublishError;
use crate::factory::{Clock, SystemClock};
use crate::scene::Scene;

/// A scene pinned to IPFS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedScene {
    pub ipfs_hash: String,
    /// Gateway URL players load the scene from.
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: Option<String>,
}

/// Pins exported scenes through the Pinata API.
#[derive(Debug, Clone)]
pub struct PinataClient<C = SystemClock> {
    client: reqwest::Client,
    api_url: String,
    gateway_url: String,
    jwt: String,
    clock: C,
}

impl PinataClient<SystemClock> {
    pub fn new(config: &PinataConfig) -> Result<Self, PublishError> {
        Self::with_clock(reqwest::Client::new(), config, SystemClock)
    }
}

impl<C: Clock> PinataClient<C> {
    pub fn with_clock(
        client: reqwest::Client,
        config: &PinataConfig,
        clock: C,
    ) -> Result<Self, PublishError> {
        let jwt = config
            .jwt
            .as_deref()
            .map(str::trim)
            .filter(|jwt| !jwt.is_empty())
            .ok_or(PublishError::MissingCredentials)?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            gateway_url: config.gateway_url.trim_end_matches('/').to_string(),
            jwt: jwt.to_string(),
            clock,
        })
    }

    pub fn gateway_url(&self, ipfs_hash: &str) -> String {
        format!("{}/{ipfs_hash}", self.gateway_url)
    }

    /// File name the pinned JSON is stored under.
    pub fn pin_name(&self) -> String {
        format!("final_json_{}.json", self.clock.now_millis())
    }

    pub async fn pin_scene(&self, scene: &Scene) -> Result<PublishedScene, PublishError> {
        let json = scene.to_json()?;
        let name = self.pin_name();
        let file = Part::bytes(json.into_bytes())
            .file_name(name.clone())
            .mime_str("application/json")?;
        let form = Form::new()
            .part("file", file)
            .text("pinataMetadata", serde_json::json!({ "name": name }).to_string())
            .text("pinataOptions", serde_json::json!({ "cidVersion": 0 }).to_string());

        let response: PinResponse = self
            .client
            .post(format!("{}/pinning/pinFileToIPFS", self.api_url))
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ipfs_hash = response
            .ipfs_hash
            .filter(|hash| !hash.is_empty())
            .ok_or(PublishError::MissingHash)?;
        let url = self.gateway_url(&ipfs_hash);
        info!("pinned {name} as {ipfs_hash}");
        Ok(PublishedScene { ipfs_hash, url })
    }
}
