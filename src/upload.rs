// Copyright 2026, the ezo_i2c contributors
//
// Licensed under the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>,
// This file may not be copied, modified, or distributed
// except according to those terms.

//! Upload of finished log files to Google Cloud Storage.
//!
//! A logging run can last days, so the bearer token is fetched for each
//! upload rather than once at startup.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use gcp_auth::TokenProvider;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::config::StorageConfig;

pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Destination for completed CSV files.
pub trait ObjectStore {
    /// Copy `local` into the store under a key derived from its path.
    fn put_file(&self, local: &Path) -> impl Future<Output = Result<()>>;
}

/// Bearer tokens for the storage API.
pub trait TokenSource {
    /// A token valid for at least the next request.
    fn token(&self) -> impl Future<Output = Result<String>>;
}

pub enum Credentials {
    /// Fixed token from the environment, used as given.
    Static(String),
    /// Application default credentials, located on first use. The provider
    /// caches its token and refreshes it before expiry.
    ApplicationDefault(OnceCell<Arc<dyn TokenProvider>>),
}

impl Credentials {
    /// The configured token if there is one, application default
    /// credentials otherwise.
    pub fn from_config(config: &StorageConfig) -> Self {
        match &config.access_token {
            Some(token) => Credentials::Static(token.clone()),
            None => Credentials::ApplicationDefault(OnceCell::new()),
        }
    }
}

impl TokenSource for Credentials {
    async fn token(&self) -> Result<String> {
        match self {
            Credentials::Static(token) => Ok(token.clone()),
            Credentials::ApplicationDefault(provider) => {
                let provider = provider
                    .get_or_try_init(gcp_auth::provider)
                    .await
                    .context("no Google application default credentials found")?;
                let token = provider
                    .token(&[STORAGE_SCOPE])
                    .await
                    .context("failed to fetch storage access token")?;
                debug!("storage token ready");
                Ok(token.as_str().to_string())
            }
        }
    }
}

/// Single-request media upload through the GCS JSON API.
pub struct GcsStore<A = Credentials> {
    client: reqwest::Client,
    config: StorageConfig,
    tokens: A,
}

impl GcsStore {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let tokens = Credentials::from_config(&config);
        GcsStore::with_tokens(config, tokens)
    }
}

impl<A: TokenSource> GcsStore<A> {
    pub fn with_tokens(config: StorageConfig, tokens: A) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            config,
            tokens,
        })
    }

    /// Object name for `local`, the local relative path under the prefix.
    pub fn object_name(&self, local: &Path) -> String {
        object_name(&self.config.prefix, local)
    }

    fn upload_url(&self, object: &str) -> Result<Url> {
        let base = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.config.endpoint.trim_end_matches('/'),
            self.config.bucket
        );
        Url::parse_with_params(&base, &[("uploadType", "media"), ("name", object)])
            .with_context(|| format!("invalid storage endpoint {}", self.config.endpoint))
    }
}

impl<A: TokenSource> ObjectStore for GcsStore<A> {
    async fn put_file(&self, local: &Path) -> Result<()> {
        let object = self.object_name(local);
        let url = self.upload_url(&object)?;
        let token = self.tokens.token().await?;
        let body = tokio::fs::read(local)
            .await
            .with_context(|| format!("failed to read {}", local.display()))?;

        info!(bucket = %self.config.bucket, object = %object, bytes = body.len(), "uploading log file");
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .header("x-goog-user-project", &self.config.project)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(body)
            .send()
            .await
            .context("storage upload request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("storage upload returned {status}: {text}"));
        }
        info!(bucket = %self.config.bucket, object = %object, "upload complete");
        Ok(())
    }
}

fn object_name(prefix: &str, local: &Path) -> String {
    let relative = local.to_string_lossy().replace('\\', "/");
    let relative = relative.trim_start_matches("./").trim_start_matches('/');
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}
