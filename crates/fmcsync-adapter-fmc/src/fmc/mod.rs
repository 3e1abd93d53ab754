//! fmc adapter implementation.

mod client;
mod mapping;
mod ops;


use anyhow::Result;
use std::time::Duration;

use client::FmcClient;

/// retry policy for creates that race a freshly created dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// total attempts, including the first.
    pub attempts: u32,
    /// fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

/// connection settings for one management center.
#[derive(Debug, Clone)]
pub struct FmcConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// accept self-signed certificates.
    pub insecure: bool,
    pub retry: RetryPolicy,
    /// page size for list calls.
    pub page_limit: usize,
}

impl FmcConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            insecure: false,
            retry: RetryPolicy::default(),
            page_limit: 1000,
        }
    }

    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// item store backed by the fmc rest api.
///
/// The handle is created once and passed to the reconciler; it owns the
/// session token and the domain-name cache.
pub struct FmcStore {
    client: FmcClient,
    retry: RetryPolicy,
}

impl FmcStore {
    /// build the store without contacting the server.
    pub fn new(config: FmcConfig) -> Result<Self> {
        let retry = config.retry;
        let client = FmcClient::new(config)?;
        Ok(Self { client, retry })
    }

    /// build the store and authenticate eagerly.
    pub async fn connect(config: FmcConfig) -> Result<Self> {
        let store = Self::new(config)?;
        store.client.login().await?;
        Ok(store)
    }
}
