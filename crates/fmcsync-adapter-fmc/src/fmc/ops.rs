use super::client::VERSION_PATH;
use super::mapping::{
    decode_item, decode_items, deleted_ids, encode_batch, has_next_page, items_of, server_version,
};
use super::FmcStore;
use async_trait::async_trait;
use fmcsync_core::{to_body, FmcVersion, Item, Section};
use fmcsync_engine::{encode_id, id_filter, ItemStore, Scope, StoreError};
use reqwest::Method;
use tracing::{debug, warn};

impl FmcStore {
    /// collection url of a scope, with `{parent}` expanded.
    async fn collection_url(&self, scope: Scope<'_>) -> Result<String, StoreError> {
        let path = scope.schema.expand_path(scope.parent).ok_or_else(|| {
            StoreError::Config(format!(
                "{}: path {} needs a parent id",
                scope.resource, scope.schema.path
            ))
        })?;
        self.client.config_url(scope.domain, &path).await
    }

    /// whether a failed create is worth another attempt.
    fn settling(scope: Scope<'_>, err: &StoreError) -> bool {
        scope.schema.settle_retries && matches!(err.status(), Some(400 | 404))
    }
}

#[async_trait]
impl ItemStore for FmcStore {
    async fn server_version(&self) -> Result<FmcVersion, StoreError> {
        let body = self.client.platform_get(VERSION_PATH).await?;
        server_version(&body)
    }

    async fn list(&self, scope: Scope<'_>) -> Result<Vec<Item>, StoreError> {
        let url = self.collection_url(scope).await?;
        let limit = self.client.page_limit;
        let mut items = Vec::new();
        let mut offset = 0usize;
        loop {
            let page_url = format!("{url}?expanded=true&limit={limit}&offset={offset}");
            let body = self.client.request(Method::GET, &page_url, None).await?;
            let page_count = items_of(&body).len();
            items.extend(decode_items(scope.schema, &body)?);
            if page_count == 0 || !has_next_page(&body) {
                break;
            }
            offset += page_count;
        }
        debug!(resource = scope.resource, count = items.len(), "listed");
        Ok(items)
    }

    async fn create_batch(
        &self,
        scope: Scope<'_>,
        items: &[Item],
        section: Option<&Section>,
    ) -> Result<Vec<Item>, StoreError> {
        let mut url = format!("{}?bulk=true", self.collection_url(scope).await?);
        if let Some(section) = section {
            url.push_str("&section=");
            url.push_str(&encode_id(section.as_str()));
        }
        let body = encode_batch(scope.schema, items);

        let mut attempt = 1;
        let response = loop {
            match self.client.request(Method::POST, &url, Some(&body)).await {
                Ok(response) => break response,
                Err(err) if attempt < self.retry.attempts && Self::settling(scope, &err) => {
                    warn!(
                        resource = scope.resource,
                        attempt,
                        error = %err,
                        "create not accepted yet; retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(err) => return Err(err),
            }
        };
        decode_items(scope.schema, &response)
    }

    async fn update_one(&self, scope: Scope<'_>, item: &Item) -> Result<Item, StoreError> {
        let id = item
            .id()
            .ok_or_else(|| StoreError::Config(format!("{}: update without id", item.name)))?;
        let url = format!("{}/{}", self.collection_url(scope).await?, encode_id(id));
        let body = to_body(scope.schema, item, true);
        let response = self.client.request(Method::PUT, &url, Some(&body)).await?;
        if response.is_null() {
            return Ok(item.clone());
        }
        decode_item(scope.schema, &response)
    }

    async fn delete_batch(
        &self,
        scope: Scope<'_>,
        ids: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let url = format!(
            "{}?bulk=true&filter={}",
            self.collection_url(scope).await?,
            id_filter(ids)
        );
        let response = self.client.request(Method::DELETE, &url, None).await?;
        Ok(deleted_ids(&response))
    }

    async fn delete_one(&self, scope: Scope<'_>, id: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.collection_url(scope).await?, encode_id(id));
        self.client.request(Method::DELETE, &url, None).await?;
        Ok(())
    }
}
