use super::mapping::domain_map;
use super::FmcConfig;
use anyhow::{Context, Result};
use fmcsync_engine::StoreError;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const TOKEN_PATH: &str = "/api/fmc_platform/v1/auth/generatetoken";
const DOMAIN_PATH: &str = "/api/fmc_platform/v1/info/domain";
pub(super) const VERSION_PATH: &str = "/api/fmc_platform/v1/info/serverversion";
const TOKEN_HEADER: &str = "X-auth-access-token";
const DOMAIN_HEADER: &str = "DOMAIN_UUID";

#[derive(Debug, Clone)]
pub(super) struct Session {
    token: String,
    domain_uuid: String,
}

pub(super) struct FmcClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    pub(super) page_limit: usize,
    session: Mutex<Option<Session>>,
    /// domain name -> uuid.
    domains: Mutex<BTreeMap<String, String>>,
}

impl FmcClient {
    pub(super) fn new(config: FmcConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build().context("build http client")?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username,
            password: config.password,
            page_limit: config.page_limit.max(1),
            session: Mutex::new(None),
            domains: Mutex::new(BTreeMap::new()),
        })
    }

    fn session_guard(&self) -> Result<MutexGuard<'_, Option<Session>>, StoreError> {
        self.session
            .lock()
            .map_err(|_| StoreError::Config("session lock poisoned".to_string()))
    }

    fn domains_guard(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.domains
            .lock()
            .map_err(|_| StoreError::Config("domain cache lock poisoned".to_string()))
    }

    /// request a fresh token and remember it.
    pub(super) async fn login(&self) -> Result<Session, StoreError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(status_error(&Method::POST, TOKEN_PATH, status, message));
        }
        let header = |name: &str| {
            resp.headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| StoreError::Decode(format!("login response lacks {name} header")))
        };
        let session = Session {
            token: header(TOKEN_HEADER)?,
            domain_uuid: header(DOMAIN_HEADER)?,
        };
        *self.session_guard()? = Some(session.clone());
        Ok(session)
    }

    async fn session(&self) -> Result<Session, StoreError> {
        let cached = self.session_guard()?.clone();
        match cached {
            Some(session) => Ok(session),
            None => self.login().await,
        }
    }

    /// uuid of a domain by name; `None` is the login domain.
    pub(super) async fn domain_uuid(&self, domain: Option<&str>) -> Result<String, StoreError> {
        let Some(name) = domain else {
            return Ok(self.session().await?.domain_uuid);
        };
        let cached = self.domains_guard()?.get(name).cloned();
        if let Some(uuid) = cached {
            return Ok(uuid);
        }
        let body = self.platform_get(DOMAIN_PATH).await?;
        let mut domains = self.domains_guard()?;
        domains.extend(domain_map(&body));
        domains
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::Config(format!("unknown domain {name}")))
    }

    /// url of a config path inside a domain.
    pub(super) async fn config_url(
        &self,
        domain: Option<&str>,
        path: &str,
    ) -> Result<String, StoreError> {
        let uuid = self.domain_uuid(domain).await?;
        Ok(format!(
            "{}/api/fmc_config/v1/domain/{}/{}",
            self.base_url,
            uuid,
            path.trim_start_matches('/')
        ))
    }

    pub(super) async fn platform_get(&self, path: &str) -> Result<Value, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        self.request(Method::GET, &url, None).await
    }

    /// send an authenticated request, logging in again once on 401.
    pub(super) async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, StoreError> {
        let mut relogged = false;
        loop {
            let session = self.session().await?;
            debug!("{} {}", method, url);
            let mut request = self
                .http
                .request(method.clone(), url)
                .header(TOKEN_HEADER, &session.token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let resp = request.send().await.map_err(transport)?;
            let status = resp.status();
            if status == StatusCode::UNAUTHORIZED && !relogged {
                debug!("token rejected; logging in again");
                *self.session_guard()? = None;
                relogged = true;
                continue;
            }
            let text = resp.text().await.map_err(transport)?;
            if !status.is_success() {
                return Err(status_error(&method, url_path(url), status, text));
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text)
                .map_err(|err| StoreError::Decode(format!("{method} {}: {err}", url_path(url))));
        }
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn status_error(method: &Method, path: &str, status: StatusCode, message: String) -> StoreError {
    StoreError::Status {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
        message: error_message(&message),
    }
}

/// pull the description out of an fmc error body, if it has one.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| value.pointer("/error/messages/0/description"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

/// path and query of a url, without scheme and host.
fn url_path(url: &str) -> &str {
    url.find("://")
        .and_then(|scheme| url[scheme + 3..].find('/').map(|slash| scheme + 3 + slash))
        .map_or(url, |start| &url[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_fmc_description() {
        let body = r#"{"error":{"category":"FRAMEWORK","messages":[{"description":"Duplicate Name"}]}}"#;
        assert_eq!(error_message(body), "Duplicate Name");
        assert_eq!(error_message("plain failure\n"), "plain failure");
    }

    #[test]
    fn url_path_strips_origin() {
        assert_eq!(
            url_path("https://fmc.local:8443/api/x?bulk=true"),
            "/api/x?bulk=true"
        );
        assert_eq!(url_path("/relative"), "/relative");
    }
}
