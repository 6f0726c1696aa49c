use std::sync::{Arc, Weak};

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::protocol::{Page, Pagination};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::ClientSettings,
    error::ClientError,
    token_store::{is_valid, valid_token, TokenStore},
};

pub trait AuthFailureHook: Send + Sync {
    fn active_epoch(&self) -> Option<u64>;
    fn session_rejected(&self, epoch: u64);
}

struct DetachedSession;

impl AuthFailureHook for DetachedSession {
    fn active_epoch(&self) -> Option<u64> {
        None
    }

    fn session_rejected(&self, _epoch: u64) {}
}

enum Bearer {
    Stored,
    Explicit(String),
    Anonymous,
}

#[derive(Clone)]
pub struct RequestPipeline {
    http: Client,
    base_url: Url,
    store: Arc<dyn TokenStore>,
    hook: Weak<dyn AuthFailureHook>,
}

impl RequestPipeline {
    pub fn new(
        settings: &ClientSettings,
        http: Client,
        store: Arc<dyn TokenStore>,
    ) -> Result<Self, ClientError> {
        let hook: Weak<dyn AuthFailureHook> = Weak::<DetachedSession>::new();
        Ok(Self::from_parts(http, base_url(settings)?, store, hook))
    }

    pub(crate) fn from_parts(
        http: Client,
        base_url: Url,
        store: Arc<dyn TokenStore>,
        hook: Weak<dyn AuthFailureHook>,
    ) -> Self {
        Self {
            http,
            base_url,
            store,
            hook,
        }
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ClientError::Config(format!("invalid endpoint path '{path}': {err}")))
    }

    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        Ok(self.http.request(method, self.endpoint(path)?))
    }

    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        self.dispatch(builder, Bearer::Stored).await
    }

    /// Never reports 401s; used for sign-in.
    pub async fn send_anonymous(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        self.dispatch(builder, Bearer::Anonymous).await
    }

    pub(crate) async fn send_with_token(
        &self,
        builder: RequestBuilder,
        token: String,
    ) -> Result<Response, ClientError> {
        self.dispatch(builder, Bearer::Explicit(token)).await
    }

    async fn dispatch(
        &self,
        builder: RequestBuilder,
        bearer: Bearer,
    ) -> Result<Response, ClientError> {
        let (builder, authenticated, epoch) = match bearer {
            Bearer::Stored => {
                let epoch = self.hook.upgrade().and_then(|hook| hook.active_epoch());
                match valid_token(self.store.as_ref()) {
                    Some(token) => (builder.bearer_auth(token), true, epoch),
                    None => (builder, false, epoch),
                }
            }
            Bearer::Explicit(token) if is_valid(Some(token.as_str())) => {
                (builder.bearer_auth(token.trim()), true, None)
            }
            Bearer::Explicit(_) | Bearer::Anonymous => (builder, false, None),
        };

        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, url = %url.path(), authenticated, "pipeline: sending request");

        let response = self.http.execute(request).await.map_err(|err| {
            debug!(%method, url = %url.path(), "pipeline: transport failure: {err}");
            ClientError::Transport(err)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ClientError::from_status(status, &body);
        if status == StatusCode::UNAUTHORIZED {
            self.report_unauthorized(&method, &url, epoch);
        } else {
            debug!(%method, url = %url.path(), status = status.as_u16(), "pipeline: request failed");
        }
        Err(error)
    }

    fn report_unauthorized(&self, method: &Method, url: &Url, epoch: Option<u64>) {
        let Some(epoch) = epoch else {
            debug!(%method, url = %url.path(), "pipeline: unauthorized response outside an active session");
            return;
        };
        warn!(%method, url = %url.path(), epoch, "pipeline: unauthorized response, invalidating session");
        if let Some(hook) = self.hook.upgrade() {
            hook.session_rejected(epoch);
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.send(self.request(Method::GET, path)?).await?;
        decode_json(response).await
    }

    pub async fn get_query<Q, T>(&self, path: &str, query: &Q) -> Result<T, ClientError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::GET, path)?.query(query))
            .await?;
        decode_json(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::POST, path)?.json(body))
            .await?;
        decode_json(response).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .send(self.request(Method::PUT, path)?.json(body))
            .await?;
        decode_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.send(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }

    pub async fn fetch_page<Q, T>(
        &self,
        path: &str,
        query: &Q,
        rows_key: &str,
    ) -> Result<Page<T>, ClientError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body: Value = self.get_query(path, query).await?;
        page_from_value(body, rows_key)
    }
}

pub(crate) fn base_url(settings: &ClientSettings) -> Result<Url, ClientError> {
    let server = settings.server_url.trim().trim_end_matches('/');
    let prefix = settings.api_prefix.trim().trim_matches('/');
    let raw = if prefix.is_empty() {
        format!("{server}/")
    } else {
        format!("{server}/{prefix}/")
    };
    let url = Url::parse(&raw)
        .map_err(|err| ClientError::Config(format!("invalid server url '{raw}': {err}")))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Config(format!(
            "server url must be http:// or https://, got '{raw}'"
        )));
    }
    Ok(url)
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return serde_json::from_value(Value::Null)
            .map_err(|err| ClientError::Decode(format!("empty response body: {err}")));
    }
    serde_json::from_slice(&bytes).map_err(|err| ClientError::Decode(err.to_string()))
}

pub(crate) fn page_from_value<T: DeserializeOwned>(
    body: Value,
    rows_key: &str,
) -> Result<Page<T>, ClientError> {
    let pagination = body
        .pointer("/data/pagination")
        .or_else(|| body.get("pagination"))
        .cloned()
        .and_then(|value| serde_json::from_value::<Pagination>(value).ok());

    let rows = [
        body.get("data").and_then(|data| data.get(rows_key)),
        body.get(rows_key),
        body.get("data"),
        Some(&body),
    ]
    .into_iter()
    .flatten()
    .find(|candidate| candidate.is_array())
    .cloned()
    .ok_or_else(|| ClientError::Decode(format!("no '{rows_key}' rows in list response")))?;

    let rows: Vec<T> =
        serde_json::from_value(rows).map_err(|err| ClientError::Decode(err.to_string()))?;
    Ok(Page::new(rows, pagination))
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
