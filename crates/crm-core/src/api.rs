use std::future::Future;
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use crm_shared::{
  ActivityCreate,
  ActivityDto,
  CompanyDto,
  ContactDto,
  DealDto,
  DealPatch,
  ListQuery,
  TaskCreate,
  TaskDto
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{
  debug,
  info,
  warn
};
use url::Url;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("invalid endpoint URL: {0}")]
  Url(#[from] url::ParseError),

  #[error("request to {path} failed: {source}")]
  Transport {
    path:   String,
    #[source]
    source: reqwest::Error
  },

  #[error("{path} returned HTTP {status}: {body}")]
  Status {
    path:   String,
    status: u16,
    body:   String
  },

  #[error("failed decoding {path} response: {source}")]
  Decode {
    path:   String,
    #[source]
    source: serde_json::Error
  }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The REST surface the client consumes.
/// Controllers are generic over it so
/// tests can swap in an in-memory
/// backend.
pub trait CrmApi {
  fn create_activity(
    &self,
    payload: &ActivityCreate
  ) -> impl Future<Output = ApiResult<ActivityDto>>
  + Send;

  fn create_task(
    &self,
    payload: &TaskCreate
  ) -> impl Future<Output = ApiResult<TaskDto>> + Send;

  fn get_deal(
    &self,
    id: u64
  ) -> impl Future<Output = ApiResult<DealDto>> + Send;

  fn update_deal(
    &self,
    id: u64,
    patch: &DealPatch
  ) -> impl Future<Output = ApiResult<DealDto>> + Send;

  fn list_activities(
    &self,
    deal_id: u64
  ) -> impl Future<
    Output = ApiResult<Vec<ActivityDto>>
  > + Send;

  fn list_tasks(
    &self,
    deal_id: u64
  ) -> impl Future<Output = ApiResult<Vec<TaskDto>>>
  + Send;

  fn list_companies(
    &self,
    query: &ListQuery
  ) -> impl Future<
    Output = ApiResult<Vec<CompanyDto>>
  > + Send;

  fn list_contacts(
    &self,
    query: &ListQuery
  ) -> impl Future<
    Output = ApiResult<Vec<ContactDto>>
  > + Send;

  fn list_deals(
    &self,
    query: &ListQuery
  ) -> impl Future<Output = ApiResult<Vec<DealDto>>>
  + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DealScope {
  deal_id: u64
}

#[derive(Debug, Clone)]
pub struct HttpApi {
  client: reqwest::Client,
  base:   Url,
  token:  Option<String>
}

impl HttpApi {
  #[tracing::instrument(skip(token))]
  pub fn new(
    base_url: &str,
    token: Option<String>,
    timeout: Duration
  ) -> anyhow::Result<Self> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
      return Err(anyhow!(
        "api.url is empty"
      ));
    }
    // Url::join replaces the last path
    // segment unless the base ends in '/'.
    let normalized =
      if trimmed.ends_with('/') {
        trimmed.to_string()
      } else {
        format!("{trimmed}/")
      };
    let base = Url::parse(&normalized)
      .with_context(|| {
        format!(
          "invalid api.url: {trimmed}"
        )
      })?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .context(
        "failed building HTTP client \
         for CRM API"
      )?;

    info!(base = %base, has_token = token.is_some(), "configured CRM API client");
    Ok(Self {
      client,
      base,
      token
    })
  }

  pub fn from_config(
    cfg: &Config
  ) -> anyhow::Result<Self> {
    Self::new(
      &cfg.api_url(),
      cfg.api_token(),
      Duration::from_secs(
        cfg.api_timeout_secs()?
      )
    )
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  fn endpoint(
    &self,
    path: &str
  ) -> ApiResult<Url> {
    Ok(self.base.join(path)?)
  }

  fn request(
    &self,
    method: reqwest::Method,
    path: &str
  ) -> ApiResult<reqwest::RequestBuilder>
  {
    let url = self.endpoint(path)?;
    let mut request =
      self.client.request(method, url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    Ok(request)
  }

  async fn send<T: DeserializeOwned>(
    &self,
    path: &str,
    request: reqwest::RequestBuilder
  ) -> ApiResult<T> {
    let response =
      request.send().await.map_err(
        |source| ApiError::Transport {
          path: path.to_string(),
          source
        }
      )?;

    let status = response.status();
    let body =
      response.bytes().await.map_err(
        |source| ApiError::Transport {
          path: path.to_string(),
          source
        }
      )?;

    if !status.is_success() {
      let body =
        String::from_utf8_lossy(&body)
          .into_owned();
      warn!(
        path,
        status = %status,
        "CRM API returned non-success status"
      );
      return Err(ApiError::Status {
        path: path.to_string(),
        status: status.as_u16(),
        body
      });
    }

    debug!(
      path,
      status = %status,
      bytes = body.len(),
      "CRM API response received"
    );
    serde_json::from_slice(&body).map_err(
      |source| ApiError::Decode {
        path: path.to_string(),
        source
      }
    )
  }

  async fn get<T, Q>(
    &self,
    path: &str,
    query: &Q
  ) -> ApiResult<T>
  where
    T: DeserializeOwned,
    Q: Serialize + ?Sized
  {
    let request = self
      .request(reqwest::Method::GET, path)?
      .query(query);
    self.send(path, request).await
  }

  async fn write<T, B>(
    &self,
    method: reqwest::Method,
    path: &str,
    body: &B
  ) -> ApiResult<T>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized
  {
    let request = self
      .request(method, path)?
      .json(body);
    self.send(path, request).await
  }
}

impl CrmApi for HttpApi {
  #[tracing::instrument(skip(self, payload), fields(kind = ?payload.kind))]
  async fn create_activity(
    &self,
    payload: &ActivityCreate
  ) -> ApiResult<ActivityDto> {
    self
      .write(
        reqwest::Method::POST,
        "activities",
        payload
      )
      .await
  }

  #[tracing::instrument(skip(self, payload), fields(priority = ?payload.priority))]
  async fn create_task(
    &self,
    payload: &TaskCreate
  ) -> ApiResult<TaskDto> {
    self
      .write(
        reqwest::Method::POST,
        "tasks",
        payload
      )
      .await
  }

  #[tracing::instrument(skip(self))]
  async fn get_deal(
    &self,
    id: u64
  ) -> ApiResult<DealDto> {
    self
      .get(&format!("deals/{id}"), &[] as &[(&str, &str)])
      .await
  }

  #[tracing::instrument(skip(self, patch))]
  async fn update_deal(
    &self,
    id: u64,
    patch: &DealPatch
  ) -> ApiResult<DealDto> {
    self
      .write(
        reqwest::Method::PUT,
        &format!("deals/{id}"),
        patch
      )
      .await
  }

  #[tracing::instrument(skip(self))]
  async fn list_activities(
    &self,
    deal_id: u64
  ) -> ApiResult<Vec<ActivityDto>> {
    self
      .get("activities", &DealScope {
        deal_id
      })
      .await
  }

  #[tracing::instrument(skip(self))]
  async fn list_tasks(
    &self,
    deal_id: u64
  ) -> ApiResult<Vec<TaskDto>> {
    self
      .get("tasks", &DealScope { deal_id })
      .await
  }

  #[tracing::instrument(skip(self))]
  async fn list_companies(
    &self,
    query: &ListQuery
  ) -> ApiResult<Vec<CompanyDto>> {
    self.get("companies", query).await
  }

  #[tracing::instrument(skip(self))]
  async fn list_contacts(
    &self,
    query: &ListQuery
  ) -> ApiResult<Vec<ContactDto>> {
    self.get("contacts", query).await
  }

  #[tracing::instrument(skip(self))]
  async fn list_deals(
    &self,
    query: &ListQuery
  ) -> ApiResult<Vec<DealDto>> {
    self.get("deals", query).await
  }
}
