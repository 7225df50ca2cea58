use futures::future::{BoxFuture, FutureExt};
use reqwest::header::ACCEPT;
use reqwest::RequestBuilder;
use serde_json::Value;
use url::Url;

use crate::error::{HarvestError, Result};

pub const TOKEN_PATH: &str = "/oauth2/token";

/// JSON transport to the Harvest API.
///
/// Callers supply the access token; implementations own the base URL.
pub trait Transport: Send + Sync {
  fn get(&self, path: &str, token: &str) -> BoxFuture<'static, Result<Value>>;

  fn post(&self, path: &str, token: &str, body: Option<Value>) -> BoxFuture<'static, Result<Value>>;

  /// Form-encoded POST to the OAuth token endpoint.
  fn exchange(&self, form: Vec<(&'static str, String)>) -> BoxFuture<'static, Result<Value>>;
}

/// Harvest API client over reqwest
#[derive(Clone)]
pub struct HttpTransport {
  http: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str) -> color_eyre::Result<Self> {
    use color_eyre::eyre::eyre;

    let mut base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid Harvest URL {}: {}", base_url, e))?;
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .user_agent(concat!("hrvst/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  fn url(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| HarvestError::transport(path, None, e))
  }

  fn dispatch(&self, path: &str, request: Result<RequestBuilder>) -> BoxFuture<'static, Result<Value>> {
    let path = path.to_string();
    async move {
      let request = request?.header(ACCEPT, "application/json");
      send(&path, request).await
    }
    .boxed()
  }
}

impl Transport for HttpTransport {
  fn get(&self, path: &str, token: &str) -> BoxFuture<'static, Result<Value>> {
    let request = self
      .url(path)
      .map(|url| self.http.get(url).query(&[("access_token", token)]));
    self.dispatch(path, request)
  }

  fn post(&self, path: &str, token: &str, body: Option<Value>) -> BoxFuture<'static, Result<Value>> {
    let request = self.url(path).map(|url| {
      let request = self.http.post(url).query(&[("access_token", token)]);
      match body {
        Some(body) => request.json(&body),
        None => request,
      }
    });
    self.dispatch(path, request)
  }

  fn exchange(&self, form: Vec<(&'static str, String)>) -> BoxFuture<'static, Result<Value>> {
    let request = self
      .url(TOKEN_PATH)
      .map(|url| self.http.post(url).form(&form));
    self.dispatch(TOKEN_PATH, request)
  }
}

async fn send(path: &str, request: RequestBuilder) -> Result<Value> {
  let response = request
    .send()
    .await
    .map_err(|e| HarvestError::transport(path, e.status().map(|s| s.as_u16()), e))?;

  let status = response.status();
  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    return Err(HarvestError::transport(
      path,
      Some(status.as_u16()),
      format!("{} {}", status, body.trim()).trim_end(),
    ));
  }

  let bytes = response
    .bytes()
    .await
    .map_err(|e| HarvestError::transport(path, Some(status.as_u16()), e))?;

  if bytes.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }

  serde_json::from_slice(&bytes).map_err(|e| HarvestError::data_quality(path, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use mockito::Matcher;
  use serde_json::json;

  #[tokio::test]
  async fn test_get_attaches_access_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/daily")
      .match_query(Matcher::UrlEncoded("access_token".into(), "secret".into()))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"day_entries":[],"projects":[]}"#)
      .create_async()
      .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let body = transport.get("/daily", "secret").await.unwrap();

    mock.assert_async().await;
    assert_eq!(body, json!({ "day_entries": [], "projects": [] }));
  }

  #[tokio::test]
  async fn test_error_status_is_transport_failure() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("GET", "/account/who_am_i")
      .match_query(Matcher::Any)
      .with_status(401)
      .with_body("unauthorized")
      .create_async()
      .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let err = transport.get("/account/who_am_i", "stale").await.unwrap_err();

    assert_eq!(err.status(), Some(401));
  }

  #[tokio::test]
  async fn test_post_sends_json_body() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/daily/add")
      .match_query(Matcher::UrlEncoded("access_token".into(), "secret".into()))
      .match_body(Matcher::Json(json!({ "project_id": 1, "task_id": 2 })))
      .with_status(201)
      .with_body(r#"{"id": 55}"#)
      .create_async()
      .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let body = transport
      .post("/daily/add", "secret", Some(json!({ "project_id": 1, "task_id": 2 })))
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(body["id"], 55);
  }

  #[tokio::test]
  async fn test_empty_body_is_null() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/daily/timer/9")
      .match_query(Matcher::Any)
      .with_status(200)
      .create_async()
      .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let body = transport.post("/daily/timer/9", "secret", None).await.unwrap();

    assert_eq!(body, Value::Null);
  }

  #[tokio::test]
  async fn test_exchange_posts_form() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/oauth2/token")
      .match_body(Matcher::AllOf(vec![
        Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
        Matcher::UrlEncoded("refresh_token".into(), "r1".into()),
      ]))
      .with_status(200)
      .with_body(r#"{"access_token":"a2","refresh_token":"r2","expires_in":64799}"#)
      .create_async()
      .await;

    let transport = HttpTransport::new(&server.url()).unwrap();
    let body = transport
      .exchange(vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", "r1".to_string()),
      ])
      .await
      .unwrap();

    mock.assert_async().await;
    assert_eq!(body["access_token"], "a2");
  }
}
