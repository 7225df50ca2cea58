//! OAuth2 token lifecycle: code exchange, refresh, and token-bearing requests.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::api_types::{decode, TokenResponse};
use super::client::{Transport, TOKEN_PATH};
use crate::error::{HarvestError, Result};
use crate::options::{keys, OptionStore};

pub const WHO_AM_I_PATH: &str = "/account/who_am_i";

/// How `authorize` got to a usable access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorized {
  /// The stored access token was accepted
  TokenValid,
  /// The stored token was rejected and a refresh succeeded
  Refreshed,
}

/// Owns the bearer token and attaches it to every API request.
pub struct TokenAuthority {
  transport: Arc<dyn Transport>,
  options: Arc<dyn OptionStore>,
}

impl TokenAuthority {
  pub fn new(transport: Arc<dyn Transport>, options: Arc<dyn OptionStore>) -> Self {
    Self { transport, options }
  }

  fn access_token(&self) -> String {
    self.options.get(keys::ACCESS_TOKEN).unwrap_or_default()
  }

  /// GET `path` with the current access token.
  pub async fn get(&self, path: &str) -> Result<Value> {
    self.transport.get(path, &self.access_token()).await
  }

  /// POST to `path` with the current access token.
  pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
    self.transport.post(path, &self.access_token(), body).await
  }

  /// Identity probe.
  pub async fn whoami(&self) -> Result<Value> {
    self.get(WHO_AM_I_PATH).await
  }

  /// Make sure the stored access token is usable.
  ///
  /// Without an authorization code on record this fails with `NotLoggedIn`
  /// before touching the network. A rejected probe gets exactly one refresh;
  /// the refresh failure is what the caller sees.
  pub async fn authorize(&self) -> Result<Authorized> {
    if self.options.get_non_empty(keys::CODE).is_none() {
      return Err(HarvestError::NotLoggedIn);
    }

    match self.whoami().await {
      Ok(_) => Ok(Authorized::TokenValid),
      Err(probe) => {
        warn!(error = %probe, "access token rejected, refreshing");
        self.refresh().await?;
        Ok(Authorized::Refreshed)
      }
    }
  }

  /// Record an authorization code and trade it for tokens.
  pub async fn login(&self, code: &str) -> Result<()> {
    self.options.set(keys::CODE, code);
    self.options.save()?;
    self.exchange_code().await
  }

  /// Forget the authorization code and tokens.
  pub fn logout(&self) -> Result<()> {
    for key in [
      keys::CODE,
      keys::ACCESS_TOKEN,
      keys::REFRESH_TOKEN,
      keys::EXPIRES_IN,
    ] {
      self.options.remove(key);
    }
    self.options.save()
  }

  /// Exchange the stored authorization code (`grant_type=authorization_code`).
  pub async fn exchange_code(&self) -> Result<()> {
    let code = self
      .options
      .get_non_empty(keys::CODE)
      .ok_or(HarvestError::NotLoggedIn)?;

    let form = vec![
      ("code", code),
      ("client_id", self.option(keys::CLIENT_ID)),
      ("client_secret", self.option(keys::CLIENT_SECRET)),
      ("redirect_uri", self.option(keys::REDIRECT_URI)),
      ("grant_type", "authorization_code".to_string()),
    ];

    let body = self.transport.exchange(form).await?;
    self.on_token_response(body)
  }

  /// Exchange the stored refresh token (`grant_type=refresh_token`).
  pub async fn refresh(&self) -> Result<()> {
    let refresh_token = self
      .options
      .get_non_empty(keys::REFRESH_TOKEN)
      .ok_or_else(|| HarvestError::AuthenticationExpired("no refresh token on record".into()))?;

    let form = vec![
      ("refresh_token", refresh_token),
      ("client_id", self.option(keys::CLIENT_ID)),
      ("client_secret", self.option(keys::CLIENT_SECRET)),
      ("grant_type", "refresh_token".to_string()),
    ];

    match self.transport.exchange(form).await {
      Ok(body) => self.on_token_response(body),
      Err(e @ HarvestError::Transport { status: Some(400 | 401), .. }) => {
        Err(HarvestError::AuthenticationExpired(e.to_string()))
      }
      Err(e) => Err(e),
    }
  }

  fn option(&self, key: &str) -> String {
    self.options.get(key).unwrap_or_default()
  }

  /// Persist a token triple. Nothing is written unless the body is a complete
  /// token response.
  fn on_token_response(&self, body: Value) -> Result<()> {
    if let Some(error) = body.get("error") {
      let reason = body
        .get("error_description")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| error.to_string());
      return Err(HarvestError::AuthenticationExpired(reason));
    }

    let tokens: TokenResponse = decode(TOKEN_PATH, body)?;
    info!(expires_in = ?tokens.expires_in, "received access token");

    self.options.set(keys::ACCESS_TOKEN, &tokens.access_token);
    if let Some(refresh_token) = &tokens.refresh_token {
      self.options.set(keys::REFRESH_TOKEN, refresh_token);
    }
    match tokens.expires_in {
      Some(expires_in) => self.options.set(keys::EXPIRES_IN, &expires_in.to_string()),
      None => self.options.remove(keys::EXPIRES_IN),
    }
    self.options.save()?;

    debug!("token state saved");
    Ok(())
  }
}
