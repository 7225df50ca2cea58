//! In-memory transport for exercising the client without a network.

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

use super::client::{Transport, TOKEN_PATH};
use crate::error::{HarvestError, Result};

#[derive(Debug, Clone)]
pub struct Call {
  pub method: &'static str,
  pub path: String,
  pub token: Option<String>,
  pub body: Option<Value>,
}

/// Transport answering from a fixed route table and recording every call.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<HashMap<String, Result<Value>>>,
  calls: Mutex<Vec<Call>>,
  held: Mutex<HashMap<String, oneshot::Receiver<()>>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, method: &str, path: &str, response: Result<Value>) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(format!("{} {}", method, path), response);
    self
  }

  /// Delay the next answer for a route until the returned sender fires.
  ///
  /// The call is still recorded as soon as it is issued.
  pub fn hold(&self, method: &str, path: &str) -> oneshot::Sender<()> {
    let (release, gate) = oneshot::channel();
    self
      .held
      .lock()
      .unwrap()
      .insert(format!("{} {}", method, path), gate);
    release
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self, method: &str, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| c.method == method && c.path == path)
      .count()
  }

  fn answer(&self, call: Call) -> BoxFuture<'static, Result<Value>> {
    let key = format!("{} {}", call.method, call.path);
    let response = self
      .routes
      .lock()
      .unwrap()
      .get(&key)
      .cloned()
      .unwrap_or_else(|| Err(HarvestError::transport(&call.path, Some(404), "no route")));
    self.calls.lock().unwrap().push(call);

    match self.held.lock().unwrap().remove(&key) {
      Some(gate) => async move {
        gate.await.ok();
        response
      }
      .boxed(),
      None => future::ready(response).boxed(),
    }
  }
}

impl Transport for FakeTransport {
  fn get(&self, path: &str, token: &str) -> BoxFuture<'static, Result<Value>> {
    self.answer(Call {
      method: "GET",
      path: path.to_string(),
      token: Some(token.to_string()),
      body: None,
    })
  }

  fn post(&self, path: &str, token: &str, body: Option<Value>) -> BoxFuture<'static, Result<Value>> {
    self.answer(Call {
      method: "POST",
      path: path.to_string(),
      token: Some(token.to_string()),
      body,
    })
  }

  fn exchange(&self, form: Vec<(&'static str, String)>) -> BoxFuture<'static, Result<Value>> {
    let body = form
      .into_iter()
      .map(|(k, v)| (k.to_string(), Value::String(v)))
      .collect::<serde_json::Map<_, _>>();
    self.answer(Call {
      method: "POST",
      path: TOKEN_PATH.to_string(),
      token: None,
      body: Some(Value::Object(body)),
    })
  }
}
