#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;

/// A request as the mock upstream saw it
#[derive(Debug, Clone)]
pub struct Recorded
{   pub method: String
  , pub path: String
  , pub headers: HashMap<String, String>
  , pub body: String
}

impl Recorded
{   pub fn json(&self) -> serde_json::Value
    {   serde_json::from_str(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str>
    {   self.headers.get(name).map(String::as_str)
    }
}

/// Canned behaviour for one route
#[derive(Debug, Clone)]
pub enum Reply
{   Json(u16, String)
  , /// Accept the request and never answer
    Hang
}

#[derive(Clone)]
struct MockState
{   routes: Arc<HashMap<(Method, String), Reply>>
  , seen: Arc<Mutex<Vec<Recorded>>>
}

pub struct MockUpstream
{   pub base: String
  , requests: Arc<Mutex<Vec<Recorded>>>
  , _task: tokio::task::JoinHandle<()>
}

const PREFIX: &str = "/api/v1";

pub fn init_logger()
{   let _ = env_logger::builder().is_test(true).try_init();
}

/// Relay config for a local base URL, bypassing any system proxy
pub fn local_config(base: &str, key: Option<&str>) -> kaiwa_relay::RelayConfig
{   let mut config = kaiwa_relay::RelayConfig::default()
      .with_api_base(base)
      .with_no_proxy();
    config.api_key = key.map(str::to_string);
    config
}

impl MockUpstream
{   /// Serve `routes`, keyed by method and path below /api/v1
    pub async fn start(routes: Vec<(&str, &str, Reply)>) -> Self
    {   init_logger();

        let routes: HashMap<(Method, String), Reply> = routes
          .into_iter()
          .map(|(m, p, r)| {
            let method = Method::from_bytes(m.as_bytes()).unwrap();
            ((method, format!("{}{}", PREFIX, p)), r)
          })
          .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState
        {   routes: Arc::new(routes)
          , seen: requests.clone()
        };
        let app = Router::new().fallback(handle).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _task = tokio::spawn(async move {
          let _ = axum::serve(listener, app).await;
        });

        MockUpstream
        {   base: format!("http://{}{}", addr, PREFIX)
          , requests
          , _task
        }
    }

    pub fn requests(&self) -> Vec<Recorded>
    {   self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded>
    {   let full = format!("{}{}", PREFIX, path);
        self.requests()
          .into_iter()
          .filter(|r| r.path == full)
          .collect()
    }

    pub fn config(&self, key: Option<&str>) -> kaiwa_relay::RelayConfig
    {   local_config(&self.base, key)
    }
}

async fn handle(
  State(state): State<MockState>
, method: Method
, uri: Uri
, headers: HeaderMap
, body: Bytes
) -> Response
{   let path = uri.path().to_string();
    let reply = state.routes
      .get(&(method.clone(), path.clone()))
      .cloned()
      .unwrap_or_else(|| {
        Reply::Json(404, r#"{"error":{"message":"no such route"}}"#.to_string())
      });

    state.seen.lock().unwrap().push(Recorded
    {   method: method.to_string()
      , path
      , headers: headers
          .iter()
          .map(|(k, v)| {
            (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string())
          })
          .collect()
      , body: String::from_utf8_lossy(&body).to_string()
    });

    match reply
    {   Reply::Json(status, body) => {
          let status = StatusCode::from_u16(status).unwrap();
          (status, [(header::CONTENT_TYPE, "application/json")], body)
            .into_response()
        }
      , Reply::Hang => {
          std::future::pending::<Response>().await
        }
    }
}

/// A base URL nobody listens on
pub async fn dead_base() -> String
{   let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}{}", addr, PREFIX)
}

pub fn completion(content: &str) -> Reply
{   Reply::Json(200, serde_json::json!({
      "choices": [{
        "message": {"role": "assistant", "content": content},
        "finish_reason": "stop"
      }],
      "usage": {"prompt_tokens": 42, "completion_tokens": 7, "total_tokens": 49}
    }).to_string())
}
