//! Normalizes raw upstream faults into the relay error taxonomy

use log::{error, warn};

/// Anything that went wrong between building a request and
/// holding a decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault
{   /// Upstream answered, but not with a 2xx
    Status
    {   status: u16
      , status_text: String
      , body: String
    }
  , /// The HTTP client gave up
    Transport(TransportFault)
  , /// Success status, undecodable body
    Payload(String)
  , /// Decoded fine, but nothing to answer with
    NoChoices
  , /// Could not even build the request
    Request(String)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind
{   Timeout
  , Connect
  , Request
  , Body
  , Redirect
  , Decode
  , Builder
  , Other
}

/// What we keep of a reqwest::Error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFault
{   pub kind: TransportKind
  , pub message: String
}

impl TransportFault
{   pub fn new(kind: TransportKind, message: impl Into<String>) -> Self
    {   TransportFault
        {   kind
          , message: message.into()
        }
    }
}

impl From<&reqwest::Error> for TransportFault
{   fn from(e: &reqwest::Error) -> Self
    {   let kind = if e.is_timeout()
        {   TransportKind::Timeout
        } else if e.is_connect()
        {   TransportKind::Connect
        } else if e.is_builder()
        {   TransportKind::Builder
        } else if e.is_decode()
        {   TransportKind::Decode
        } else if e.is_redirect()
        {   TransportKind::Redirect
        } else if e.is_body()
        {   TransportKind::Body
        } else if e.is_request()
        {   TransportKind::Request
        } else
        {   TransportKind::Other
        };

        // reqwest's Display hides the interesting part in the source chain
        let mut message = e.to_string();
        let mut source = std::error::Error::source(e);
        while let Some(cause) = source
        {   message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        TransportFault { kind, message }
    }
}

impl From<reqwest::Error> for Fault
{   fn from(e: reqwest::Error) -> Self
    {   Fault::Transport(TransportFault::from(&e))
    }
}

impl Fault
{   pub fn from_status(status: reqwest::StatusCode, body: String) -> Self
    {   Fault::Status
        {   status: status.as_u16()
          , status_text: status
              .canonical_reason()
              .unwrap_or("Unknown Status")
              .to_string()
          , body
        }
    }
}

/// Map every fault to exactly one error kind. Never retries.
pub fn classify(fault: Fault) -> crate::error::Error
{   match fault
    {   Fault::Status { status, status_text, body } => {
          let details = if body.trim().is_empty()
          {   serde_json::Value::Null
          } else
          {   serde_json::from_str(&body)
                .unwrap_or(serde_json::Value::String(body))
          };
          warn!("Upstream returned HTTP {} {}: {}", status, status_text, details);
          crate::error::Error::UpstreamHttp
          {   status
            , status_text
            , details
          }
        }
      , Fault::Transport(t) => match t.kind
        {   TransportKind::Builder | TransportKind::Decode => {
              error!("Local HTTP client failure: {}", t.message);
              crate::error::Error::local_with(
                "Failed to build or decode upstream request"
              , t.message
              )
            }
          , _ => {
              warn!("No response from upstream ({:?}): {}", t.kind, t.message);
              crate::error::Error::NoResponse
              {   reason: t.message
              }
            }
        }
      , Fault::Payload(msg) => {
          error!("Malformed upstream payload: {}", msg);
          crate::error::Error::local_with(
            "Malformed response payload from upstream"
          , msg
          )
        }
      , Fault::NoChoices => {
          crate::error::Error::local(
            "No response choices received from upstream"
          )
        }
      , Fault::Request(msg) => {
          error!("Request construction failed: {}", msg);
          crate::error::Error::local(msg)
        }
    }
}
