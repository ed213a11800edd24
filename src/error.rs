use std::fmt;

/// The three ways a relay call can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind
{   /// Upstream answered with a non-success status
    UpstreamHttp
  , /// Request went out but nothing usable came back
    NoResponse
  , /// Anything raised on our side of the wire
    Local
}

/// Normalized error for every relay operation
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq)]
pub enum Error
{   /// Upstream rejected the request
    UpstreamHttp
    {   status: u16
      , status_text: String
      , /// Upstream error body, JSON when it parses
        details: serde_json::Value
    }
  , /// Connection refused, DNS failure, reset or timeout
    NoResponse
    {   reason: String
    }
  , /// Malformed payload, bad options, missing key, ...
    Local
    {   message: String
      , details: Option<String>
    }
  , /// Model listing failed; keeps the classified cause
    ModelsUnavailable(Box<Error>)
}

impl Error
{   pub fn local(message: impl Into<String>) -> Self
    {   Error::Local
        {   message: message.into()
          , details: None
        }
    }

    pub fn local_with(
      message: impl Into<String>
    , details: impl Into<String>
    ) -> Self
    {   Error::Local
        {   message: message.into()
          , details: Some(details.into())
        }
    }

    /// Taxonomy bucket; wrapped catalog errors report their cause
    pub fn kind(&self) -> ErrorKind
    {   match self
        {   Error::UpstreamHttp { .. } => ErrorKind::UpstreamHttp
          , Error::NoResponse { .. } => ErrorKind::NoResponse
          , Error::Local { .. } => ErrorKind::Local
          , Error::ModelsUnavailable(cause) => cause.kind()
        }
    }

    /// Diagnostic payload, if any
    pub fn details(&self) -> Option<String>
    {   match self
        {   Error::UpstreamHttp { details, .. } => {
              match details
              {   serde_json::Value::Null => None
                , serde_json::Value::String(s) => Some(s.clone())
                , other => Some(other.to_string())
              }
            }
          , Error::NoResponse { reason } => Some(reason.clone())
          , Error::Local { details, .. } => details.clone()
          , Error::ModelsUnavailable(cause) => Some(cause.to_string())
        }
    }

    /// Upstream status code, if the upstream answered at all
    pub fn status(&self) -> Option<u16>
    {   match self
        {   Error::UpstreamHttp { status, .. } => Some(*status)
          , Error::ModelsUnavailable(cause) => cause.status()
          , _ => None
        }
    }
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::UpstreamHttp { status, status_text, .. } => {
              write!(f, "HTTP {}: {}", status, status_text)
            }
          , Error::NoResponse { reason } => {
              write!(f,
                "No response received from upstream API: {}",
                reason
              )
            }
          , Error::Local { message, .. } => {
              write!(f, "{}", message)
            }
          , Error::ModelsUnavailable(cause) => {
              write!(f,
                "Failed to fetch available models ({})",
                cause
              )
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<String> for Error
{   fn from(s: String) -> Self
    {   Error::local(s)
    }
}

impl From<&str> for Error
{   fn from(s: &str) -> Self
    {   Error::local(s)
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn upstream_message_carries_status()
    {   let err = Error::UpstreamHttp
        {   status: 401
          , status_text: "Unauthorized".to_string()
          , details: serde_json::json!({"error": {"message": "invalid key"}})
        };
        assert_eq!(err.to_string(), "HTTP 401: Unauthorized");
        assert_eq!(err.kind(), ErrorKind::UpstreamHttp);
        assert!(err.details().unwrap().contains("invalid key"));
    }

    #[test]
    fn models_unavailable_keeps_cause_kind()
    {   let cause = Error::NoResponse
        {   reason: "connection refused".to_string()
        };
        let err = Error::ModelsUnavailable(Box::new(cause));
        assert_eq!(err.kind(), ErrorKind::NoResponse);
        assert!(err.to_string()
          .starts_with("Failed to fetch available models"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn strings_become_local_errors()
    {   let err: Error = "boom".into();
        assert_eq!(err.kind(), ErrorKind::Local);
        assert_eq!(err.details(), None);
    }
}
