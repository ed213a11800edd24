//! Upstream wire types, payload construction and reply extraction

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use log::{debug, error, trace};
use crate::classify::{classify, Fault};

/// Body of POST /chat/completions
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a>
{   pub model: &'a str
  , pub messages: &'a [crate::ConversationMessage]
  , pub temperature: f32
  , pub max_tokens: u32
  , pub stream: bool
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse
{   #[serde(default)]
    pub choices: Option<Vec<Choice>>
  , /// Kept raw; a malformed usage must not sink the reply
    #[serde(default)]
    pub usage: Option<serde_json::Value>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   #[serde(default)]
    pub message: Option<ChoiceMessage>
  , #[serde(default)]
    pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage
{   #[serde(default)]
    pub role: Option<String>
  , #[serde(default)]
    pub content: Option<String>
}

/// Body of GET /models
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse
{   #[serde(default)]
    pub data: Option<Vec<ModelEntry>>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry
{   pub id: String
  , #[serde(default)]
    pub name: Option<String>
}

/// Borrow the prepared messages into a fresh request body
pub fn build_request<'a>(
  model: &'a str
, messages: &'a [crate::ConversationMessage]
, options: &crate::GenerationOptions
) -> ChatCompletionRequest<'a>
{   ChatCompletionRequest
    {   model
      , messages
      , temperature: options.temperature
      , max_tokens: options.max_tokens
      , stream: options.stream
    }
}

/// Decode a success body; failures are malformed-payload faults
pub fn parse_payload<T: DeserializeOwned>(body: &[u8])
  -> Result<T, Fault>
{   serde_json::from_slice(body).map_err(|e| {
      trace!("Undecodable body: {}", String::from_utf8_lossy(body));
      Fault::Payload(e.to_string())
    })
}

/// Turn a completion payload into the reply handed to the caller
pub fn process_response(response: ChatCompletionResponse)
  -> Result<crate::ChatReply, crate::error::Error>
{   let ChatCompletionResponse { choices, usage } = response;

    let first = choices
      .and_then(|c| c.into_iter().next())
      .ok_or_else(|| {
        error!("No choices in upstream response");
        classify(Fault::NoChoices)
      })?;

    if let Some(reason) = &first.finish_reason
    {   trace!("First choice finish_reason: {}", reason);
    }

    let content = first.message
      .and_then(|m| m.content)
      .ok_or_else(|| {
        error!("First choice carried no message content");
        classify(Fault::Payload(
          "first choice has no message content".to_string()
        ))
      })?;

    let usage = usage.and_then(crate::TokenUsage::from_value);
    debug!("Response processed ({:?})", usage);
    Ok(crate::ChatReply
    {   text: content.trim().to_string()
      , usage
    })
}

/// Project catalog entries; a blank name falls back to the id
pub fn project_models(response: ModelsResponse)
  -> Vec<crate::ModelDescriptor>
{   response.data
      .unwrap_or_default()
      .into_iter()
      .map(|m| {
        let name = m.name
          .filter(|n| !n.trim().is_empty())
          .unwrap_or_else(|| m.id.clone());
        crate::ModelDescriptor { id: m.id, name }
      })
      .collect()
}

#[cfg(test)]
mod tests
{   use super::*;
    use crate::error::ErrorKind;
    use crate::{ConversationMessage, GenerationOptions, ModelDescriptor};

    fn response(json: &str) -> ChatCompletionResponse
    {   parse_payload(json.as_bytes()).unwrap()
    }

    #[test]
    fn request_body_shape()
    {   let messages = vec![ConversationMessage::user("こんにちは")];
        let body = build_request(
          "google/gemma-3-4b-it:free",
          &messages,
          &GenerationOptions::default()
        );
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "google/gemma-3-4b-it:free");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["stream"], false);
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn reply_is_trimmed_and_usage_copied()
    {   let reply = process_response(response(r#"{
          "choices": [{"message": {"role": "assistant", "content": "  こんにちは  "}}],
          "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#)).unwrap();
        assert_eq!(reply.text, "こんにちは");
        let usage = reply.usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(12));
        assert_eq!(usage.completion_tokens, Some(3));
        assert_eq!(usage.total_tokens, Some(15));
        assert!(usage.extra.is_empty());
    }

    #[test]
    fn usage_extras_survive_the_round_trip()
    {   let reply = process_response(response(r#"{
          "choices": [{"message": {"content": "hi"}}],
          "usage": {
            "prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3,
            "cost": 0.0012,
            "prompt_tokens_details": {"cached_tokens": 0}
          }
        }"#)).unwrap();
        let usage = reply.usage.unwrap();
        assert_eq!(usage.total_tokens, Some(3));

        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["cost"], 0.0012);
        assert_eq!(json["prompt_tokens_details"]["cached_tokens"], 0);
        assert_eq!(json["prompt_tokens"], 1);
    }

    #[test]
    fn odd_usage_never_sinks_the_reply()
    {   let reply = process_response(response(r#"{
          "choices": [{"message": {"content": "hi"}}],
          "usage": {"prompt_tokens": 1, "completion_tokens": null, "total_tokens": 1}
        }"#)).unwrap();
        assert_eq!(reply.text, "hi");
        let usage = reply.usage.unwrap();
        assert_eq!(usage.prompt_tokens, Some(1));
        assert_eq!(usage.completion_tokens, None);

        let reply = process_response(response(r#"{
          "choices": [{"message": {"content": "hi"}}],
          "usage": {"prompt_tokens": "12", "total_tokens": 12}
        }"#)).unwrap();
        let usage = reply.usage.unwrap();
        assert_eq!(usage.prompt_tokens, None);
        assert_eq!(usage.extra["prompt_tokens"], "12");
        assert_eq!(usage.extra["total_tokens"], 12);

        let reply = process_response(response(r#"{
          "choices": [{"message": {"content": "hi"}}],
          "usage": "n/a"
        }"#)).unwrap();
        assert_eq!(reply.usage, None);
    }

    #[test]
    fn usage_is_optional()
    {   let reply = process_response(response(
          r#"{"choices": [{"message": {"role": "assistant", "content": "はい"}}]}"#
        )).unwrap();
        assert_eq!(reply.usage, None);
    }

    #[test]
    fn missing_or_empty_choices_fail_locally()
    {   for body in [r#"{"choices": []}"#, "{}", r#"{"choices": null}"#]
        {   let err = process_response(response(body)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Local);
            assert!(err.to_string().contains("No response choices"));
        }
    }

    #[test]
    fn choice_without_content_fails_locally()
    {   let err = process_response(response(
          r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#
        )).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Local);
    }

    #[test]
    fn names_fall_back_to_ids()
    {   let models: ModelsResponse = parse_payload(
          br#"{"data": [{"id": "m1"}, {"id": "m2", "name": "Model Two"}, {"id": "m3", "name": ""}]}"#
        ).unwrap();
        assert_eq!(project_models(models), vec![
          ModelDescriptor { id: "m1".into(), name: "m1".into() }
        , ModelDescriptor { id: "m2".into(), name: "Model Two".into() }
        , ModelDescriptor { id: "m3".into(), name: "m3".into() }
        ]);
    }

    #[test]
    fn missing_catalog_is_empty()
    {   let models: ModelsResponse = parse_payload(b"{}").unwrap();
        assert!(project_models(models).is_empty());
    }

    #[test]
    fn garbage_is_a_payload_fault()
    {   let fault = parse_payload::<ChatCompletionResponse>(b"data: {")
          .unwrap_err();
        assert!(matches!(fault, Fault::Payload(_)));
    }
}
