pub mod error;
pub mod config;
pub mod persona;
pub mod providers;
pub mod request;
pub mod classify;
pub mod client;
use serde::{Deserialize, Serialize};

pub use client::RelayBackend;
pub use config::RelayConfig;
pub use error::{Error, ErrorKind};
pub use persona::{is_first_turn, persona_message, prepare_conversation};
pub use providers::openrouter::Dispatcher;

/*

kaiwa-relay: async relay between a chat front end and an
OpenAI-style completion endpoint (OpenRouter by default).
The caller resends the whole conversation every turn; the
relay injects the Kaiwa persona on the first turn, forwards
the call, trims the reply and normalizes every failure into
three kinds (upstream http / no response / local).

kaiwa-relay/
├── src/
│   ├── lib.rs          # Shared types and backend command args
│   ├── error.rs        # Error taxonomy
│   ├── config.rs       # RelayConfig + environment loading
│   ├── persona.rs      # Persona template and first-turn rule
│   ├── request.rs      # Upstream wire types and extraction
│   ├── classify.rs     # Raw fault -> Error
│   ├── providers/
│   │   ├── mod.rs
│   │   └── openrouter.rs  # Credentials + Dispatcher
│   ├── client.rs       # RelayBackend actor
│   └── bin/kaiwa_chat.rs
└── tests/

*/

/// RELAY API INTERFACE:

// ===== Chat =====

pub type ChatResult = Result<ChatReply, crate::error::Error>;
pub type ChatReplySender
  = tokio::sync::mpsc::UnboundedSender<ChatResult>;

pub struct ChatArgs
{   pub messages: Vec<ConversationMessage>
  , pub model: Option<String>
  , pub options: GenerationOptions
  , pub turn: Turn
  , pub reply: ChatReplySender
}

// ===== Connect =====

pub type ConnectReplySender
  = tokio::sync::mpsc::UnboundedSender<bool>;

pub struct ConnectArgs
{   pub reply: ConnectReplySender
}

// ===== GetModels =====

pub type GetModelsResult
  = Result<Vec<ModelDescriptor>, crate::error::Error>;
pub type GetModelsReplySender
  = tokio::sync::mpsc::UnboundedSender<GetModelsResult>;

pub struct GetModelsArgs
{   pub reply: GetModelsReplySender
}

// ===== SetApiKey =====

pub type SetApiKeyReplySender
  = tokio::sync::mpsc::UnboundedSender<()>;

pub struct SetApiKeyArgs
{   pub key: String
  , pub reply: SetApiKeyReplySender
}

// ===== GetApiKeyStatus =====

pub type ApiKeyStatusReplySender
  = tokio::sync::mpsc::UnboundedSender<bool>;

pub struct ApiKeyStatusArgs
{   pub reply: ApiKeyStatusReplySender
}

// ===== KillProcess =====

pub type KillProcessReplySender
  = tokio::sync::mpsc::UnboundedSender<()>;

pub struct KillProcessArgs
{   pub reply: KillProcessReplySender
}

/// RELAY STRUCTURES:

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   User
  , Assistant
  , System
}

/// One entry of the conversation the caller resends every turn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConversationMessage
{   pub role: Role
  , pub content: String
}

impl ConversationMessage
{   pub fn new(role: Role, content: impl Into<String>) -> Self
    {   ConversationMessage
        {   role
          , content: content.into()
        }
    }

    pub fn user(content: impl Into<String>) -> Self
    {   Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self
    {   Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self
    {   Self::new(Role::System, content)
    }
}

/// Sampling parameters for a single call.
/// Every field is optional on the wire; missing ones take
/// the defaults (0.7 / 1000 / false).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOptions
{   /// Sampling temperature, 0.0 ..= 2.0
    pub temperature: f32
  , /// Upper bound on generated tokens
    pub max_tokens: u32
  , /// Forwarded as-is; streamed bodies are not decoded
    pub stream: bool
}

impl Default for GenerationOptions
{   fn default() -> Self
    {   GenerationOptions
        {   temperature: 0.7
          , max_tokens: 1000
          , stream: false
        }
    }
}

impl GenerationOptions
{   /// Reject values the upstream would refuse anyway
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   if !self.temperature.is_finite()
          || !(0.0..=2.0).contains(&self.temperature)
        {   return Err(crate::error::Error::local(format!(
              "Invalid temperature {}: expected 0.0 ..= 2.0",
              self.temperature
            )));
        }
        if self.max_tokens == 0
        {   return Err(crate::error::Error::local(
              "Invalid max_tokens 0: expected at least 1"
            ));
        }
        Ok(())
    }
}

/// Token accounting, copied verbatim from the upstream payload.
/// Counters are typed when the upstream sends numbers; anything
/// else it reports (cost, token details, ...) rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct TokenUsage
{   #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>
  , #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>
  , #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>
}

impl TokenUsage
{   /// Never fails on an object: if the counters have odd types the
    /// whole object is kept untyped in `extra`.
    pub fn from_value(value: serde_json::Value) -> Option<TokenUsage>
    {   match value
        {   serde_json::Value::Object(map) => {
              let typed = serde_json::from_value(
                serde_json::Value::Object(map.clone())
              );
              Some(typed.unwrap_or_else(|e| {
                log::warn!("Keeping untyped usage ({})", e);
                TokenUsage
                {   extra: map
                  , ..Default::default()
                }
              }))
            }
          , serde_json::Value::Null => None
          , other => {
              log::warn!("Dropping non-object usage: {}", other);
              None
            }
        }
    }
}

/// What `chat` hands back to the route layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatReply
{   /// Assistant text, surrounding whitespace removed
    pub text: String
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>
}

/// A model as listed by the upstream catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelDescriptor
{   pub id: String
  , pub name: String
}

/// How the relay should treat the persona for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Turn
{   /// Decide from the shape of the message list
    #[default]
    Infer
  , /// Always prepend the persona
    First
  , /// Never prepend the persona
    Continuation
}

/// Free catalog entries the relay knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FreeModel
{   /// Google Gemma 3 4B instruct (default)
    #[default]
    Gemma3_4b
  , /// Meta Llama 3.2 1B preview
    Llama32_1b
  , /// Meta Llama 3.2 3B preview
    Llama32_3b
  , /// Microsoft Phi-3 mini, 4k context
    Phi3Mini
  , /// THUDM CodeGeeX4 9B
    CodeGeex4
}

impl FreeModel
{   pub const ALL: [FreeModel; 5] =
    [   FreeModel::Gemma3_4b
      , FreeModel::Llama32_1b
      , FreeModel::Llama32_3b
      , FreeModel::Phi3Mini
      , FreeModel::CodeGeex4
    ];

    /// Identifier as the upstream knows it
    pub fn id(&self) -> &'static str
    {   match self
        {   FreeModel::Gemma3_4b => "google/gemma-3-4b-it:free"
          , FreeModel::Llama32_1b => "meta-llama/llama-3.2-1b-preview"
          , FreeModel::Llama32_3b => "meta-llama/llama-3.2-3b-preview"
          , FreeModel::Phi3Mini => "microsoft/phi-3-mini-4k-instruct"
          , FreeModel::CodeGeex4 => "thudm/codegeex4-all-9b"
        }
    }

    pub fn display_name(&self) -> &'static str
    {   match self
        {   FreeModel::Gemma3_4b => "Gemma 3 4B (free)"
          , FreeModel::Llama32_1b => "Llama 3.2 1B"
          , FreeModel::Llama32_3b => "Llama 3.2 3B"
          , FreeModel::Phi3Mini => "Phi-3 Mini 4K"
          , FreeModel::CodeGeex4 => "CodeGeeX4 9B"
        }
    }

    pub fn from_id(id: &str) -> Option<FreeModel>
    {   FreeModel::ALL.iter().copied().find(|m| m.id() == id)
    }

    pub fn descriptor(&self) -> ModelDescriptor
    {   ModelDescriptor
        {   id: self.id().to_string()
          , name: self.display_name().to_string()
        }
    }
}
