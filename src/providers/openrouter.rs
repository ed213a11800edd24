use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use log::{debug, trace, error, info, warn};
use crate::classify::{classify, Fault};
use crate::request::{
  build_request, parse_payload, process_response, project_models,
  ChatCompletionResponse, ModelsResponse
};

const HTTP_REFERER: &str = "http-referer";
const X_TITLE: &str = "x-title";

// ===== Credentials =====

/// The single bearer key owned by one relay instance
#[derive(Clone, Default)]
pub struct Credentials
{   api_key: Option<String>
}

impl Credentials
{   pub fn new(api_key: Option<String>) -> Self
    {   Credentials
        {   api_key: api_key.filter(|k| !k.trim().is_empty())
        }
    }

    /// Replace the active key; a blank key clears it
    pub fn set(&mut self, key: String)
    {   debug!("Replacing API key");
        self.api_key = Some(key).filter(|k| !k.trim().is_empty());
    }

    pub fn is_set(&self) -> bool
    {   self.api_key.is_some()
    }

    pub fn key(&self) -> Option<&str>
    {   self.api_key.as_deref()
    }
}

impl std::fmt::Debug for Credentials
{   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {   f.debug_struct("Credentials")
          .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
          .finish()
    }
}

// ===== Dispatcher =====

/// Everything one upstream call needs, with the header set frozen
/// at the moment it was built. Cheap to clone and 'static, so each
/// call can run on its own task.
#[derive(Debug, Clone)]
pub struct Dispatcher
{   http_client: reqwest::Client
  , chat_url: String
  , auth_url: String
  , models_url: String
  , default_model: String
  , headers: HeaderMap
}

impl Dispatcher
{   pub fn new(
      http_client: reqwest::Client
    , config: &crate::RelayConfig
    , api_key: &str
    ) -> Result<Self, crate::error::Error>
    {   let headers = default_headers(config, api_key)?;
        Ok(Dispatcher
        {   http_client
          , chat_url: config.endpoint("/chat/completions")
          , auth_url: config.endpoint("/auth")
          , models_url: config.endpoint("/models")
          , default_model: config.default_model.clone()
          , headers
        })
    }

    /// Standalone dispatcher using the key held in `config`
    pub fn from_config(config: &crate::RelayConfig)
      -> Result<Self, crate::error::Error>
    {   config.validate()?;
        let key = config.api_key.as_deref().ok_or_else(missing_key)?;
        Dispatcher::new(build_http_client(config)?, config, key)
    }

    pub fn default_model(&self) -> &str
    {   &self.default_model
    }

    /// Issue one upstream call and hand back the raw success body
    async fn execute(
      &self
    , request: reqwest::RequestBuilder
    ) -> Result<Vec<u8>, Fault>
    {   let response = request
          .headers(self.headers.clone())
          .send()
          .await?;

        let status = response.status();
        trace!("Upstream response status: {}", status);

        if !status.is_success()
        {   let body = response.text().await
              .unwrap_or_else(|e| {
                warn!("Could not read error body: {}", e);
                String::new()
              });
            return Err(Fault::from_status(status, body));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Send prepared messages and decode the completion payload
    pub async fn send_chat(
      &self
    , messages: &[crate::ConversationMessage]
    , model: &str
    , options: &crate::GenerationOptions
    ) -> Result<ChatCompletionResponse, crate::error::Error>
    {   info!("Sending request to model: {}", model);
        debug!("Messages: {} items", messages.len());

        let body = build_request(model, messages, options);
        trace!("Chat request: {:?}", body);

        let raw = self
          .execute(self.http_client.post(&self.chat_url).json(&body))
          .await
          .map_err(|fault| {
            let err = classify(fault);
            error!("Error sending chat upstream: {}", err);
            err
          })?;

        let response = parse_payload(&raw).map_err(classify)?;
        debug!("Upstream chat response received");
        Ok(response)
    }

    /// Prepare -> dispatch -> extract
    pub async fn chat(
      &self
    , messages: Vec<crate::ConversationMessage>
    , model: Option<&str>
    , options: crate::GenerationOptions
    , turn: crate::Turn
    ) -> Result<crate::ChatReply, crate::error::Error>
    {   options.validate()?;
        let model = model
          .filter(|m| !m.trim().is_empty())
          .unwrap_or(self.default_model.as_str());

        let prepared = crate::persona::prepare_conversation(messages, turn);
        let response = self.send_chat(&prepared, model, &options).await?;
        process_response(response)
    }

    /// Authenticated reachability check; any fault reads as "not reachable"
    pub async fn connect(&self) -> bool
    {   debug!("Checking upstream at {}", self.auth_url);
        match self.execute(self.http_client.get(&self.auth_url)).await
        {   Ok(_) => {
              info!("Connected to upstream API");
              true
            }
          , Err(fault) => {
              let err = classify(fault);
              error!("Failed to connect to upstream API: {}", err);
              false
            }
        }
    }

    /// List the upstream catalog as id/name pairs
    pub async fn get_models(&self)
      -> Result<Vec<crate::ModelDescriptor>, crate::error::Error>
    {   debug!("Fetching models from {}", self.models_url);

        let result = self
          .execute(self.http_client.get(&self.models_url))
          .await
          .and_then(|raw| parse_payload::<ModelsResponse>(&raw));

        match result
        {   Ok(listing) => {
              let models = project_models(listing);
              info!("Found {} available models", models.len());
              Ok(models)
            }
          , Err(fault) => {
              let err = classify(fault);
              error!("Error fetching models: {}", err);
              Err(crate::error::Error::ModelsUnavailable(Box::new(err)))
            }
        }
    }
}

fn missing_key() -> crate::error::Error
{   error!("No API key configured");
    classify(Fault::Request(
      "Missing API key: set OPENROUTER_API_KEY or call set_api_key".to_string()
    ))
}

fn header_value(name: &str, value: &str)
  -> Result<HeaderValue, crate::error::Error>
{   HeaderValue::from_str(value).map_err(|e| {
      classify(Fault::Request(
        format!("Invalid {} header value: {}", name, e)
      ))
    })
}

/// Content type, bearer auth, app title and referer
pub fn default_headers(config: &crate::RelayConfig, api_key: &str)
  -> Result<HeaderMap, crate::error::Error>
{   let mut auth = header_value(
      "Authorization",
      &format!("Bearer {}", api_key)
    )?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(AUTHORIZATION, auth);
    headers.insert(
      HeaderName::from_static(HTTP_REFERER),
      header_value("HTTP-Referer", &config.app_url)?
    );
    headers.insert(
      HeaderName::from_static(X_TITLE),
      header_value("X-Title", &config.app_title)?
    );
    Ok(headers)
}

pub fn build_http_client(config: &crate::RelayConfig)
  -> Result<reqwest::Client, crate::error::Error>
{   let mut builder = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(config.timeout_secs));
    if config.no_proxy
    {   debug!("System proxy disabled for {}", config.api_base);
        builder = builder.no_proxy();
    }
    builder
      .build()
      .map_err(|e| classify(Fault::from(e)))
}

// ===== Relay state =====

/// What the backend task owns between calls
pub struct OpenRouterState
{   config: crate::RelayConfig
  , credentials: Credentials
  , http_client: reqwest::Client
}

impl OpenRouterState
{   pub fn new(config: crate::RelayConfig)
      -> Result<Self, crate::error::Error>
    {   debug!("Creating OpenRouterState for {}", config.api_base);
        config.validate()?;
        let http_client = build_http_client(&config)?;
        let credentials = Credentials::new(config.api_key.clone());
        if !credentials.is_set()
        {   warn!("API key not found; set OPENROUTER_API_KEY or call set_api_key");
        }
        Ok(OpenRouterState
        {   config
          , credentials
          , http_client
        })
    }

    pub fn set_api_key(&mut self, key: String)
    {   self.credentials.set(key);
    }

    pub fn api_key_status(&self) -> bool
    {   self.credentials.is_set()
    }

    pub fn config(&self) -> &crate::RelayConfig
    {   &self.config
    }

    /// Freeze the current key into a dispatcher for one call
    pub fn dispatcher(&self) -> Result<Dispatcher, crate::error::Error>
    {   let key = self.credentials.key().ok_or_else(missing_key)?;
        Dispatcher::new(self.http_client.clone(), &self.config, key)
    }
}
