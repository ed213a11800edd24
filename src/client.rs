use tokio::sync::mpsc;
use log::{debug, error, info, warn};
use crate::providers::openrouter::OpenRouterState;

/// Commands understood by the relay backend task.
/// One ordered queue: a key change is seen by every command
/// queued after it.
pub enum RelayCommand
{   Chat(crate::ChatArgs)
  , Connect(crate::ConnectArgs)
  , GetModels(crate::GetModelsArgs)
  , SetApiKey(crate::SetApiKeyArgs)
  , GetApiKeyStatus(crate::ApiKeyStatusArgs)
  , KillProcess(crate::KillProcessArgs)
}

/// Public API for the relay backend - owns the task
pub struct RelayBackend
{   tx: mpsc::UnboundedSender<RelayCommand>
  , default_model: String
  , _task_handle: tokio::task::JoinHandle<()>
}

impl RelayBackend
{   /// Create and spawn a new relay backend.
    /// Must be called from within a tokio runtime.
    pub fn new(
      config: crate::RelayConfig
    ) -> Result<Self, crate::error::Error>
    {   debug!("Creating RelayBackend with task ownership");
        let default_model = config.default_model.clone();
        let state = OpenRouterState::new(config)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _task_handle = tokio::spawn(async move {
          run_relay_loop(rx, state).await
        });

        Ok(RelayBackend
        {   tx
          , default_model
          , _task_handle
        })
    }

    /// Backend configured from OPENROUTER_* variables
    pub fn from_env() -> Result<Self, crate::error::Error>
    {   RelayBackend::new(crate::RelayConfig::from_env()?)
    }

    pub fn default_model(&self) -> &str
    {   &self.default_model
    }

    fn queue(&self, cmd: RelayCommand)
      -> Result<(), crate::error::Error>
    {   self.tx.send(cmd).map_err(|_| {
          error!("Backend channel closed");
          disconnected()
        })
    }

    /// Chat with the persona decided from the message list
    pub async fn chat(
      &self
    , messages: Vec<crate::ConversationMessage>
    , model: Option<String>
    , options: Option<crate::GenerationOptions>
    ) -> crate::ChatResult
    {   self.chat_with_turn(
          messages,
          model,
          options,
          crate::Turn::Infer
        ).await
    }

    /// Chat with an explicit first-turn decision
    pub async fn chat_with_turn(
      &self
    , messages: Vec<crate::ConversationMessage>
    , model: Option<String>
    , options: Option<crate::GenerationOptions>
    , turn: crate::Turn
    ) -> crate::ChatResult
    {   debug!(
          "chat queuing {} messages for model: {:?}",
          messages.len(), model
        );
        let (reply, mut reply_rx) = mpsc::unbounded_channel();

        self.queue(RelayCommand::Chat(crate::ChatArgs
        {   messages
          , model
          , options: options.unwrap_or_default()
          , turn
          , reply
        }))?;

        reply_rx.recv().await.unwrap_or_else(|| Err(disconnected()))
    }

    /// Check the upstream is reachable; false on any failure
    pub async fn connect(&self) -> bool
    {   debug!("connect queuing command");
        let (reply, mut reply_rx) = mpsc::unbounded_channel();

        if self.queue(RelayCommand::Connect(crate::ConnectArgs { reply }))
          .is_err()
        {   return false;
        }

        reply_rx.recv().await.unwrap_or(false)
    }

    /// Upstream catalog as id/name pairs
    pub async fn get_models(&self) -> crate::GetModelsResult
    {   debug!("get_models queuing command");
        let (reply, mut reply_rx) = mpsc::unbounded_channel();

        self.queue(RelayCommand::GetModels(crate::GetModelsArgs { reply }))
          .map_err(|e| crate::error::Error::ModelsUnavailable(Box::new(e)))?;

        reply_rx.recv().await.unwrap_or_else(|| {
          Err(crate::error::Error::ModelsUnavailable(
            Box::new(disconnected())
          ))
        })
    }

    /// Replace the bearer key; returns once the backend applied it
    pub async fn set_api_key(
      &self
    , key: impl Into<String>
    ) -> Result<(), crate::error::Error>
    {   debug!("set_api_key queuing command");
        let (reply, mut reply_rx) = mpsc::unbounded_channel();

        self.queue(RelayCommand::SetApiKey(crate::SetApiKeyArgs
        {   key: key.into()
          , reply
        }))?;

        reply_rx.recv().await.ok_or_else(disconnected)
    }

    /// Whether a key is set. Never reveals the key.
    pub async fn api_key_status(&self)
      -> Result<bool, crate::error::Error>
    {   let (reply, mut reply_rx) = mpsc::unbounded_channel();

        self.queue(RelayCommand::GetApiKeyStatus(
          crate::ApiKeyStatusArgs { reply }
        ))?;

        reply_rx.recv().await.ok_or_else(disconnected)
    }

    /// The free catalog known without asking the upstream
    pub fn free_models(&self) -> Vec<crate::ModelDescriptor>
    {   crate::FreeModel::ALL
          .iter()
          .map(|m| m.descriptor())
          .collect()
    }

    /// Gracefully shutdown the backend
    pub async fn shutdown(self)
      -> Result<(), crate::error::Error>
    {   debug!("Shutting down RelayBackend");
        let (reply, mut reply_rx) = mpsc::unbounded_channel();

        self.queue(RelayCommand::KillProcess(
          crate::KillProcessArgs { reply }
        ))?;

        // Wait for shutdown confirmation
        if reply_rx.recv().await.is_some()
        {   debug!("Backend shutdown confirmed");
            Ok(())
        } else
        {   error!("Backend stopped before confirming shutdown");
            Err(disconnected())
        }
    }
}

fn disconnected() -> crate::error::Error
{   crate::error::Error::local("Relay backend disconnected")
}

/// Main relay event loop
///
/// Only credential changes touch the state. Network work runs on
/// its own task with a dispatcher frozen at dequeue time, so the
/// loop never waits on the upstream.
async fn run_relay_loop(
  mut cmd_rx: mpsc::UnboundedReceiver<RelayCommand>
, mut state: OpenRouterState
)
{   debug!("Starting relay loop for {}", state.config().api_base);

    loop
    { match cmd_rx.recv().await
      {   Some(RelayCommand::Chat(args)) => {
            debug!("Processing Chat");
            match state.dispatcher()
            {   Ok(dispatcher) => {
                  tokio::spawn(async move {
                    let crate::ChatArgs
                    {   messages, model, options, turn, reply
                    } = args;
                    let result = dispatcher
                      .chat(messages, model.as_deref(), options, turn)
                      .await;
                    let _ = reply.send(result);
                  });
                }
              , Err(e) => {
                  let _ = args.reply.send(Err(e));
                }
            }
          }
        , Some(RelayCommand::Connect(args)) => {
            debug!("Processing Connect");
            match state.dispatcher()
            {   Ok(dispatcher) => {
                  tokio::spawn(async move {
                    let _ = args.reply.send(dispatcher.connect().await);
                  });
                }
              , Err(e) => {
                  warn!("Cannot reach upstream: {}", e);
                  let _ = args.reply.send(false);
                }
            }
          }
        , Some(RelayCommand::GetModels(args)) => {
            debug!("Processing GetModels");
            match state.dispatcher()
            {   Ok(dispatcher) => {
                  tokio::spawn(async move {
                    let _ = args.reply.send(dispatcher.get_models().await);
                  });
                }
              , Err(e) => {
                  let _ = args.reply.send(Err(
                    crate::error::Error::ModelsUnavailable(Box::new(e))
                  ));
                }
            }
          }
        , Some(RelayCommand::SetApiKey(args)) => {
            debug!("Processing SetApiKey");
            state.set_api_key(args.key);
            let _ = args.reply.send(());
          }
        , Some(RelayCommand::GetApiKeyStatus(args)) => {
            let _ = args.reply.send(state.api_key_status());
          }
        , Some(RelayCommand::KillProcess(args)) => {
            let _ = args.reply.send(());
            info!("RelayBackend shutting down");
            break;
          }
        , None => {
            debug!("Command channel closed");
            break;
          }
      }
    }
}
