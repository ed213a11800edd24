//! Send one message through the relay, or list models.
//!
//!   kaiwa-chat こんにちは
//!   kaiwa-chat --models
//!
//! Configuration comes from OPENROUTER_* variables; set
//! RUST_LOG=debug to watch the pipeline.

use log::{error, info};
use kaiwa_relay::{ConversationMessage, RelayBackend};

#[tokio::main]
async fn main()
{   env_logger::init();

    if let Err(e) = run().await
    {   error!("{}", e);
        if let Some(details) = e.details()
        {   eprintln!("error: {}\n  details: {}", e, details);
        } else
        {   eprintln!("error: {}", e);
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), kaiwa_relay::Error>
{   let args: Vec<String> = std::env::args().skip(1).collect();
    let backend = RelayBackend::from_env()?;

    if !backend.api_key_status().await?
    {   return Err("OPENROUTER_API_KEY is not set".into());
    }

    let connected = backend.connect().await;
    info!("Upstream reachable: {}", connected);

    if args.first().map(String::as_str) == Some("--models")
    {   for model in backend.get_models().await?
        {   println!("{}\t{}", model.id, model.name);
        }
        return backend.shutdown().await;
    }

    let text = args.join(" ");
    if text.trim().is_empty()
    {   return Err("usage: kaiwa-chat <message> | --models".into());
    }

    let reply = backend
      .chat(vec![ConversationMessage::user(text)], None, None)
      .await?;

    println!("{}", reply.text);
    if let Some(usage) = reply.usage
    {   info!(
          "tokens: prompt={} completion={} total={}",
          usage.prompt_tokens.unwrap_or_default(),
          usage.completion_tokens.unwrap_or_default(),
          usage.total_tokens.unwrap_or_default()
        );
    }

    backend.shutdown().await
}
