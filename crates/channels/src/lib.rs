//! claw-channels: front ends for claw sessions
//!
//! A channel turns user input into session messages and renders the
//! resulting event stream back to the user.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use claw_agent::{AgentError, Engine, SessionConfig, SessionHandle};
use claw_provider::{build_provider, Provider, ProviderError};

pub mod console;
pub mod render;
pub mod telegram;

pub use console::ConsoleChannel;
pub use telegram::TelegramChannel;

/// Channel errors
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("channel not configured: {0}")]
    NotConfigured(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// A front end that runs until its user is done with it
#[async_trait]
pub trait Channel: Send {
    fn name(&self) -> &str;

    async fn start(&mut self) -> Result<()>;
}

/// Starts sessions with a fixed config and provider
#[derive(Clone)]
pub struct SessionLauncher {
    engine: Engine,
    config: SessionConfig,
    provider: Arc<dyn Provider>,
}

impl SessionLauncher {
    pub fn new(engine: Engine, config: SessionConfig, provider: Arc<dyn Provider>) -> Self {
        Self {
            engine,
            config,
            provider,
        }
    }

    /// Build the provider named in `config` once for every session
    pub fn from_config(engine: Engine, config: SessionConfig) -> Result<Self> {
        let provider = build_provider(&config.provider)?;
        Ok(Self::new(engine, config, provider))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn launch(&self) -> Result<SessionHandle> {
        let handle = self
            .engine
            .start_session_with_provider(self.config.clone(), self.provider.clone())
            .await?;
        Ok(handle)
    }
}
