//! Telegram channel implementation
//!
//! Long-polls the Bot API. Each chat gets its own session; a task message is
//! answered with a placeholder that is edited as tool steps arrive and once
//! more with the final result.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::utils::command::BotCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use claw_agent::{SessionHandle, ToolContext, ToolRegistry};
use claw_bus::{AbortReason, Outcome, SessionEvent};
use claw_config::TelegramConfig;
use claw_provider::ToolCall;

use crate::render::{escape_html, trim_middle, TaskProgress, TELEGRAM_LIMIT};
use crate::{Channel, ChannelError, Result, SessionLauncher};

/// Minimum gap between progress edits; Telegram throttles chatty bots
const EDIT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "show this help")]
    Start,
    #[command(description = "project, model and session state")]
    Status,
    #[command(description = "list the project root")]
    Project,
    #[command(description = "stop the running task")]
    Cancel,
    #[command(description = "drop this chat's session")]
    Reset,
}

/// Users allowed to talk to the bot, by numeric id or username
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    entries: Vec<String>,
}

impl AllowList {
    pub fn new(entries: &[String]) -> Self {
        let entries = entries
            .iter()
            .map(|e| normalize_entry(e))
            .filter(|e| !e.is_empty())
            .collect();
        Self { entries }
    }

    pub fn allows_everyone(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_allowed(&self, user_id: &str, username: Option<&str>) -> bool {
        if self.allows_everyone() {
            return true;
        }
        if self.entries.iter().any(|e| e == user_id) {
            return true;
        }
        username
            .map(normalize_entry)
            .map(|name| !name.is_empty() && self.entries.contains(&name))
            .unwrap_or(false)
    }
}

/// Usernames match without the `@` and ignoring case
fn normalize_entry(entry: &str) -> String {
    entry.trim().trim_start_matches('@').to_lowercase()
}

#[derive(Clone)]
struct ChatSession {
    handle: SessionHandle,
    active: Arc<AtomicUsize>,
}

impl ChatSession {
    fn running(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct BotState {
    launcher: SessionLauncher,
    allowed: AllowList,
    bot_name: String,
    sessions: Mutex<HashMap<ChatId, ChatSession>>,
}

impl BotState {
    async fn session_for(&self, chat: ChatId) -> Result<ChatSession> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(&chat) {
            return Ok(existing.clone());
        }
        let handle = self.launcher.launch().await?;
        info!(chat = chat.0, session = %handle.id(), "◆ started session for chat");
        let session = ChatSession {
            handle,
            active: Arc::new(AtomicUsize::new(0)),
        };
        sessions.insert(chat, session.clone());
        Ok(session)
    }

    async fn current(&self, chat: ChatId) -> Option<ChatSession> {
        self.sessions.lock().await.get(&chat).cloned()
    }

    /// Drop the chat's session if it is still `session_id`
    async fn forget(&self, chat: ChatId, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(&chat)
            .map(|s| s.handle.id() == session_id)
            .unwrap_or(false)
        {
            sessions.remove(&chat);
        }
    }

    async fn remove(&self, chat: ChatId) -> Option<ChatSession> {
        self.sessions.lock().await.remove(&chat)
    }
}

/// Telegram channel implementation
pub struct TelegramChannel {
    config: TelegramConfig,
    launcher: SessionLauncher,
    allowed: AllowList,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig, launcher: SessionLauncher) -> Self {
        let allowed = AllowList::new(&config.allowed_users);
        Self {
            config,
            launcher,
            allowed,
        }
    }

    pub fn is_allowed(&self, user_id: &str, username: Option<&str>) -> bool {
        self.allowed.is_allowed(user_id, username)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&mut self) -> Result<()> {
        if self.config.token.trim().is_empty() {
            return Err(ChannelError::NotConfigured(
                "telegram.token is empty; run `claw init` or set CLAW_TG_TOKEN".to_string(),
            ));
        }
        if !self.config.enabled {
            return Err(ChannelError::NotConfigured(
                "telegram.enabled is false in the config".to_string(),
            ));
        }

        let bot = Bot::new(self.config.token.trim());
        let me = bot.get_me().await?;
        let bot_name = me.user.username.clone().unwrap_or_default();
        info!(
            bot = %bot_name,
            root = %self.launcher.config().root.display(),
            "◆ Starting Telegram channel"
        );
        if self.allowed.allows_everyone() {
            warn!("telegram.allowed_users is empty; anyone can drive the agent");
        }

        let state = Arc::new(BotState {
            launcher: self.launcher.clone(),
            allowed: self.allowed.clone(),
            bot_name,
            sessions: Mutex::new(HashMap::new()),
        });

        teloxide::repl(bot, move |bot: Bot, msg: Message| {
            let state = state.clone();
            async move { handle_message(bot, msg, state).await }
        })
        .await;

        info!("Stopping Telegram channel");
        Ok(())
    }
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let chat = msg.chat.id;

    let user_id = user.id.0.to_string();
    if !state.allowed.is_allowed(&user_id, user.username.as_deref()) {
        debug!("Ignoring message from unauthorized user: {}", user_id);
        bot.send_message(chat, "⛔ You are not allowed to use this bot.")
            .await?;
        return Ok(());
    }

    if text.starts_with('/') {
        return match Command::parse(text, &state.bot_name) {
            Ok(command) => handle_command(bot, chat, command, state).await,
            Err(_) => {
                bot.send_message(chat, "Unknown command. Send /start for help.")
                    .await?;
                Ok(())
            }
        };
    }

    start_task(bot, chat, text.to_string(), state).await
}

async fn handle_command(
    bot: Bot,
    chat: ChatId,
    command: Command,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let config = state.launcher.config();
    let reply = match command {
        Command::Start => format!(
            "🤖 <b>claw</b>\n\nTell me what you want changed and I will edit the project to do it.\n\n\
             📁 Project: <code>{}</code>\n🧠 Model: <code>{}</code>\n\n{}",
            escape_html(&config.root.display().to_string()),
            escape_html(&config.model),
            escape_html(&Command::descriptions().to_string()),
        ),
        Command::Status => {
            let session = match state.current(chat).await {
                Some(s) if s.running() > 0 => format!("active, {} task(s) running", s.running()),
                Some(_) => "idle".to_string(),
                None => "none".to_string(),
            };
            format!(
                "🤖 <b>Status</b>\n\n📁 Project: <code>{}</code>\n🧠 Model: <code>{}</code>\n\
                 🔑 Provider: <code>{}</code>\n📝 Commit policy: <code>{:?}</code>\n💬 Session: {}",
                escape_html(&config.root.display().to_string()),
                escape_html(&config.model),
                escape_html(&config.provider.provider),
                config.commit_policy,
                session,
            )
        }
        Command::Project => {
            let listing = project_listing(&state.launcher).await;
            format!(
                "<pre>{}</pre>",
                escape_html(&trim_middle(&listing, TELEGRAM_LIMIT - 100))
            )
        }
        Command::Cancel => match state.current(chat).await {
            Some(s) if s.running() > 0 => {
                s.handle.cancel();
                "🛑 Cancelling the running task...".to_string()
            }
            _ => "Nothing to cancel.".to_string(),
        },
        Command::Reset => {
            if let Some(old) = state.remove(chat).await {
                old.handle.cancel();
                info!(chat = chat.0, session = %old.handle.id(), "◆ session reset");
            }
            "♻️ Session reset. The next message starts fresh.".to_string()
        }
    };

    bot.send_message(chat, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn start_task(
    bot: Bot,
    chat: ChatId,
    text: String,
    state: Arc<BotState>,
) -> ResponseResult<()> {
    let session = match state.session_for(chat).await {
        Ok(session) => session,
        Err(e) => {
            warn!(chat = chat.0, "could not start session: {}", e);
            bot.send_message(chat, format!("❌ Could not start a session: {}", e))
                .await?;
            return Ok(());
        }
    };

    let placeholder = if session.running() > 0 {
        "⏳ Queued behind the running task..."
    } else {
        "🔄 Working on it..."
    };
    let working = bot.send_message(chat, placeholder).await?;

    session.active.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        let aborted = track_task(&bot, chat, working.id, &session.handle, text).await;
        session.active.fetch_sub(1, Ordering::SeqCst);
        // An aborted session is closed; the next message gets a new one
        if aborted {
            state.forget(chat, session.handle.id()).await;
        }
    });
    Ok(())
}

/// Follow one task's events, editing the placeholder as it goes.
/// Returns whether the task aborted.
async fn track_task(
    bot: &Bot,
    chat: ChatId,
    message: MessageId,
    handle: &SessionHandle,
    text: String,
) -> bool {
    let mut stream = handle.send_user_message(text);
    let mut progress = TaskProgress::new();
    let mut last_edit = Instant::now();

    while let Some(event) = stream.recv().await {
        let terminal = event.is_terminal();
        if progress.observe(&event) && !terminal && last_edit.elapsed() >= EDIT_INTERVAL {
            edit(bot, chat, message, &progress.render_html()).await;
            last_edit = Instant::now();
        }
        if terminal {
            break;
        }
    }

    if !progress.is_done() {
        progress.observe(&SessionEvent::Aborted {
            session_id: handle.id().to_string(),
            reason: AbortReason::Internal("event stream closed before a terminal event".to_string()),
        });
    }
    edit(bot, chat, message, &progress.render_html()).await;

    match progress.outcome() {
        Some(Outcome::Aborted(reason)) => {
            info!(chat = chat.0, session = %handle.id(), "◆ task aborted: {}", reason);
            true
        }
        _ => false,
    }
}

async fn edit(bot: &Bot, chat: ChatId, message: MessageId, html: &str) {
    if let Err(e) = bot
        .edit_message_text(chat, message, html)
        .parse_mode(ParseMode::Html)
        .await
    {
        debug!("progress edit failed: {}", e);
    }
}

/// Top-level listing of the project root
async fn project_listing(launcher: &SessionLauncher) -> String {
    let config = launcher.config();
    let root = match tokio::fs::canonicalize(&config.root).await {
        Ok(root) => root,
        Err(e) => return format!("cannot read project root {}: {}", config.root.display(), e),
    };
    let lock = launcher.engine().locks().lock_for(&root);
    let ctx = ToolContext::new(root, config.command_timeout_secs, lock);
    let call = ToolCall::new("project", "list_dir", json!({"path": "."}));
    ToolRegistry::with_defaults().execute(&call, &ctx).await.output
}
