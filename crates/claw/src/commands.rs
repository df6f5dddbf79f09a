//! claw command implementations

use anyhow::{Context, Result};
use std::io::{BufReader, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use claw_agent::{Engine, SessionConfig};
use claw_bus::Outcome;
use claw_channels::{Channel, ConsoleChannel, SessionLauncher, TelegramChannel};
use claw_config::{self, default_model_for, resolve_root, CommitPolicy, Config};

/// Providers offered by the wizard; any OpenAI-compatible id also works
const PROVIDERS: &[&str] = &[
    "deepseek",
    "openai",
    "anthropic",
    "openrouter",
    "glm",
    "moonshot",
    "dashscope",
    "minimax",
    "doubao",
    "spark",
    "baichuan",
    "yi",
    "stepfun",
];

/// Read line from stdin
fn read_line() -> Result<String> {
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Read a secret without echo when attached to a terminal
fn read_secret() -> Result<String> {
    if std::io::stdin().is_terminal() {
        Ok(rpassword::read_password()?.trim().to_string())
    } else {
        read_line()
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    read_line()
}

fn prompt_default(label: &str, default: &str) -> Result<String> {
    let answer = prompt(&format!("{} [{}]: ", label, default))?;
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer
    })
}

fn confirm(label: &str, default: bool) -> Result<bool> {
    let hint = if default { "Y/n" } else { "y/N" };
    let answer = prompt(&format!("{} ({}): ", label, hint))?.to_lowercase();
    Ok(match answer.as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    })
}

/// Interactive setup wizard
pub async fn init_command() -> Result<()> {
    let config_path = claw_config::config_path();
    let mut config = Config::load_from(&config_path)
        .await
        .with_context(|| format!("reading {}", config_path.display()))?;

    println!("◆ claw setup");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    // ========================================================
    // Step 1: Provider and API key
    // ========================================================
    println!("Step 1: Model provider");
    println!("Known providers: {}", PROVIDERS.join(", "));
    let provider = prompt_default("Provider", &config.llm.provider)?;
    if provider != config.llm.provider {
        config.llm.model = default_model_for(&provider).to_string();
        config.llm.api_base = None;
    }
    config.llm.provider = provider;

    let key_hint = if config.has_api_key() {
        "leave empty to keep the current key"
    } else {
        "input is hidden"
    };
    print!("API key ({}): ", key_hint);
    std::io::stdout().flush()?;
    let api_key = read_secret()?;
    if !api_key.is_empty() {
        config.llm.api_key = api_key;
    }
    if !config.has_api_key() {
        println!("No API key set; export CLAW_API_KEY before running tasks.");
    }

    config.llm.model = prompt_default("Model", &config.llm.model)?;
    println!();

    // ========================================================
    // Step 2: Project
    // ========================================================
    println!("Step 2: Project");
    config.project.root = prompt_default("Project root", &config.project.root)?;
    let auto_commit = confirm(
        "Commit automatically when a task changes files?",
        config.project.effective_commit_policy() != CommitPolicy::Off,
    )?;
    config.project.auto_commit = auto_commit;
    config.project.commit_policy = None;
    println!();

    // ========================================================
    // Step 3: Telegram
    // ========================================================
    println!("Step 3: Telegram bot (optional)");
    config.telegram.enabled = confirm("Enable Telegram bot?", config.telegram.enabled)?;
    if config.telegram.enabled {
        print!("Bot token (from @BotFather, input is hidden): ");
        std::io::stdout().flush()?;
        let token = read_secret()?;
        if !token.is_empty() {
            config.telegram.token = token;
        }

        let users = prompt("Allowed user ids or usernames (comma-separated, empty for anyone): ")?;
        config.telegram.allowed_users = users
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    println!();

    config.validate().or_else(|e| match e {
        claw_config::ConfigError::MissingApiKey => Ok(()),
        other => Err(other),
    })?;
    config
        .save_to(&config_path)
        .await
        .with_context(|| format!("writing {}", config_path.display()))?;
    info!("◆ wrote {}", config_path.display());
    println!("✓ Saved to {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  - Run a task:     claw run \"add a README\"");
    println!("  - Chat:           claw chat");
    println!("  - Telegram bot:   claw telegram");
    println!("  - Check status:   claw status");

    Ok(())
}

/// Config ready for running tasks
async fn load_runnable_config() -> Result<Config> {
    let config = Config::load().await?;
    config.validate()?;
    Ok(config)
}

/// `-p` wins over the configured root; relative paths are taken from the cwd
fn project_root(config: &Config, project: Option<PathBuf>) -> Result<PathBuf> {
    match project {
        Some(path) => {
            let cwd = std::env::current_dir()?;
            Ok(resolve_root(&path.to_string_lossy(), &cwd))
        }
        None => Ok(config.project_root()),
    }
}

fn launcher(config: &Config, root: &Path) -> Result<SessionLauncher> {
    debug!(root = %root.display(), model = %config.llm.model, "building session launcher");
    let session = SessionConfig::from_config(config, root);
    Ok(SessionLauncher::from_config(Engine::new(), session)?)
}

fn console_channel(launcher: SessionLauncher) -> ConsoleChannel<BufReader<std::io::Stdin>, std::io::Stdout> {
    ConsoleChannel::new(
        launcher,
        BufReader::new(std::io::stdin()),
        std::io::stdout(),
    )
    .with_interrupts()
}

/// Run one task; returns whether it finished
pub async fn run_command(task: String, project: Option<PathBuf>) -> Result<bool> {
    let config = load_runnable_config().await?;
    let root = project_root(&config, project)?;

    let mut console = console_channel(launcher(&config, &root)?);
    let outcome = console.run_task(&task).await?;
    Ok(matches!(outcome, Outcome::Finished { .. }))
}

/// Chat with the agent
pub async fn chat_command(project: Option<PathBuf>) -> Result<()> {
    let config = load_runnable_config().await?;
    let root = project_root(&config, project)?;

    let mut console = console_channel(launcher(&config, &root)?);
    console.start().await?;
    Ok(())
}

/// Serve the agent over Telegram
pub async fn telegram_command(project: Option<PathBuf>) -> Result<()> {
    let config = load_runnable_config().await?;
    let root = project_root(&config, project)?;

    println!("◆ claw Telegram bot");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Project: {}", root.display());
    println!("Model:   {}", config.llm.model);

    let mut channel = TelegramChannel::new(config.telegram.clone(), launcher(&config, &root)?);
    println!("Press Ctrl+C to stop");
    channel.start().await?;
    println!("◆ Telegram bot stopped");
    Ok(())
}

fn mark(ok: bool, yes: &'static str, no: &'static str) -> &'static str {
    if ok {
        yes
    } else {
        no
    }
}

/// Show status
pub async fn status_command() -> Result<()> {
    let config_path = claw_config::config_path();
    let config = Config::load().await?;
    let root = config.project_root();

    println!("◆ claw Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config:    {} {}",
        config_path.display(),
        mark(config_path.exists(), "[OK]", "[Missing]")
    );
    println!("Provider:  {}", config.llm.provider);
    println!("Model:     {}", config.llm.model);
    println!(
        "API Key:   {}",
        mark(config.has_api_key(), "[Set]", "[Missing]")
    );
    println!(
        "Project:   {} {}",
        root.display(),
        mark(root.is_dir(), "[OK]", "[Missing]")
    );
    println!(
        "Notes:     {}",
        mark(root.join("CLAW.md").is_file(), "CLAW.md [Found]", "CLAW.md [None]")
    );
    println!("Commits:   {:?}", config.project.effective_commit_policy());
    println!("Max turns: {}", config.project.max_iterations);

    let tg = &config.telegram;
    println!(
        "Telegram:  {} (token {})",
        mark(tg.enabled, "[Enabled]", "[Disabled]"),
        mark(!tg.token.is_empty(), "set", "not set")
    );
    let allowed = if tg.allowed_users.is_empty() {
        "Any".to_string()
    } else {
        tg.allowed_users.join(", ")
    };
    println!("Allowed:   {}", allowed);

    if !config.has_api_key() {
        println!("\nRun `claw init` or set CLAW_API_KEY to get started.");
    } else {
        println!("\n◆ Ready");
    }
    Ok(())
}
