//! Occupational-safety consultation bot: entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Open storage, load the FAQ knowledge base, build the provider router
//!   6. Build the consultant and the shared comms state
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Spawn channels, health probe and rate-limit janitor; join them

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hse_consult_bot::config;
use hse_consult_bot::consult::Consultant;
use hse_consult_bot::error::AppError;
use hse_consult_bot::knowledge::KnowledgeBase;
use hse_consult_bot::llm::assistant::AssistantClient;
use hse_consult_bot::llm::router::ProviderRouter;
use hse_consult_bot::logger;
use hse_consult_bot::rate_limit::{RateLimitJanitor, RateLimiter};
use hse_consult_bot::storage::Database;
use hse_consult_bot::subsystems::comms::{self, CommsState};
use hse_consult_bot::subsystems::runtime::{Component, spawn_components};
use hse_consult_bot::supervisor::{HealthProbe, HealthRegistry};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some(), config.log_file.as_deref())?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let db = Database::open(&config.database.path)?;
    let kb = Arc::new(KnowledgeBase::load(&config.knowledge));
    if kb.is_empty() {
        warn!(path = %config.knowledge.faq_path.display(), "knowledge base is empty, every question goes to AI");
    }
    let router = Arc::new(ProviderRouter::from_config(&config, db.clone())?);

    let limiter = Arc::new(RateLimiter::new());
    let mut consultant = Consultant::new(&config, db.clone(), kb.clone(), router.clone()).with_limiter(limiter.clone());
    match (config.assistant.enabled, config.secrets.openai_api_key.as_ref()) {
        (true, Some(key)) => {
            let client = AssistantClient::new(&config.assistant, key.clone(), config.ai.timeout_seconds)?;
            consultant = consultant.with_assistant(client);
        }
        (true, None) => warn!("assistant enabled but OPENAI_API_KEY missing, assistant mode off"),
        _ => {}
    }

    let health = HealthRegistry::new();
    let config = Arc::new(config);
    let comms_state = Arc::new(CommsState::new(config.clone(), consultant, health.clone()));

    // Shared shutdown token: Ctrl-C cancels it, all components watch it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    let mut components: Vec<Box<dyn Component>> = comms::channels(comms_state);
    let channel_count = components.len();
    components.push(Box::new(HealthProbe::new(&health, db, kb, router.clone())));
    components.push(Box::new(RateLimitJanitor::new(limiter)));

    print_startup_summary(&config, &router, channel_count);

    if channel_count == 0 {
        warn!("no channels enabled, running background tasks only");
    }

    let handle = spawn_components(components, shutdown.clone());
    let result = handle.join().await;
    shutdown.cancel();
    info!("shutdown complete");
    result
}

fn print_startup_summary(config: &config::Config, router: &ProviderRouter, channel_count: usize) {
    let providers = router
        .available()
        .iter()
        .map(|k| k.display_name())
        .collect::<Vec<_>>()
        .join(", ");
    let yes_no = |b: bool| if b { "enabled" } else { "disabled" };

    println!("{}", config.bot_name);
    println!("  pid        {}", std::process::id());
    println!("  database   {}", config.database.path.display());
    println!("  faq        {}", config.knowledge.faq_path.display());
    println!("  ai         default={} fallback={} available=[{providers}]", router.default_kind(), config.ai.fallback);
    println!("  assistant  {}", yes_no(config.assistant.enabled && config.secrets.openai_api_key.is_some()));
    println!("  telegram   {}", yes_no(config.telegram_should_load()));
    println!("  admin      {}", if config.admin_should_load() { config.admin.bind.as_str() } else { "disabled" });
    println!("  channels   {channel_count}");
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: hse-consult-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // -v warn, -vv info, -vvv debug, -vvvv+ trace.
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path }
}
