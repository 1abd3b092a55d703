mod chat;
mod cli;
mod speak;
mod upload;

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use mimic_client::{Backend, BackendOptions};
use mimic_config::MimicConfig;

/// Load environment variables from a .env file (KEY=VALUE lines).
fn load_dotenv() {
    let manifest_dir = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        // Workspace root, two levels up from crates/mimic-app/
        manifest_dir.join("..").join("..").join(".env"),
        // Current directory
        std::path::PathBuf::from(".env"),
    ];

    for path in &candidates {
        if let Ok(contents) = std::fs::read_to_string(path) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
            return;
        }
    }
}

fn backend_from(config: &MimicConfig) -> Result<Backend, mimic_common::ClientError> {
    Backend::from_env_with_options(
        config.backend.base_url.clone(),
        BackendOptions {
            connect_timeout: Duration::from_secs(config.backend.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.backend.request_timeout_secs),
        },
    )
}

#[tokio::main]
async fn main() {
    // Load .env file before anything else
    load_dotenv();

    let args = cli::parse();

    // Load config first so its logging directive can serve as the default
    let config = match &args.config {
        Some(path) => mimic_config::load_from_path(path),
        None => mimic_config::load_config(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Config load failed, using defaults: {e}");
        MimicConfig::default()
    });

    let log_directive = args
        .log_level
        .as_deref()
        .unwrap_or(&config.logging.directive);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                log_directive
                    .parse()
                    .unwrap_or_else(|_| "mimic=info".parse().unwrap()),
            ),
        )
        .init();

    tracing::info!("Mimic v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("Backend: {}", config.backend.base_url);

    let result = match args.command {
        cli::Command::Chat {
            persona,
            thread,
            speak,
        } => chat::run(&config, persona, thread, speak).await,
        cli::Command::Speak {
            persona,
            text,
            output,
        } => speak::run(&config, persona, text, output).await,
        cli::Command::Upload {
            persona,
            file,
            no_wait,
        } => upload::run(&config, persona, file, no_wait).await,
        cli::Command::Config => {
            println!("{}", mimic_config::config_to_json(&config));
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
