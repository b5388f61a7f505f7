mod config_commands;
mod resource_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Result, bail},
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, prelude::*},
};

use {
    attache_attachments::AttachmentInput,
    attache_config::{AttacheConfig, Severity},
    attache_gateway::GatewayState,
};

#[derive(Parser)]
#[command(name = "attache", about = "Attache: chat attachment representations", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "ATTACHE_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON instead of human-readable format.
    #[arg(long, global = true, env = "ATTACHE_JSON_LOGS")]
    json_logs: bool,

    /// Config file to load instead of discovering one.
    #[arg(long, global = true, env = "ATTACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Custom data directory (resources and cached representations).
    #[arg(long, global = true, env = "ATTACHE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default when no subcommand is provided).
    Serve {
        /// Address to bind to.
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Store a local file and print its reference.
    Ingest {
        file: PathBuf,
        /// MIME type; sniffed from the content when omitted.
        #[arg(long)]
        mime: Option<String>,
        /// Display title; defaults to the file name.
        #[arg(long)]
        title: Option<String>,
    },
    /// Resolve an attachment and print its view (or AI parts with --ai).
    Resolve {
        reference: String,
        #[arg(long, default_value = "")]
        mime: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long)]
        ai: bool,
    },
    /// Representation cache operations.
    Cache {
        #[command(subcommand)]
        action: resource_commands::CacheAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<AttacheConfig> {
    match cli.config {
        Some(ref path) => {
            let mut config = attache_config::load_config(path)?;
            attache_config::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
            Ok(config)
        },
        None => Ok(attache_config::discover_and_load()),
    }
}

/// Build the shared state, refusing configs that fail validation.
fn build_state(config: AttacheConfig) -> Result<GatewayState> {
    let result = attache_config::validate(&config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => tracing::error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        bail!("invalid configuration; run `attache config check` for details");
    }

    let data_dir = attache_config::data_dir(&config);
    std::fs::create_dir_all(&data_dir)?;
    info!(data_dir = %data_dir.display(), "using data directory");
    Ok(GatewayState::from_config(config, &data_dir))
}

async fn serve(mut config: AttacheConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    #[cfg(feature = "metrics")]
    let handle = attache_metrics::init_metrics(attache_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })?;

    let state = build_state(config)?;
    #[cfg(feature = "metrics")]
    let state = state.with_metrics_handle(handle);

    attache_gateway::start_gateway(Arc::new(state)).await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads `env = ...` defaults.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(ref dir) = cli.data_dir {
        attache_config::set_data_dir(dir.clone());
    }
    let config = load_config(&cli)?;

    match cli.command {
        None => serve(config, None, None).await,
        Some(Commands::Serve { bind, port }) => serve(config, bind, port).await,
        Some(Commands::Ingest { file, mime, title }) => {
            resource_commands::ingest(&build_state(config)?, file, mime, title).await
        },
        Some(Commands::Resolve {
            reference,
            mime,
            title,
            ai,
        }) => {
            let input = AttachmentInput::new(reference.clone(), reference, mime, title);
            resource_commands::resolve(&build_state(config)?, input, ai).await
        },
        Some(Commands::Cache { action }) => {
            resource_commands::handle_cache(&build_state(config)?, action).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, &config, cli.config.as_deref())
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["attache"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn cache_ensure_takes_reference_and_definition() {
        let cli = Cli::try_parse_from(["attache", "cache", "ensure", "abc123", "thumbnail"]).unwrap();
        match cli.command {
            Some(Commands::Cache {
                action: resource_commands::CacheAction::Ensure {
                    reference,
                    definition,
                },
            }) => {
                assert_eq!(reference, "abc123");
                assert_eq!(definition, "thumbnail");
            },
            _ => panic!("expected cache ensure"),
        }
    }

    #[test]
    fn resolve_accepts_ai_flag() {
        let cli = Cli::try_parse_from([
            "attache", "resolve", "abc123", "--mime", "application/pdf", "--title", "a.pdf", "--ai",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Resolve { ai: true, .. })));
    }
}
