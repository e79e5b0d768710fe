use anyhow::Context;
use clap::Parser;
use dpm_migrate::adapters::{HttpRevalidator, PostgresStore};
use dpm_migrate::cli::commands::{run_dump, run_list, run_migrate};
use dpm_migrate::cli::output::{self, OutputMode};
use dpm_migrate::cli::{Cli, Commands};
use dpm_migrate::config::{AppConfig, LoggingConfig};
use dpm_migrate::migration::MigrationPipeline;
use dpm_migrate::shutdown;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            output::print_error(e);
        }
        anyhow::bail!("invalid configuration ({} errors)", errors.len());
    }

    init_logging(&config.logging);

    let command = cli.command.clone().unwrap_or_else(Commands::default_command);
    let ok = match run(command, &config).await {
        Ok(ok) => ok,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Commands, config: &AppConfig) -> anyhow::Result<bool> {
    let store = Arc::new(
        PostgresStore::new(&config.database.url, config.database.max_connections)
            .await
            .context("connecting to database")?,
    );

    match command {
        Commands::Schema => {
            store.migrate().await?;
            output::print_success("Schema is up to date");
            Ok(true)
        }
        Commands::Dump { output } => run_dump(store.as_ref(), &output).await,
        Commands::List { json } => {
            let pipeline = pipeline(store, config)?;
            run_list(&pipeline, OutputMode::from_json_flag(json)).await
        }
        Commands::Migrate {
            market,
            dry_run,
            json,
        } => {
            let pipeline = pipeline(store, config)?;
            let (tx, rx) = shutdown::channel();
            let listener = shutdown::spawn_signal_listener(tx);

            info!(market = market.as_deref().unwrap_or("<all>"), dry_run, "Starting migration");
            let result = run_migrate(
                &pipeline,
                market.as_deref(),
                dry_run,
                OutputMode::from_json_flag(json),
                rx,
            )
            .await;
            listener.abort();
            result
        }
    }
}

fn pipeline(
    store: Arc<PostgresStore>,
    config: &AppConfig,
) -> anyhow::Result<MigrationPipeline<PostgresStore>> {
    let invalidator = HttpRevalidator::from_config(&config.revalidation)?;
    Ok(MigrationPipeline::new(store, invalidator, config.migration.clone()))
}

/// Initialize logging with console output and optional file output
fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},dpm_migrate=debug,sqlx=warn", config.level))
    });

    let log_dir = std::env::var("DPM_MIGRATE_LOG_DIR").ok();

    // `rolling::daily` panics if it can't create the initial file, so check writability first
    let file_layer = log_dir.and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Could not create log directory {log_dir} ({e}), file logging disabled");
            return None;
        }
        let test_path = std::path::Path::new(&log_dir).join(".dpm_migrate_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&test_path) {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(&log_dir, "dpm-migrate.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Flushes on drop; the process exits right after the run
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: Could not write to log directory {log_dir} ({e}), file logging disabled");
                None
            }
        }
    });

    let (console_layer, json_layer) = if config.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();
}
