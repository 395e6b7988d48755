#![allow(
    clippy::too_many_arguments,
    clippy::needless_borrows_for_generic_args,
    clippy::useless_format,
    clippy::field_reassign_with_default
)]

use clap::{Parser, Subcommand};
use colored::Colorize;
use juben_core::{CliErrorDisplay, JubenConfig, JubenError, LoggingConfig};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

use commands::{
    cmd_agents, cmd_chat, cmd_export, cmd_health, cmd_status, handle_session_command, ChatArgs,
    SessionCommand,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "juben")]
#[command(version = VERSION)]
#[command(about = "Juben - chat with script-writing agents from the terminal")]
#[command(long_about = r#"
Juben talks to a Juben agent backend. Messages are streamed back as they
are written, so long scripts appear piece by piece.

Point it at a backend with JUBEN_API_BASE_URL (or api.base_url in
juben.toml), then try 'juben agents' and 'juben chat <agent> "<query>"'.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Send a message to an agent and stream the reply")]
    Chat(ChatArgs),

    #[command(about = "Check that the backend is up")]
    Health {
        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "Show backend system status")]
    Status {
        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "List the agents the backend offers")]
    Agents {
        #[arg(short, long, default_value = "text", help = "Output format (text, json)")]
        format: String,
    },

    #[command(about = "Show and manage conversation sessions")]
    Session {
        #[command(subcommand)]
        action: Option<SessionCommand>,
    },

    #[command(about = "Export the content produced in a session")]
    Export {
        #[arg(help = "Session ID")]
        session_id: String,

        #[arg(short, long, default_value = "txt", help = "Export format (txt, json, md)")]
        format: String,

        #[arg(
            short = 't',
            long = "content-type",
            default_value = "script",
            help = "Content type to include (repeatable)"
        )]
        content_types: Vec<String>,

        #[arg(short, long, help = "Include metadata in the export")]
        metadata: bool,

        #[arg(short, long, help = "Write the exported data to this file")]
        output: Option<std::path::PathBuf>,
    },

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match JubenConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Configuration error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(cli.verbose, &config.logging);

    let verbose = cli.verbose;
    match run(cli, config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, verbose);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);

    if logging.json_format {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Friendly text for library errors; technical detail only with `--verbose`.
fn report_error(err: &anyhow::Error, verbose: bool) {
    match err.downcast_ref::<JubenError>() {
        Some(juben) => {
            let display = CliErrorDisplay::new(juben);
            let display = if verbose {
                display
            } else {
                display.without_details()
            };
            eprint!("{} {}", "Error:".red().bold(), display);
        }
        None => eprintln!("{}: {}", "Error".red().bold(), err),
    }
}

async fn run(cli: Cli, config: JubenConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Chat(args) => cmd_chat(&config, args).await,
        Commands::Health { format } => cmd_health(&config, &format).await,
        Commands::Status { format } => cmd_status(&config, &format).await,
        Commands::Agents { format } => cmd_agents(&config, &format).await,
        Commands::Session { action } => handle_session_command(&config, action).await,
        Commands::Export {
            session_id,
            format,
            content_types,
            metadata,
            output,
        } => {
            cmd_export(
                &config,
                &session_id,
                &format,
                &content_types,
                metadata,
                output.as_deref(),
            )
            .await
        }
        Commands::Version { detailed } => cmd_version(&config, detailed),
    }
}

fn cmd_version(config: &JubenConfig, detailed: bool) -> anyhow::Result<()> {
    if detailed {
        println!("{}", "Juben Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!("  {:<15} {}", "Backend:".bold(), config.api.api_root());
        println!(
            "  {:<15} {} ms, {} attempts",
            "Requests:".bold(),
            config.api.request_timeout_ms,
            config.api.max_retries
        );
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("juben {}", VERSION);
    }

    Ok(())
}
