use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use futures::StreamExt;
use juben_core::{
    ChatOptions, ErrorPolicy, FileAttachment, JubenConfig, PerformanceStats, SessionController,
};

use super::create_controller;

#[derive(Args)]
pub struct ChatArgs {
    #[arg(help = "Agent to talk to (see 'juben agents')")]
    pub agent: String,

    #[arg(help = "Message to send")]
    pub query: String,

    #[arg(long, help = "Theme of the work")]
    pub theme: Option<String>,

    #[arg(long, help = "Kind of work, e.g. short_drama")]
    pub work_type: Option<String>,

    #[arg(long, help = "Workflow to run on the backend")]
    pub workflow_type: Option<String>,

    #[arg(long, help = "Evaluation mode for evaluator agents")]
    pub evaluation_type: Option<String>,

    #[arg(long, help = "Let the agent continue without asking")]
    pub auto: bool,

    #[arg(long, help = "Target chunk size for long outputs")]
    pub chunk_size: Option<u32>,

    #[arg(long, help = "Upper bound on generated words")]
    pub max_word_count: Option<u32>,

    #[arg(long, help = "How many evaluation rounds to run")]
    pub evaluation_count: Option<u32>,

    #[arg(short, long = "file", help = "Attach a text file (repeatable)")]
    pub files: Vec<PathBuf>,

    #[arg(
        short,
        long,
        value_parser = parse_key_value,
        help = "Background setting as key=value (repeatable)"
    )]
    pub background: Vec<(String, String)>,

    #[arg(long, help = "Stop at the first error event")]
    pub stop_on_error: bool,

    #[arg(long, help = "Print every event as a JSON line")]
    pub json: bool,

    #[arg(long, help = "Show request timings when done")]
    pub stats: bool,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

pub async fn cmd_chat(config: &JubenConfig, args: ChatArgs) -> anyhow::Result<()> {
    let controller = create_controller(config)?;
    let options = build_options(&args).await?;
    let policy = if args.stop_on_error {
        ErrorPolicy::StopOnError
    } else {
        ErrorPolicy::ContinueOnError
    };

    let mut stream = controller
        .send_message_with_policy(&args.agent, &args.query, options, policy)
        .await?;

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        if args.json {
            println!("{}", serde_json::to_string(&event)?);
            continue;
        }

        if event.is_content() {
            print!("{}", event.content);
            stdout.flush()?;
        } else if event.is_error() {
            eprintln!();
            eprintln!("{} {}", "⚠".yellow(), event.content.yellow());
        }
    }

    let session_id = stream.session_id().to_string();
    let completion = stream.into_completion().await;

    if !args.json {
        println!();
    }

    let completion = match completion {
        Ok(completion) => completion,
        Err(e) => {
            if args.stats {
                print_stats(&controller.context().monitor().stats());
            }
            return Err(e.into());
        }
    };

    if !args.json {
        println!(
            "{} {} events, session {}",
            "✓".green(),
            completion.event_count,
            session_id.dimmed()
        );
        if completion.synthesized {
            println!(
                "{}",
                "The stream ended without a completion marker.".dimmed()
            );
        }
    }

    if args.stats {
        print_stats(&controller.context().monitor().stats());
    }

    Ok(())
}

async fn build_options(args: &ChatArgs) -> anyhow::Result<ChatOptions> {
    let mut options = ChatOptions::new();

    if let Some(theme) = &args.theme {
        options = options.with_theme(theme);
    }
    if let Some(work_type) = &args.work_type {
        options = options.with_work_type(work_type);
    }
    if let Some(workflow_type) = &args.workflow_type {
        options = options.with_workflow_type(workflow_type);
    }
    if let Some(evaluation_type) = &args.evaluation_type {
        options = options.with_evaluation_type(evaluation_type);
    }
    if args.auto {
        options = options.with_auto(true);
    }
    if let Some(chunk_size) = args.chunk_size {
        options = options.with_chunk_size(chunk_size);
    }
    if let Some(max_word_count) = args.max_word_count {
        options = options.with_max_word_count(max_word_count);
    }
    if let Some(evaluation_count) = args.evaluation_count {
        options = options.with_evaluation_count(evaluation_count);
    }
    for (key, value) in &args.background {
        options = options.with_background(key, value);
    }
    for path in &args.files {
        options = options.with_file(read_attachment(path).await?);
    }

    Ok(options)
}

async fn read_attachment(path: &Path) -> anyhow::Result<FileAttachment> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let kind = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "txt".to_string());

    Ok(FileAttachment::new(kind, name, content))
}

fn print_stats(stats: &PerformanceStats) {
    println!();
    println!("{}", "Request Timings".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<15} {}", "Requests:".bold(), stats.total_requests);
    println!(
        "  {:<15} {:.1} ms",
        "Average:".bold(),
        stats.average_response_ms
    );
    println!("  {:<15} {:.1}%", "Success rate:".bold(), stats.success_rate);

    if stats.recent_requests.is_empty() {
        return;
    }

    println!();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Method").fg(Color::White),
            Cell::new("URL").fg(Color::White),
            Cell::new("Duration").fg(Color::White),
            Cell::new("Result").fg(Color::White),
        ]);

    for sample in &stats.recent_requests {
        let result = if sample.success {
            Cell::new("ok").fg(Color::Green)
        } else {
            Cell::new(sample.error.as_deref().unwrap_or("failed")).fg(Color::Red)
        };

        table.add_row(vec![
            Cell::new(&sample.method),
            Cell::new(&sample.url),
            Cell::new(format!("{:.1} ms", sample.duration_ms)),
            result,
        ]);
    }

    println!("{table}");
}
