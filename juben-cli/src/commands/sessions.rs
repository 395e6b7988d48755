use clap::Subcommand;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use juben_core::{JubenConfig, SessionController};

use super::create_controller;

#[derive(Subcommand)]
pub enum SessionCommand {
    #[command(about = "Show the current user and session IDs")]
    Show,

    #[command(about = "Start a new local session")]
    New,

    #[command(about = "List the sessions the backend keeps for this user")]
    List {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Ask the backend for a new session and switch to it")]
    Create,

    #[command(about = "Delete a session on the backend")]
    Delete {
        #[arg(help = "Session ID")]
        session_id: String,
    },
}

pub async fn handle_session_command(
    config: &JubenConfig,
    cmd: Option<SessionCommand>,
) -> anyhow::Result<()> {
    let controller = create_controller(config)?;

    match cmd.unwrap_or(SessionCommand::Show) {
        SessionCommand::Show => cmd_session_show(&controller),
        SessionCommand::New => cmd_session_new(&controller),
        SessionCommand::List { format } => cmd_session_list(&controller, &format).await,
        SessionCommand::Create => cmd_session_create(&controller).await,
        SessionCommand::Delete { session_id } => {
            cmd_session_delete(&controller, &session_id).await
        }
    }
}

fn cmd_session_show(controller: &SessionController) -> anyhow::Result<()> {
    println!("{}", "Current Identity".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<12} {}", "User:".bold(), controller.current_user_id());
    println!("  {:<12} {}", "Session:".bold(), controller.current_session_id());
    Ok(())
}

fn cmd_session_new(controller: &SessionController) -> anyhow::Result<()> {
    let session_id = controller.create_new_session();
    println!("{} Started session {}", "✓".green(), session_id.bold());
    Ok(())
}

async fn cmd_session_list(controller: &SessionController, format: &str) -> anyhow::Result<()> {
    let sessions = controller.list_sessions().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!("{}", "No sessions found.".yellow());
        println!(
            "{}",
            "Start one with 'juben chat' or 'juben session create'.".dimmed()
        );
        return Ok(());
    }

    let current = controller.current_session_id();

    println!("{}", "Sessions".cyan().bold());
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Session ID").fg(Color::White),
            Cell::new("Agent").fg(Color::White),
            Cell::new("Status").fg(Color::White),
            Cell::new("Created").fg(Color::White),
            Cell::new("Last Activity").fg(Color::White),
        ]);

    for session in &sessions {
        let id_cell = if session.session_id == current {
            Cell::new(format!("{} *", session.session_id)).fg(Color::Green)
        } else {
            Cell::new(&session.session_id)
        };

        table.add_row(vec![
            id_cell,
            Cell::new(session.agent_type.as_deref().unwrap_or("-")),
            Cell::new(&session.status),
            Cell::new(&session.created_at),
            Cell::new(&session.last_activity),
        ]);
    }

    println!("{table}");
    println!();
    println!("{}", "* current session".dimmed());

    Ok(())
}

async fn cmd_session_create(controller: &SessionController) -> anyhow::Result<()> {
    let created = controller.create_remote_session().await?;
    println!(
        "{} Created session {} on the backend",
        "✓".green(),
        created.session_id.bold()
    );
    Ok(())
}

async fn cmd_session_delete(controller: &SessionController, session_id: &str) -> anyhow::Result<()> {
    let was_current = controller.current_session_id() == session_id;
    controller.delete_session(session_id).await?;

    println!("{} Deleted session {}", "✓".green(), session_id.bold());
    if was_current {
        println!(
            "{} Switched to new session {}",
            "→".blue(),
            controller.current_session_id()
        );
    }

    Ok(())
}
