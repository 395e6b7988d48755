use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use juben_core::{AgentInfo, JubenConfig};

use super::create_controller;

pub async fn cmd_health(config: &JubenConfig, format: &str) -> anyhow::Result<()> {
    let controller = create_controller(config)?;
    let health = controller.health_check().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    if health.is_healthy() {
        println!(
            "{} Backend at {} is {}",
            "✓".green(),
            config.api.api_root(),
            health.status.green()
        );
    } else {
        println!(
            "{} Backend at {} reports {}",
            "✗".red(),
            config.api.api_root(),
            health.status.yellow()
        );
    }

    if !health.message.is_empty() {
        println!("  {}", health.message.dimmed());
    }

    Ok(())
}

pub async fn cmd_status(config: &JubenConfig, format: &str) -> anyhow::Result<()> {
    let controller = create_controller(config)?;
    let status = controller.system_status().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "System Status".cyan().bold());
    println!("{}", "═".repeat(40).dimmed());
    println!("  {:<18} {}", "Status:".bold(), status.system_status);
    println!("  {:<18} {}", "Active agents:".bold(), status.active_agents);
    println!("  {:<18} {}", "Available tools:".bold(), status.available_tools);
    println!("  {:<18} {}", "Active sessions:".bold(), status.active_sessions);

    Ok(())
}

pub async fn cmd_agents(config: &JubenConfig, format: &str) -> anyhow::Result<()> {
    let controller = create_controller(config)?;
    let agents = controller.list_agents().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    if agents.is_empty() {
        println!("{}", "No agents available.".yellow());
        return Ok(());
    }

    println!("{}", "Agents".cyan().bold());
    println!();
    println!("{}", agents_table(&agents));
    println!();
    println!(
        "{} Chat with one using {}",
        "→".blue(),
        "juben chat <name> \"<message>\"".bold()
    );

    Ok(())
}

fn agents_table(agents: &[AgentInfo]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Name").fg(Color::White),
            Cell::new("Display Name").fg(Color::White),
            Cell::new("Category").fg(Color::White),
            Cell::new("Status").fg(Color::White),
            Cell::new("Capabilities").fg(Color::White),
        ]);

    for agent in agents {
        let status = match agent.status.as_str() {
            "active" | "available" => Cell::new(&agent.status).fg(Color::Green),
            "" => Cell::new("-"),
            other => Cell::new(other).fg(Color::Yellow),
        };

        table.add_row(vec![
            Cell::new(&agent.name).fg(Color::Cyan),
            Cell::new(non_empty(&agent.display_name)),
            Cell::new(non_empty(&agent.category)),
            status,
            Cell::new(non_empty(&agent.capabilities.join(", "))),
        ]);
    }

    table
}

fn non_empty(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}
