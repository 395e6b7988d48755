use std::path::Path;

use colored::Colorize;
use juben_core::JubenConfig;

use super::create_controller;

pub async fn cmd_export(
    config: &JubenConfig,
    session_id: &str,
    format: &str,
    content_types: &[String],
    include_metadata: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let controller = create_controller(config)?;
    let result = controller
        .export_content(session_id, format, content_types, include_metadata)
        .await?;

    match output {
        Some(path) => {
            tokio::fs::write(path, result.exported_data.as_bytes())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;

            println!(
                "{} Exported {} items to {}",
                "✓".green(),
                result.total_items,
                path.display().to_string().bold()
            );
        }
        None => {
            println!("{}", result.exported_data);
            if !result.filename.is_empty() {
                eprintln!(
                    "{} {} items, suggested filename {}",
                    "→".blue(),
                    result.total_items,
                    result.filename
                );
            }
        }
    }

    Ok(())
}
