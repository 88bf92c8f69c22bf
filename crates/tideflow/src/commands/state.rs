use crate::utils;
use colored::Colorize;
use std::path::PathBuf;
use tideflow_state::StateManager;

/// 記録済みのエントリー一覧を表示
pub async fn handle_show(
    state_dir: Option<PathBuf>,
    config: &tideflow_config::TideConfig,
) -> anyhow::Result<()> {
    let state_dir = utils::resolve_state_dir(state_dir, config);
    let manager = StateManager::new(&state_dir);
    let snapshot = manager.load().await?;

    println!("state: {}", manager.state_path().display().to_string().cyan());
    println!(
        "更新日時: {}",
        snapshot.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if snapshot.entries.is_empty() {
        println!("{}", "記録済みのエントリーはありません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("エントリー一覧 ({} 個):", snapshot.entries.len()).bold()
    );
    for entry in &snapshot.entries {
        let status = if entry.result.is_some() {
            "✓ provisioned".green()
        } else {
            "… pending".yellow()
        };
        let deps = if entry.dependencies.is_empty() {
            String::new()
        } else {
            format!(" → {}", entry.dependencies.join(", "))
        };
        println!(
            "  • {} [{}] {}{}",
            entry.entry_id.cyan(),
            entry.entry_type,
            status,
            deps.dimmed()
        );
    }

    Ok(())
}
