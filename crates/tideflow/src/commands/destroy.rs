use crate::handler::inspect_registry;
use crate::utils;
use colored::Colorize;
use std::path::PathBuf;
use tideflow_engine::{plan_steps, summarize};
use tideflow_state::StateManager;

/// 記録済みのエントリーをすべて削除する計画を表示
pub async fn handle(
    state_dir: Option<PathBuf>,
    config: &tideflow_config::TideConfig,
) -> anyhow::Result<()> {
    println!("{}", "削除計画を作成中...".yellow());

    let state_dir = utils::resolve_state_dir(state_dir, config);
    let recorded = StateManager::new(&state_dir).load().await?.entries;
    println!("state: {}", state_dir.display().to_string().cyan());

    if recorded.is_empty() {
        println!("{}", "記録済みのエントリーはありません".dimmed());
        return Ok(());
    }

    let registry = inspect_registry([&recorded]);
    let steps = match plan_steps(None, Some(&recorded), &registry) {
        Ok(steps) => steps,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 計画エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    utils::print_steps(&steps, &[]);
    println!();
    println!("Plan: {}", summarize(&steps).to_string().bold());

    Ok(())
}
