use crate::handler::inspect_registry;
use crate::utils;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tideflow_engine::{
    EntryStates, HandlerRegistry, StepAction, StepContext, StepState, is_empty_change, plan_steps,
    summarize,
};
use tideflow_state::StateManager;

/// Update ステップのうち preview が変更なしを返すものを集める
async fn unchanged_updates<'a>(
    steps: &'a [StepState],
    desired: &EntryStates,
    recorded: &EntryStates,
    registry: &HandlerRegistry,
    force: bool,
) -> anyhow::Result<Vec<&'a str>> {
    let mut unchanged = Vec::new();
    for step in steps.iter().filter(|s| s.action == StepAction::Update) {
        let (Some(candidate), Some(current)) =
            (desired.get(&step.entry_id), recorded.get(&step.entry_id))
        else {
            continue;
        };
        let Some(handler) = registry.get(&candidate.entry_type) else {
            continue;
        };

        let context = StepContext::detached(step.entry_id.clone(), force);
        let preview = handler.preview(candidate, current, &context).await?;
        if is_empty_change(preview.as_ref()) {
            unchanged.push(step.entry_id.as_str());
        }
    }
    Ok(unchanged)
}

pub async fn handle(
    desired: &Path,
    state_dir: Option<PathBuf>,
    config: &tideflow_config::TideConfig,
) -> anyhow::Result<()> {
    println!("{}", "実行計画を作成中...".blue());

    let state_dir = utils::resolve_state_dir(state_dir, config);
    let graph = utils::load_graph(desired)?;
    let snapshot = StateManager::new(&state_dir).load().await?;
    let recorded = snapshot.entries;

    println!("desired: {}", desired.display().to_string().cyan());
    println!(
        "state:   {} ({}個のエントリー)",
        state_dir.display().to_string().cyan(),
        recorded.len()
    );

    let registry = inspect_registry([&graph, &recorded]);
    let steps = match plan_steps(Some(&graph), Some(&recorded), &registry) {
        Ok(steps) => steps,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 計画エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let options = config.apply_options();
    let unchanged = unchanged_updates(&steps, &graph, &recorded, &registry, options.force).await?;
    utils::print_steps(&steps, &unchanged);

    let summary = summarize(&steps);
    println!();
    if summary.total() == unchanged.len() {
        println!("{}", "✓ 変更はありません".green().bold());
    }
    println!("Plan: {}", summary.to_string().bold());

    Ok(())
}
