use crate::handler::inspect_registry;
use crate::utils;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;
use tideflow_engine::{EntryStates, ReconcileError, plan_steps};

/// connections が参照するエントリーが存在しないものを列挙する
fn dangling_connections(graph: &EntryStates) -> Vec<(String, String)> {
    graph
        .iter()
        .flat_map(|entry| {
            entry
                .connections
                .iter()
                .filter(move |c| !graph.contains(c))
                .map(move |c| (entry.entry_id.clone(), c.clone()))
        })
        .collect()
}

pub fn handle(desired: &Path) -> anyhow::Result<()> {
    println!("{}", "エントリーグラフを検証中...".blue());
    println!("ファイル: {}", desired.display().to_string().cyan());

    let graph = utils::load_graph(desired)?;
    let mut problems: Vec<String> = dangling_connections(&graph)
        .into_iter()
        .map(|(entry, reference)| {
            format!("{} の connections に未定義の {} があります", entry, reference)
        })
        .collect();

    let registry = inspect_registry([&graph]);
    match plan_steps(Some(&graph), None, &registry) {
        Ok(_) => {}
        Err(ReconcileError::CorruptedStateReferences { expected, found }) => {
            problems.push(format!(
                "依存関係を解決できません（未定義の参照または循環依存）: {} 個中 {} 個のみ解決",
                expected, found
            ));
        }
        Err(e) => problems.push(e.to_string()),
    }

    if !problems.is_empty() {
        eprintln!();
        eprintln!("{}", "✗ 検証エラー".red().bold());
        for problem in &problems {
            eprintln!("  {}", problem);
        }
        std::process::exit(1);
    }

    println!("{}", "✓ エントリーグラフは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  エントリー: {}個", graph.len());

    let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in &graph {
        *by_type.entry(entry.entry_type.as_str()).or_default() += 1;
    }
    for (entry_type, count) in by_type {
        println!("    - {} ({}個)", entry_type.cyan(), count);
    }

    Ok(())
}
