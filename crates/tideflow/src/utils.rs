use anyhow::Context;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tideflow_engine::{EntryStates, StepAction, StepState};

/// エントリーグラフ（entry_id をキーとする JSON オブジェクト）を読み込む
pub fn load_graph(path: &Path) -> anyhow::Result<EntryStates> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("ファイルを読み込めません: {}", path.display()))?;
    let graph: EntryStates = serde_json::from_str(&content)
        .with_context(|| format!("エントリーグラフの解析に失敗しました: {}", path.display()))?;

    // キーと entry_id の不一致は破損として扱う
    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)?;
    for (key, value) in &raw {
        let entry_id = value.get("entry_id").and_then(|v| v.as_str());
        if entry_id != Some(key.as_str()) {
            anyhow::bail!(
                "キー '{}' と entry_id '{}' が一致しません: {}",
                key,
                entry_id.unwrap_or("(未設定)"),
                path.display()
            );
        }
    }

    Ok(graph)
}

/// state ディレクトリを決定する（引数 > 設定ファイル）
pub fn resolve_state_dir(
    state_dir: Option<PathBuf>,
    config: &tideflow_config::TideConfig,
) -> PathBuf {
    state_dir.unwrap_or_else(|| config.state_dir.clone())
}

/// ステップをフェーズ・wave ごとに表示する
///
/// `unchanged` に含まれる Update ステップは変更なしとして表示する。
pub fn print_steps(steps: &[StepState], unchanged: &[&str]) {
    let mut current: Option<(bool, usize)> = None;

    for step in steps {
        let key = (step.is_delete(), step.order);
        if current != Some(key) {
            if current.map(|(delete, _)| delete) != Some(step.is_delete()) {
                println!();
                let phase = if step.is_delete() {
                    "削除フェーズ"
                } else {
                    "作成・更新フェーズ"
                };
                println!("{}", phase.bold());
            }
            println!("  {}", format!("wave {}", step.order).dimmed());
            current = Some(key);
        }

        let id = step.entry_id.as_str();
        let line = match step.action {
            StepAction::Create => format!("+ create  {}", id).green(),
            StepAction::Replace => format!("± replace {}", id).magenta(),
            StepAction::Update if unchanged.contains(&id) => format!("= no-op   {}", id).dimmed(),
            StepAction::Update => format!("~ update  {}", id).yellow(),
            StepAction::Delete => format!("- delete  {}", id).red(),
        };
        println!("    {}", line);
    }
}
