mod commands;
mod handler;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tide")]
#[command(about = "宣言から計画へ。記録された状態との差分を、安全な順序で。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// エントリーグラフを検証
    Validate {
        /// desired グラフの JSON ファイル
        desired: PathBuf,
    },
    /// 記録済みの状態との差分から実行計画を表示
    Plan {
        /// desired グラフの JSON ファイル
        desired: PathBuf,
        /// state ディレクトリ（TIDE_STATE_DIR 環境変数、省略時は設定ファイルの値）
        #[arg(long, env = "TIDE_STATE_DIR")]
        state_dir: Option<PathBuf>,
    },
    /// 記録済みのエントリーをすべて削除する計画を表示
    #[command(name = "destroy-plan")]
    DestroyPlan {
        /// state ディレクトリ（TIDE_STATE_DIR 環境変数、省略時は設定ファイルの値）
        #[arg(long, env = "TIDE_STATE_DIR")]
        state_dir: Option<PathBuf>,
    },
    /// 記録済みの状態を操作
    #[command(subcommand)]
    State(StateCommands),
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// 記録済みのエントリー一覧を表示
    Show {
        /// state ディレクトリ（TIDE_STATE_DIR 環境変数、省略時は設定ファイルの値）
        #[arg(long, env = "TIDE_STATE_DIR")]
        state_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr に出力（RUST_LOG で制御）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        // Version / Validate コマンドは設定ファイル不要
        Commands::Version => {
            println!("tideflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Validate { desired } => {
            commands::validate::handle(&desired)?;
        }
        Commands::Plan { desired, state_dir } => {
            let config = load_config();
            commands::plan::handle(&desired, state_dir, &config).await?;
        }
        Commands::DestroyPlan { state_dir } => {
            let config = load_config();
            commands::destroy::handle(state_dir, &config).await?;
        }
        Commands::State(StateCommands::Show { state_dir }) => {
            let config = load_config();
            commands::state::handle_show(state_dir, &config).await?;
        }
    }

    Ok(())
}

/// 設定を読み込む（失敗時はエラーを表示して終了）
fn load_config() -> tideflow_config::TideConfig {
    match tideflow_config::load_config() {
        Ok(config) => {
            tracing::debug!("config: {:?}", config);
            config
        }
        Err(e) => {
            eprintln!("{}", "✗ 設定ファイルの読み込みに失敗しました".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
