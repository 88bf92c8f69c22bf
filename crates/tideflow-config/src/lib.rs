pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tideflow_engine::ApplyOptions;

const CONFIG_CANDIDATES: [&str; 4] = [
    "tide.local.yaml",
    ".tide.local.yaml",
    "tide.yaml",
    ".tide.yaml",
];

/// TideFlow の動作設定
///
/// ```yaml
/// state_dir: .tideflow
/// force: false
/// concurrent_waves: true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TideConfig {
    /// state.json を保存するディレクトリ（相対パスはカレントディレクトリ基準）
    pub state_dir: PathBuf,

    /// ハンドラーに force フラグを渡す
    pub force: bool,

    /// 同一 wave のステップを並行実行する
    ///
    /// `tide` 自体は apply を行わないため、ドライバーを組み込んだ実行側が
    /// `apply_options()` 経由で参照する。
    pub concurrent_waves: bool,
}

impl Default for TideConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".tideflow"),
            force: false,
            concurrent_waves: false,
        }
    }
}

impl TideConfig {
    /// エンジンに渡す実行オプション
    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            force: self.force,
            concurrent_waves: self.concurrent_waves,
        }
    }
}

/// TideFlowの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("tideflow");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトの設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 TIDE_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: tide.local.yaml, .tide.local.yaml, tide.yaml, .tide.yaml
/// 3. ./.tideflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/tideflow/tide.yaml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("TIDE_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    if let Some(path) = find_in(&current_dir) {
        return Ok(path);
    }

    // 3. ./.tideflow/ ディレクトリで検索
    let tide_dir = current_dir.join(".tideflow");
    if tide_dir.is_dir() {
        if let Some(path) = find_in(&tide_dir) {
            return Ok(path);
        }
    }

    // 4. グローバル設定ファイル (~/.config/tideflow/tide.yaml)
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("tideflow").join("tide.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_CANDIDATES
        .iter()
        .map(|filename| dir.join(filename))
        .find(|path| path.exists())
}

/// 指定パスの設定ファイルを読み込む
pub fn load_config_from(path: &Path) -> Result<TideConfig> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// 設定を読み込む（設定ファイルがなければデフォルト値）
pub fn load_config() -> Result<TideConfig> {
    match find_config_file() {
        Ok(path) => load_config_from(&path),
        Err(ConfigError::ConfigFileNotFound) => Ok(TideConfig::default()),
        Err(e) => Err(e),
    }
}
