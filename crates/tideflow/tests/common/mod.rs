use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_desired(&self, content: &serde_json::Value) -> PathBuf {
        let path = self.root.path().join("desired.json");
        fs::write(&path, serde_json::to_string_pretty(content).unwrap()).unwrap();
        path
    }

    /// state.json を直接書き込む（StateSnapshot と同じ形式）
    pub fn write_state(&self, entries: &serde_json::Value) {
        let dir = self.state_dir();
        fs::create_dir_all(&dir).unwrap();
        let snapshot = serde_json::json!({
            "version": 1,
            "updated_at": "2026-01-01T00:00:00Z",
            "entries": entries,
        });
        fs::write(dir.join("state.json"), snapshot.to_string()).unwrap();
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join(".tideflow")
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
