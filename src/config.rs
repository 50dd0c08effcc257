use crate::engine::EngineOptions;
use crate::error::{DisnoteError, Result};
use crate::persist::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "disnote";
const CONFIG_FILE: &str = "config.json";
const PROJECTS_FILE: &str = "projects.json";
const WITAI_TOKEN_ENV: &str = "DISNOTE_WITAI_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 認識エンジンのコマンドライン（プログラム + 先頭の引数）
    pub engine: Vec<String>,
    /// エンジン出力の文字コード（WHATWGラベル）
    pub encoding: String,
    /// プロジェクトリストの保存先（省略時は設定ディレクトリ）
    pub projects_file: Option<PathBuf>,
    pub witai_token: Option<String>,
    pub whisper_model: Option<String>,
    /// キャンセル後、強制終了するまでの猶予
    pub kill_grace_seconds: u64,
    /// プロセス終了後、パイプが閉じるのを待つ時間
    pub drain_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: vec!["python".into(), "all.py".into()],
            encoding: "shift_jis".into(),
            projects_file: None,
            witai_token: None,
            whisper_model: None,
            kill_grace_seconds: 5,
            drain_timeout_ms: 2000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// 一時ファイル経由で置き換え保存
    pub fn save_to(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| DisnoteError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join(CONFIG_DIR))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn projects_path(&self) -> Result<PathBuf> {
        match &self.projects_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join(PROJECTS_FILE)),
        }
    }

    /// 起動前の検証（エンジン未設定・不明な文字コード）
    pub fn validate(&self) -> Result<()> {
        if self.engine.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(DisnoteError::Config("エンジンが設定されていません".into()));
        }
        self.output_encoding()?;
        Ok(())
    }

    /// エンジン出力の文字コード
    pub fn output_encoding(&self) -> Result<&'static encoding_rs::Encoding> {
        disnote_common::encoding_for_label(&self.encoding)
            .map_err(|_| DisnoteError::Config(format!("不明な文字コード: {}", self.encoding)))
    }

    pub fn witai_token(&self) -> Option<String> {
        // 環境変数を優先
        if let Ok(token) = std::env::var(WITAI_TOKEN_ENV) {
            if !token.trim().is_empty() {
                return Some(token);
            }
        }
        self.witai_token.clone()
    }

    /// コマンドラインで指定がなければ設定値を使う
    pub fn engine_options(&self, witai: Option<String>, whisper: Option<String>) -> EngineOptions {
        EngineOptions {
            witai: witai.or_else(|| self.witai_token()),
            whisper: whisper.or_else(|| self.whisper_model.clone()),
        }
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_seconds)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.encoding, "shift_jis");
        assert_eq!(config.engine, vec!["python", "all.py"]);
        assert_eq!(config.kill_grace(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_returns_default() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(config.drain_timeout_ms, 2000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.engine = vec!["disnote-engine.exe".into()];
        config.whisper_model = Some("small".into());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.engine, vec!["disnote-engine.exe"]);
        assert_eq!(loaded.whisper_model.as_deref(), Some("small"));
    }

    #[test]
    fn test_save_replaces_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"encoding":"utf-8"}"#).unwrap();

        let config = Config { kill_grace_seconds: 9, ..Config::default() };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.encoding, "shift_jis");
        assert_eq!(loaded.kill_grace_seconds, 9);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"encoding":"utf-8"}"#).unwrap();

        // 保存先がディレクトリなので置き換えに失敗する
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();
        assert!(Config::default().save_to(&blocked).is_err());

        assert!(blocked.join("keep").exists());
        assert_eq!(Config::load_from(&path).unwrap().encoding, "utf-8");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_output_encoding() {
        let config = Config { encoding: " Shift_JIS ".into(), ..Config::default() };
        assert_eq!(config.output_encoding().unwrap(), encoding_rs::SHIFT_JIS);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"encoding":"utf-8"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.encoding, "utf-8");
        assert_eq!(config.kill_grace_seconds, 5);
    }

    #[test]
    fn test_validate_rejects_unknown_encoding() {
        let config = Config { encoding: "klingon".into(), ..Config::default() };
        assert!(matches!(config.validate(), Err(DisnoteError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_engine() {
        let config = Config { engine: Vec::new(), ..Config::default() };
        assert!(matches!(config.validate(), Err(DisnoteError::Config(_))));
    }

    #[test]
    fn test_engine_options_prefers_arguments() {
        let config = Config { whisper_model: Some("base".into()), ..Config::default() };
        let options = config.engine_options(None, Some("large".into()));
        assert_eq!(options.whisper.as_deref(), Some("large"));
        let options = config.engine_options(None, None);
        assert_eq!(options.whisper.as_deref(), Some("base"));
    }
}
