//! 認識エンジン連携モジュール
//!
//! エンジンの呼び出し形式:
//!
//! ```text
//! <engine...> --files <path>... --witai <token|none> --whisper <model|none>
//! ```
//!
//! 副エンジンの引数は選択されていなくても省略しない（`none` を明示する）。
//! エンジン側では「省略」と「none」は同じ意味ではない。

mod process;

pub use process::EngineProcess;

use crate::error::{DisnoteError, Result};
use crate::project::Project;
use disnote_common::EngineSet;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const FILES_FLAG: &str = "--files";
pub const WITAI_FLAG: &str = "--witai";
pub const WHISPER_FLAG: &str = "--whisper";
/// 副エンジンを使わないことを表す値
pub const NONE_SENTINEL: &str = "none";

/// 副エンジンの選択
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// wit.ai のトークン
    #[serde(default)]
    pub witai: Option<String>,
    /// Whisper のモデル名
    #[serde(default)]
    pub whisper: Option<String>,
}

fn selected(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(NONE_SENTINEL))
}

impl EngineOptions {
    pub fn witai_token(&self) -> &str {
        selected(&self.witai).unwrap_or(NONE_SENTINEL)
    }

    pub fn whisper_model(&self) -> &str {
        selected(&self.whisper).unwrap_or(NONE_SENTINEL)
    }

    /// 進捗テーブルに列を出す副エンジン
    pub fn engine_set(&self) -> EngineSet {
        EngineSet {
            witai: selected(&self.witai).is_some(),
            whisper: selected(&self.whisper).is_some(),
        }
    }
}

/// エンジン引数を組み立てる
pub fn build_args(files: &[&Path], options: &EngineOptions) -> Vec<OsString> {
    let mut args = Vec::with_capacity(files.len() + 5);
    args.push(OsString::from(FILES_FLAG));
    args.extend(files.iter().map(|f| f.as_os_str().to_os_string()));
    args.push(OsString::from(WITAI_FLAG));
    args.push(OsString::from(options.witai_token()));
    args.push(OsString::from(WHISPER_FLAG));
    args.push(OsString::from(options.whisper_model()));
    args
}

/// 起動するコマンド一式
#[derive(Debug, Clone, PartialEq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<OsString>,
    pub current_dir: Option<PathBuf>,
}

impl EngineCommand {
    /// 設定のエンジンコマンドラインとプロジェクトから作成
    pub fn for_project(engine: &[String], project: &Project, options: &EngineOptions) -> Result<Self> {
        let (program, leading) = engine
            .split_first()
            .ok_or_else(|| DisnoteError::Config("エンジンが設定されていません".into()))?;

        let mut args: Vec<OsString> = leading.iter().map(OsString::from).collect();
        args.extend(build_args(&project.file_paths(), options));

        let current_dir = if project.dir.as_os_str().is_empty() || !project.dir.is_dir() {
            None
        } else {
            Some(project.dir.clone())
        };

        Ok(Self {
            program: program.clone(),
            args,
            current_dir,
        })
    }
}
