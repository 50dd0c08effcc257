//! 進捗レコードのパーサー
//!
//! エンジンの標準出力には自由形式のログと、マーカー付きの1行JSONが混在する。
//!
//! ```text
//! 2024-01-01 12:00:00,000 [PROGRESS]{"stage":"rec","index":0,"progress":30,"max":100}
//! ```
//!
//! ロガーが時刻を前置するため、マーカーは行頭に限らず行内から探す。

use crate::error::{Error, Result};
use crate::stage::{EngineThread, Stage};
use serde::Deserialize;

/// 進捗レコードのマーカー
pub const PROGRESS_MARKER: &str = "[PROGRESS]";

const STAGE_ALL_FILES_ADDED: &str = "all_files_added";
const STAGE_MERGE: &str = "merge";
const STAGE_MERGE_DONE: &str = "merge_done";

/// パース済みの進捗レコード
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressRecord {
    /// ファイル登録（トラック番号が0以外ならマルチトラック）
    AddFile {
        index: usize,
        track: u32,
        path: Option<String>,
    },
    /// 全ファイル登録完了
    AllFilesAdded,
    /// 結果マージ中
    Merge,
    /// 結果マージ完了
    MergeDone { result: Option<String> },
    /// ファイル単位の進捗
    Progress {
        stage: Stage,
        index: usize,
        thread: EngineThread,
        progress: Option<f64>,
        max: Option<f64>,
    },
}

/// ワイヤ上のJSON（フィールドはすべて任意）
#[derive(Debug, Deserialize)]
struct RawRecord {
    stage: String,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    thread: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    track: Option<u32>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    result: Option<String>,
}

/// 行からマーカー以降の本文を取り出す（マーカーがなければ None）
pub fn extract_body(line: &str) -> Option<&str> {
    line.find(PROGRESS_MARKER)
        .map(|pos| line[pos + PROGRESS_MARKER.len()..].trim())
}

/// マーカー以降のJSON本文をパース
pub fn parse_record(body: &str) -> Result<ProgressRecord> {
    let raw: RawRecord = serde_json::from_str(body)?;

    match raw.stage.as_str() {
        STAGE_ALL_FILES_ADDED => return Ok(ProgressRecord::AllFilesAdded),
        STAGE_MERGE => return Ok(ProgressRecord::Merge),
        STAGE_MERGE_DONE => return Ok(ProgressRecord::MergeDone { result: raw.result }),
        _ => {}
    }

    let stage: Stage = raw.stage.parse()?;
    let index = raw
        .index
        .ok_or_else(|| Error::Parse(format!("indexがありません: {}", raw.stage)))?;

    if stage == Stage::AddFile {
        return Ok(ProgressRecord::AddFile {
            index,
            track: raw.track.unwrap_or(0),
            path: raw.path,
        });
    }

    let thread = match raw.thread.as_deref() {
        Some(name) if !name.is_empty() => name.parse()?,
        _ => EngineThread::Main,
    };

    Ok(ProgressRecord::Progress {
        stage,
        index,
        thread,
        progress: raw.progress,
        max: raw.max,
    })
}
