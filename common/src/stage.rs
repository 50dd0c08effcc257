//! ステージ語彙
//!
//! エンジンが報告するファイル単位の処理段階。宣言順がそのまま処理順で、
//! `Ord` の比較で前後関係を判定する。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ファイル単位の処理段階（宣言順 = 処理順）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// ファイル登録
    AddFile,
    /// 無音解析
    Seg,
    /// 分割計画
    Split,
    /// 音声分割
    SplitAudio,
    /// 認識待ち
    RecWait,
    /// 音声認識
    Rec,
    /// 音声変換
    ConvAudio,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::AddFile,
        Stage::Seg,
        Stage::Split,
        Stage::SplitAudio,
        Stage::RecWait,
        Stage::Rec,
        Stage::ConvAudio,
    ];

    /// ワイヤ上の名前
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AddFile => "add_file",
            Stage::Seg => "seg",
            Stage::Split => "split",
            Stage::SplitAudio => "split_audio",
            Stage::RecWait => "rec_wait",
            Stage::Rec => "rec",
            Stage::ConvAudio => "conv_audio",
        }
    }

    /// 表示用ラベル
    pub fn label(&self) -> &'static str {
        match self {
            Stage::AddFile => "登録",
            Stage::Seg => "無音解析",
            Stage::Split => "分割計画",
            Stage::SplitAudio => "音声分割",
            Stage::RecWait => "認識待ち",
            Stage::Rec => "音声認識",
            Stage::ConvAudio => "音声変換",
        }
    }

    /// 表示テーブルの列になるステージ（登録は列にしない）
    pub fn columns() -> &'static [Stage] {
        &Self::ALL[1..]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| Error::Parse(format!("不明なステージ: {}", s)))
    }
}

/// 進捗レコードがどの認識エンジンのものか
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineThread {
    /// 主エンジン（Google）
    Main,
    /// 副エンジン wit.ai
    Witai,
    /// 副エンジン Whisper
    Whisper,
}

impl EngineThread {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineThread::Main => "main",
            EngineThread::Witai => "witai",
            EngineThread::Whisper => "whisper",
        }
    }
}

impl Default for EngineThread {
    fn default() -> Self {
        EngineThread::Main
    }
}

impl fmt::Display for EngineThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineThread {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "main" | "google" => Ok(EngineThread::Main),
            "witai" | "wit.ai" => Ok(EngineThread::Witai),
            "whisper" => Ok(EngineThread::Whisper),
            _ => Err(Error::Parse(format!("不明なエンジンスレッド: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_follows_processing_order() {
        assert!(Stage::AddFile < Stage::Seg);
        assert!(Stage::Seg < Stage::Split);
        assert!(Stage::SplitAudio < Stage::RecWait);
        assert!(Stage::Rec < Stage::ConvAudio);

        let mut sorted = Stage::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, Stage::ALL.to_vec());
    }

    #[test]
    fn test_stage_from_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert!("merge".parse::<Stage>().is_err());
        assert!("".parse::<Stage>().is_err());
    }

    #[test]
    fn test_stage_serde_name_matches_wire_name() {
        let json = serde_json::to_string(&Stage::SplitAudio).unwrap();
        assert_eq!(json, "\"split_audio\"");
    }

    #[test]
    fn test_columns_exclude_add_file() {
        assert!(!Stage::columns().contains(&Stage::AddFile));
        assert_eq!(Stage::columns().len(), 6);
    }

    #[test]
    fn test_engine_thread_from_str() {
        assert_eq!("main".parse::<EngineThread>().unwrap(), EngineThread::Main);
        assert_eq!("Google".parse::<EngineThread>().unwrap(), EngineThread::Main);
        assert_eq!("witai".parse::<EngineThread>().unwrap(), EngineThread::Witai);
        assert_eq!("whisper".parse::<EngineThread>().unwrap(), EngineThread::Whisper);
        assert!("vosk".parse::<EngineThread>().is_err());
    }
}
