//! 表示層へ渡すイベントの型定義

use crate::stage::{EngineThread, Stage};
use serde::{Deserialize, Serialize};

/// エンジンが登録したファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecFile {
    pub index: usize,
    pub track: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// 今回の実行で有効な副エンジン
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSet {
    pub witai: bool,
    pub whisper: bool,
}

impl EngineSet {
    /// 表示する列（主エンジンは常に含む）
    pub fn threads(&self) -> Vec<EngineThread> {
        let mut threads = vec![EngineThread::Main];
        if self.witai {
            threads.push(EngineThread::Witai);
        }
        if self.whisper {
            threads.push(EngineThread::Whisper);
        }
        threads
    }
}

/// 全ファイル登録後に確定する進捗テーブルの構造
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTable {
    pub files: Vec<RecFile>,
    pub multitrack: bool,
    pub threads: Vec<EngineThread>,
    pub stages: Vec<Stage>,
}

/// ProgressAggregator が出力する表示イベント
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayEvent {
    /// テーブル構造の確定
    TableReady(StageTable),
    /// ファイル・ステージ・エンジン単位の進捗
    FileProgress {
        file: usize,
        thread: EngineThread,
        stage: Stage,
        percent: u32,
    },
    /// ジョブ全体の進捗（0/50/100）
    Overall { percent: u8 },
    /// 結果マージ完了
    MergeComplete { result: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_set_threads() {
        assert_eq!(EngineSet::default().threads(), vec![EngineThread::Main]);
        let all = EngineSet { witai: true, whisper: true };
        assert_eq!(
            all.threads(),
            vec![EngineThread::Main, EngineThread::Witai, EngineThread::Whisper]
        );
        let whisper_only = EngineSet { witai: false, whisper: true };
        assert_eq!(whisper_only.threads(), vec![EngineThread::Main, EngineThread::Whisper]);
    }

    #[test]
    fn test_display_event_json_shape() {
        let event = DisplayEvent::FileProgress {
            file: 1,
            thread: EngineThread::Witai,
            stage: Stage::Rec,
            percent: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "file_progress");
        assert_eq!(json["thread"], "witai");
        assert_eq!(json["stage"], "rec");
        assert_eq!(json["percent"], 42);
    }
}
