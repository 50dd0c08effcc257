//! 進捗集計
//!
//! 進捗レコードを受け取り、(ファイル, スレッド) ごとのステージと
//! (ファイル, ステージ, スレッド) ごとの割合を保持する。
//! エンジンの報告が前後しても、表示が後戻りすることはない:
//! - 割合は前回より大きいときだけ更新
//! - ステージは語彙順で厳密に後ろのときだけ進める
//!
//! I/Oを持たない同期的な変換器で、ジョブ1回分の寿命を持つ。

use crate::event::{DisplayEvent, EngineSet, RecFile, StageTable};
use crate::record::{extract_body, parse_record, ProgressRecord};
use crate::stage::{EngineThread, Stage};
use std::collections::{BTreeMap, HashMap};

const OVERALL_MERGING: u8 = 50;
const OVERALL_DONE: u8 = 100;

#[derive(Debug, Clone, Default)]
struct ThreadProgress {
    stage: Option<Stage>,
    percents: BTreeMap<Stage, u32>,
}

#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    engines: EngineSet,
    recfiles: Vec<RecFile>,
    multitrack: bool,
    table_ready: bool,
    progress: HashMap<(usize, EngineThread), ThreadProgress>,
    overall: u8,
    merge_done: bool,
}

/// `100 × progress / max`（maxがなければ0、100で頭打ち）
pub fn percentage(progress: Option<f64>, max: Option<f64>) -> u32 {
    match (progress, max) {
        (Some(progress), Some(max)) if max > 0.0 && progress.is_finite() => {
            (progress * 100.0 / max).floor().clamp(0.0, 100.0) as u32
        }
        _ => 0,
    }
}

impl ProgressAggregator {
    pub fn new(engines: EngineSet) -> Self {
        Self {
            engines,
            recfiles: Vec::new(),
            multitrack: false,
            table_ready: false,
            progress: HashMap::new(),
            overall: 0,
            merge_done: false,
        }
    }

    /// ジョブ開始時の表示イベント
    pub fn start(&self) -> DisplayEvent {
        DisplayEvent::Overall { percent: self.overall }
    }

    /// 標準出力の1行を処理する。マーカーのない行と壊れたレコードは捨てる
    pub fn apply_line(&mut self, line: &str) -> Vec<DisplayEvent> {
        let Some(body) = extract_body(line) else {
            return Vec::new();
        };

        match parse_record(body) {
            Ok(record) => self.apply(record),
            Err(e) => {
                tracing::warn!("進捗レコードを破棄: {} ({})", e, body);
                Vec::new()
            }
        }
    }

    pub fn apply(&mut self, record: ProgressRecord) -> Vec<DisplayEvent> {
        match record {
            ProgressRecord::AddFile { index, track, path } => {
                self.register_file(index, track, path);
                Vec::new()
            }
            ProgressRecord::AllFilesAdded => {
                if self.table_ready {
                    return Vec::new();
                }
                self.table_ready = true;
                vec![DisplayEvent::TableReady(self.table())]
            }
            ProgressRecord::Merge => self.advance_overall(OVERALL_MERGING).into_iter().collect(),
            ProgressRecord::MergeDone { result } => {
                if self.merge_done {
                    return Vec::new();
                }
                self.merge_done = true;
                let mut events: Vec<DisplayEvent> =
                    self.advance_overall(OVERALL_DONE).into_iter().collect();
                events.push(DisplayEvent::MergeComplete { result });
                events
            }
            ProgressRecord::Progress { stage, index, thread, progress, max } => self
                .update_progress(index, stage, thread, percentage(progress, max))
                .into_iter()
                .collect(),
        }
    }

    fn register_file(&mut self, index: usize, track: u32, path: Option<String>) {
        if self.recfiles.iter().any(|f| f.index == index) {
            tracing::debug!("登録済みのファイル: {}", index);
            return;
        }
        if track != 0 {
            self.multitrack = true;
        }
        self.recfiles.push(RecFile { index, track, path });
    }

    fn advance_overall(&mut self, percent: u8) -> Option<DisplayEvent> {
        if percent <= self.overall {
            return None;
        }
        self.overall = percent;
        Some(DisplayEvent::Overall { percent })
    }

    fn update_progress(
        &mut self,
        index: usize,
        stage: Stage,
        thread: EngineThread,
        percent: u32,
    ) -> Option<DisplayEvent> {
        let entry = self.progress.entry((index, thread)).or_default();

        let percent_changed = match entry.percents.get(&stage) {
            Some(&stored) if percent <= stored => false,
            _ => {
                entry.percents.insert(stage, percent);
                true
            }
        };

        let stage_advanced = match entry.stage {
            Some(current) if stage <= current => false,
            _ => {
                entry.stage = Some(stage);
                true
            }
        };

        if !percent_changed && !stage_advanced {
            return None;
        }

        // 前のステージの遅れた報告は記録のみ（表示は現在のステージ）
        if entry.stage != Some(stage) {
            return None;
        }

        let percent = entry.percents.get(&stage).copied().unwrap_or(percent);
        Some(DisplayEvent::FileProgress { file: index, thread, stage, percent })
    }

    /// 進捗テーブルの構造
    pub fn table(&self) -> StageTable {
        let mut files = self.recfiles.clone();
        files.sort_by_key(|f| f.index);
        StageTable {
            files,
            multitrack: self.multitrack,
            threads: self.engines.threads(),
            stages: Stage::columns().to_vec(),
        }
    }

    /// ファイルの表示ステージ（主エンジンのステージ）
    pub fn displayed_stage(&self, index: usize) -> Option<Stage> {
        self.stage(index, EngineThread::Main)
    }

    pub fn stage(&self, index: usize, thread: EngineThread) -> Option<Stage> {
        self.progress.get(&(index, thread)).and_then(|p| p.stage)
    }

    pub fn percent(&self, index: usize, stage: Stage, thread: EngineThread) -> Option<u32> {
        self.progress
            .get(&(index, thread))
            .and_then(|p| p.percents.get(&stage).copied())
    }

    pub fn recfiles(&self) -> &[RecFile] {
        &self.recfiles
    }

    pub fn is_multitrack(&self) -> bool {
        self.multitrack
    }

    pub fn is_table_ready(&self) -> bool {
        self.table_ready
    }

    pub fn overall(&self) -> u8 {
        self.overall
    }

    pub fn is_merge_done(&self) -> bool {
        self.merge_done
    }
}
