//! ジョブから表示層へ送るイベント

use crate::project::Project;
use disnote_common::DisplayEvent;
use serde::Serialize;

/// ジョブの結末
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// 終了コード0、またはマージ完了後の中断
    Completed,
    /// 0以外の終了コード
    Failed,
    /// 終了コードなし（中断）
    Cancelled,
    /// エンジンを起動できなかった
    LaunchFailed,
}

impl JobOutcome {
    /// 終了コードとマージ完了の有無から決める
    pub fn classify(code: Option<i32>, merge_done: bool) -> Self {
        match code {
            Some(0) => JobOutcome::Completed,
            Some(_) => JobOutcome::Failed,
            None if merge_done => JobOutcome::Completed,
            None => JobOutcome::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        project_id: usize,
        pid: Option<u32>,
    },
    /// エンジンの標準エラー出力（1行）
    Diagnostic { line: String },
    Progress(DisplayEvent),
    /// 認識結果を反映したプロジェクト
    ProjectUpdated(Project),
    /// 保存失敗などの通知（ジョブは続行）
    Notice { message: String },
    Closed {
        project_id: usize,
        /// 終了コード（中断時は null）
        code: Option<i32>,
        outcome: JobOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}
