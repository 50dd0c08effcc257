//! ジョブイベントの表示
//!
//! 端末向けの進捗バー表示と、機械処理向けの JSON Lines 出力の2種類。

use crate::job::{JobEvent, JobOutcome};
use disnote_common::{DisplayEvent, EngineThread, RecFile, StageTable};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;

pub trait Renderer {
    fn render(&mut self, event: &JobEvent);

    /// ジョブ終了後の後始末
    fn finish(&mut self) {}
}

/// 1イベント1行のJSONで出力
pub struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for JsonLines<W> {
    fn render(&mut self, event: &JobEvent) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());
        if let Err(e) = written {
            tracing::warn!("イベントの出力に失敗: {}", e);
        }
    }
}

fn file_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>28} {bar:30.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>28} {bar:30.green/white} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// 行の見出し（マルチトラックならトラック番号付き）
fn row_label(file: &RecFile, multitrack: bool, thread: EngineThread) -> String {
    let name = file
        .path
        .as_deref()
        .and_then(|p| std::path::Path::new(p).file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("#{}", file.index));

    let name = if multitrack {
        format!("{} (track {})", name, file.track)
    } else {
        name
    };

    match thread {
        EngineThread::Main => name,
        other => format!("{} [{}]", name, other),
    }
}

/// indicatif による進捗表示（ファイル×エンジンごとに1本、全体に1本）
pub struct ProgressView {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: HashMap<(usize, EngineThread), ProgressBar>,
    table: Option<StageTable>,
}

impl ProgressView {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    pub fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(100));
        overall.set_style(overall_style());
        overall.set_prefix("全体");

        Self {
            multi,
            overall,
            bars: HashMap::new(),
            table: None,
        }
    }

    fn println(&self, line: &str) {
        if self.multi.println(line).is_err() {
            eprintln!("{}", line);
        }
    }

    fn bar(&mut self, file: usize, thread: EngineThread) -> &ProgressBar {
        let multi = &self.multi;
        let table = &self.table;
        let overall = &self.overall;
        self.bars.entry((file, thread)).or_insert_with(|| {
            let label = table
                .as_ref()
                .and_then(|t| t.files.iter().find(|f| f.index == file).map(|f| (f, t.multitrack)))
                .map(|(f, multitrack)| row_label(f, multitrack, thread))
                .unwrap_or_else(|| format!("#{} [{}]", file, thread));

            let bar = multi.insert_before(overall, ProgressBar::new(100));
            bar.set_style(file_style());
            bar.set_prefix(label);
            bar
        })
    }

    fn on_table(&mut self, table: &StageTable) {
        self.table = Some(table.clone());
        for file in &table.files {
            for &thread in &table.threads {
                self.bar(file.index, thread);
            }
        }
    }

    /// 表示中のバーの数
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn position(&self, file: usize, thread: EngineThread) -> Option<u64> {
        self.bars.get(&(file, thread)).map(|b| b.position())
    }

    pub fn overall_position(&self) -> u64 {
        self.overall.position()
    }
}

impl Default for ProgressView {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for ProgressView {
    fn render(&mut self, event: &JobEvent) {
        match event {
            JobEvent::Started { project_id, pid } => {
                tracing::debug!("表示開始: プロジェクト {} pid {:?}", project_id, pid);
                self.overall.set_message("認識中");
            }
            JobEvent::Diagnostic { line } => self.println(line),
            JobEvent::Progress(DisplayEvent::TableReady(table)) => self.on_table(table),
            JobEvent::Progress(DisplayEvent::FileProgress { file, thread, stage, percent }) => {
                let bar = self.bar(*file, *thread);
                bar.set_message(stage.label());
                bar.set_position(u64::from(*percent));
            }
            JobEvent::Progress(DisplayEvent::Overall { percent }) => {
                self.overall.set_position(u64::from(*percent));
            }
            JobEvent::Progress(DisplayEvent::MergeComplete { result }) => {
                self.overall.set_message("マージ完了");
                if let Some(result) = result {
                    self.println(&format!("結果: {}", result));
                }
            }
            JobEvent::ProjectUpdated(project) => {
                tracing::debug!("プロジェクト更新: {}", project.id);
            }
            JobEvent::Notice { message } => self.println(&format!("⚠ {}", message)),
            JobEvent::Closed { outcome, code, message, .. } => {
                let text = match outcome {
                    JobOutcome::Completed => "✔ 認識完了".to_string(),
                    JobOutcome::Cancelled => "中断しました".to_string(),
                    JobOutcome::Failed => format!("✖ エンジンが異常終了 (code {:?})", code),
                    JobOutcome::LaunchFailed => "✖ エンジンを起動できません".to_string(),
                };
                self.overall.set_message(text);
                if let Some(message) = message {
                    self.println(message);
                }
            }
        }
    }

    fn finish(&mut self) {
        for bar in self.bars.values() {
            bar.abandon();
        }
        self.overall.abandon();
    }
}
