//! ジョブ1件分のイベントポンプ
//!
//! 標準出力・標準エラー・終了待ち・中断要求を1つのタスクで待つ。
//! 両方のパイプが EOF になってから終了を通知するので、
//! 最後の進捗行より先に `Closed` が届くことはない。

use super::{lock, JobEvent, JobOutcome, JobSettings, JobSlot, SharedStore};
use crate::engine::EngineProcess;
use crate::error::{DisnoteError, Result};
use crate::project::local_now;
use disnote_common::{DisplayEvent, ProgressAggregator, StreamDecoder};
use encoding_rs::Encoding;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

const READ_BUFFER_SIZE: usize = 8192;

/// 無効な期限（select! の分岐は無効でも式が評価されるため）
fn deadline_or_never(at: Option<Instant>) -> Instant {
    at.unwrap_or_else(|| Instant::now() + Duration::from_secs(86_400))
}

pub(super) struct JobRun {
    project_id: usize,
    process: EngineProcess,
    stdout: ChildStdout,
    stderr: ChildStderr,
    encoding: &'static Encoding,
    kill_grace: Duration,
    drain_timeout: Duration,
    aggregator: ProgressAggregator,
    store: SharedStore,
    events: UnboundedSender<JobEvent>,
    slot: Arc<Mutex<JobSlot>>,
    committed: bool,
}

impl JobRun {
    pub(super) fn new(
        project_id: usize,
        mut process: EngineProcess,
        settings: JobSettings,
        aggregator: ProgressAggregator,
        store: SharedStore,
        events: UnboundedSender<JobEvent>,
        slot: Arc<Mutex<JobSlot>>,
    ) -> Result<Self> {
        let (stdout, stderr) = match (process.take_stdout(), process.take_stderr()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                let _ = process.kill();
                return Err(DisnoteError::EngineLaunch("エンジンの出力を取得できません".into()));
            }
        };

        Ok(Self {
            project_id,
            process,
            stdout,
            stderr,
            encoding: settings.encoding,
            kill_grace: settings.kill_grace,
            drain_timeout: settings.drain_timeout,
            aggregator,
            store,
            events,
            slot,
            committed: false,
        })
    }

    pub(super) fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub(super) async fn run(mut self, cancel: CancellationToken) {
        let mut stdout_decoder = StreamDecoder::new(self.encoding);
        let mut stderr_decoder = StreamDecoder::new(self.encoding);
        let mut stdout_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut stderr_buf = vec![0u8; READ_BUFFER_SIZE];
        let mut stdout_open = true;
        let mut stderr_open = true;

        let mut exit: Option<std::io::Result<ExitStatus>> = None;
        let mut cancel_requested = false;
        let mut kill_at: Option<Instant> = None;
        let mut drain_until: Option<Instant> = None;

        let start = self.aggregator.start();
        self.emit(JobEvent::Progress(start));

        loop {
            if exit.is_some() && !stdout_open && !stderr_open {
                break;
            }

            tokio::select! {
                read = self.stdout.read(&mut stdout_buf), if stdout_open => {
                    let lines = match read {
                        Ok(0) => {
                            stdout_open = false;
                            stdout_decoder.finish()
                        }
                        Ok(n) => stdout_decoder.feed(&stdout_buf[..n]),
                        Err(e) => {
                            tracing::warn!("標準出力の読み込みに失敗: {}", e);
                            stdout_open = false;
                            stdout_decoder.finish()
                        }
                    };
                    self.handle_stdout(lines);
                }
                read = self.stderr.read(&mut stderr_buf), if stderr_open => {
                    let lines = match read {
                        Ok(0) => {
                            stderr_open = false;
                            stderr_decoder.finish()
                        }
                        Ok(n) => stderr_decoder.feed(&stderr_buf[..n]),
                        Err(e) => {
                            tracing::warn!("標準エラーの読み込みに失敗: {}", e);
                            stderr_open = false;
                            stderr_decoder.finish()
                        }
                    };
                    self.handle_stderr(lines);
                }
                status = self.process.wait(), if exit.is_none() => {
                    tracing::info!("エンジン終了: {:?}", status);
                    exit = Some(status);
                    kill_at = None;
                    if stdout_open || stderr_open {
                        drain_until = Some(Instant::now() + self.drain_timeout);
                    }
                }
                _ = cancel.cancelled(), if !cancel_requested && exit.is_none() => {
                    cancel_requested = true;
                    if let Err(e) = self.process.terminate() {
                        tracing::warn!("終了要求の送信に失敗: {}", e);
                    }
                    kill_at = Some(Instant::now() + self.kill_grace);
                }
                _ = sleep_until(deadline_or_never(kill_at)), if kill_at.is_some() && exit.is_none() => {
                    tracing::warn!("エンジンが終了しないため強制終了します");
                    if let Err(e) = self.process.kill() {
                        tracing::warn!("強制終了に失敗: {}", e);
                    }
                    kill_at = None;
                }
                _ = sleep_until(deadline_or_never(drain_until)), if drain_until.is_some() => {
                    // 孫プロセスがパイプを握ったままのときは待ちきらない
                    tracing::warn!("エンジン終了後も出力が閉じられません");
                    break;
                }
            }
        }

        if stdout_open {
            let lines = stdout_decoder.finish();
            self.handle_stdout(lines);
        }
        if stderr_open {
            let lines = stderr_decoder.finish();
            self.handle_stderr(lines);
        }

        self.close(exit);
    }

    fn emit(&self, event: JobEvent) {
        // 受信側が閉じていても処理は続ける
        let _ = self.events.send(event);
    }

    fn handle_stdout(&mut self, lines: Vec<String>) {
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            tracing::trace!(target: "disnote::engine", "{}", line);

            for event in self.aggregator.apply_line(&line) {
                let merged = match &event {
                    DisplayEvent::MergeComplete { result } => Some(result.clone()),
                    _ => None,
                };
                self.emit(JobEvent::Progress(event));

                if let Some(result) = merged {
                    self.commit(result.map(PathBuf::from));
                }
            }
        }
    }

    fn handle_stderr(&mut self, lines: Vec<String>) {
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            tracing::debug!(target: "disnote::engine", "{}", line);
            self.emit(JobEvent::Diagnostic { line });
        }
    }

    /// 認識完了を記録（1ジョブにつき1回）
    fn commit(&mut self, result: Option<PathBuf>) {
        if self.committed {
            return;
        }

        let (updated, persist_error) = {
            let mut store = lock(&self.store);
            let updated = store.mark_recognized(self.project_id, result, local_now());
            (updated, store.take_persist_error())
        };

        match updated {
            Ok(project) => {
                self.committed = true;
                self.emit(JobEvent::ProjectUpdated(project));
            }
            Err(e) => tracing::error!("認識結果の記録に失敗: {}", e),
        }
        if let Some(message) = persist_error {
            self.emit(JobEvent::Notice { message });
        }
    }

    fn close(mut self, exit: Option<std::io::Result<ExitStatus>>) {
        let (code, outcome, message) = match exit {
            Some(Ok(status)) => {
                let code = status.code();
                let outcome = JobOutcome::classify(code, self.aggregator.is_merge_done());
                (code, outcome, None)
            }
            Some(Err(e)) => (None, JobOutcome::Failed, Some(e.to_string())),
            None => (None, JobOutcome::Failed, Some("終了状態を取得できません".to_string())),
        };

        // マージ完了行を出さずに正常終了した場合
        if code == Some(0) {
            self.commit(None);
        }

        tracing::info!(
            "ジョブ終了: プロジェクト {} code={:?} {:?}",
            self.project_id,
            code,
            outcome
        );
        lock(&self.slot).finish(outcome);

        self.emit(JobEvent::Closed {
            project_id: self.project_id,
            code,
            outcome,
            message,
        });
    }
}
