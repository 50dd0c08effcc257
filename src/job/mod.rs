//! 認識ジョブ管理
//!
//! 同時に実行できるジョブは1つだけ。`JobManager` がジョブ枠を持ち、
//! 必要な箇所へ注入して使う。
//!
//! 状態遷移: `Idle → Starting → Running → {Completed | Failed | Cancelled} → Idle`
//!
//! 起動後のやり取りはすべて `JobEvent` で通知する。

mod event;
mod pump;

pub use event::{JobEvent, JobOutcome};

use crate::config::Config;
use crate::engine::{EngineCommand, EngineOptions, EngineProcess};
use crate::error::{DisnoteError, Result};
use crate::project::ProjectStore;
use disnote_common::ProgressAggregator;
use encoding_rs::Encoding;
use pump::JobRun;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

pub type SharedStore = Arc<Mutex<ProjectStore>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn can_transition(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Idle)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Completed, Idle)
                | (Failed, Idle)
                | (Cancelled, Idle)
        )
    }

    fn terminal(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => JobState::Completed,
            JobOutcome::Failed | JobOutcome::LaunchFailed => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// ジョブ枠（0個か1個のジョブ）
#[derive(Debug)]
pub(crate) struct JobSlot {
    state: JobState,
    project_id: Option<usize>,
    cancel: Option<CancellationToken>,
    last_outcome: Option<JobOutcome>,
}

impl JobSlot {
    fn new() -> Self {
        Self {
            state: JobState::Idle,
            project_id: None,
            cancel: None,
            last_outcome: None,
        }
    }

    fn transition(&mut self, next: JobState) {
        if !self.state.can_transition(next) {
            tracing::warn!("想定外の状態遷移: {:?} → {:?}", self.state, next);
        }
        tracing::debug!("ジョブ状態: {:?} → {:?}", self.state, next);
        self.state = next;
    }

    /// 結末を記録して枠を空ける
    pub(crate) fn finish(&mut self, outcome: JobOutcome) {
        self.transition(JobState::terminal(outcome));
        self.last_outcome = Some(outcome);
        self.cancel = None;
        self.project_id = None;
        self.transition(JobState::Idle);
    }
}

/// ジョブ実行に必要な設定
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub engine: Vec<String>,
    pub encoding: &'static Encoding,
    pub kill_grace: Duration,
    pub drain_timeout: Duration,
}

impl JobSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            engine: config.engine.clone(),
            encoding: config.output_encoding()?,
            kill_grace: config.kill_grace(),
            drain_timeout: config.drain_timeout(),
        })
    }
}

pub struct JobManager {
    store: SharedStore,
    settings: JobSettings,
    events: UnboundedSender<JobEvent>,
    slot: Arc<Mutex<JobSlot>>,
}

impl JobManager {
    pub fn new(store: SharedStore, settings: JobSettings, events: UnboundedSender<JobEvent>) -> Self {
        Self {
            store,
            settings,
            events,
            slot: Arc::new(Mutex::new(JobSlot::new())),
        }
    }

    pub fn state(&self) -> JobState {
        lock(&self.slot).state
    }

    /// 実行中のジョブのプロジェクト
    pub fn active_project(&self) -> Option<usize> {
        lock(&self.slot).project_id
    }

    pub fn last_outcome(&self) -> Option<JobOutcome> {
        lock(&self.slot).last_outcome
    }

    /// 認識を開始する。起動したらすぐ戻り、以降はイベントで通知する。
    ///
    /// tokio ランタイム内から呼ぶこと。
    pub fn start(&self, project_id: usize, options: EngineOptions) -> Result<()> {
        let mut slot = lock(&self.slot);
        if slot.state != JobState::Idle {
            return Err(DisnoteError::AlreadyRunning(slot.project_id.unwrap_or(project_id)));
        }

        let project = lock(&self.store).get(project_id)?.clone();
        slot.project_id = Some(project_id);
        slot.transition(JobState::Starting);

        let launched = EngineCommand::for_project(&self.settings.engine, &project, &options)
            .and_then(|command| EngineProcess::spawn(&command))
            .and_then(|process| {
                JobRun::new(
                    project_id,
                    process,
                    self.settings.clone(),
                    ProgressAggregator::new(options.engine_set()),
                    Arc::clone(&self.store),
                    self.events.clone(),
                    Arc::clone(&self.slot),
                )
            });

        let run = match launched {
            Ok(run) => run,
            Err(e) => {
                tracing::error!("エンジンの起動に失敗: {}", e);
                slot.last_outcome = Some(JobOutcome::LaunchFailed);
                slot.project_id = None;
                slot.transition(JobState::Idle);
                let _ = self.events.send(JobEvent::Closed {
                    project_id,
                    code: None,
                    outcome: JobOutcome::LaunchFailed,
                    message: Some(e.to_string()),
                });
                return Err(e);
            }
        };

        {
            let mut store = lock(&self.store);
            if let Err(e) = store.prepare_run(project_id, &options) {
                tracing::warn!("プロジェクトの更新に失敗: {}", e);
            }
            if let Some(message) = store.take_persist_error() {
                let _ = self.events.send(JobEvent::Notice { message });
            }
        }

        let token = CancellationToken::new();
        slot.cancel = Some(token.clone());
        slot.transition(JobState::Running);
        let _ = self.events.send(JobEvent::Started { project_id, pid: run.pid() });

        tokio::spawn(run.run(token));
        Ok(())
    }

    /// 中断を要求する。ジョブがなければ何もしない（何度呼んでもよい）
    pub fn cancel(&self) {
        let slot = lock(&self.slot);
        if let Some(token) = &slot.cancel {
            if !token.is_cancelled() {
                tracing::info!("中断を要求: プロジェクト {:?}", slot.project_id);
                token.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn settings(engine: &[&str]) -> JobSettings {
        JobSettings {
            engine: engine.iter().map(|s| s.to_string()).collect(),
            encoding: encoding_rs::SHIFT_JIS,
            kill_grace: Duration::from_millis(500),
            drain_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_state_transitions() {
        use JobState::*;
        assert!(Idle.can_transition(Starting));
        assert!(Running.can_transition(Cancelled));
        assert!(Cancelled.can_transition(Idle));
        assert!(!Idle.can_transition(Running));
        assert!(!Completed.can_transition(Running));
        assert!(!Running.can_transition(Starting));
    }

    #[test]
    fn test_slot_finish_returns_to_idle() {
        let mut slot = JobSlot::new();
        slot.transition(JobState::Starting);
        slot.transition(JobState::Running);
        slot.project_id = Some(1);
        slot.finish(JobOutcome::Cancelled);
        assert_eq!(slot.state, JobState::Idle);
        assert_eq!(slot.last_outcome, Some(JobOutcome::Cancelled));
        assert!(slot.project_id.is_none());
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::load(&dir.path().join("projects.json")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = JobManager::new(Arc::new(Mutex::new(store)), settings(&["true"]), tx);

        manager.cancel();
        manager.cancel();
        assert_eq!(manager.state(), JobState::Idle);
        assert!(manager.last_outcome().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_unknown_project() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::load(&dir.path().join("projects.json")).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = JobManager::new(Arc::new(Mutex::new(store)), settings(&["true"]), tx);

        let result = manager.start(5, EngineOptions::default());
        assert!(matches!(result, Err(DisnoteError::ProjectNotFound(5))));
        assert_eq!(manager.state(), JobState::Idle);
    }

    #[tokio::test]
    async fn test_launch_failure_closes_job() {
        let dir = tempdir().unwrap();
        let mut store = ProjectStore::load(&dir.path().join("projects.json")).unwrap();
        store.find_or_create(&[PathBuf::from("/rec/a.wav")]).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = JobManager::new(
            Arc::new(Mutex::new(store)),
            settings(&["/nonexistent/disnote-engine"]),
            tx,
        );

        let result = manager.start(0, EngineOptions::default());
        assert!(matches!(result, Err(DisnoteError::EngineLaunch(_))));
        assert_eq!(manager.state(), JobState::Idle);
        assert_eq!(manager.last_outcome(), Some(JobOutcome::LaunchFailed));

        match rx.try_recv().unwrap() {
            JobEvent::Closed { project_id, code, outcome, message } => {
                assert_eq!(project_id, 0);
                assert_eq!(code, None);
                assert_eq!(outcome, JobOutcome::LaunchFailed);
                assert!(message.is_some());
            }
            other => panic!("Closed expected: {:?}", other),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::default();
        let settings = JobSettings::from_config(&config).unwrap();
        assert_eq!(settings.encoding, encoding_rs::SHIFT_JIS);

        let config = Config { encoding: "klingon".into(), ..Config::default() };
        assert!(JobSettings::from_config(&config).is_err());
    }
}
