//! プロジェクトリストの永続化
//!
//! リスト全体をJSONで上書き保存する。一時ファイルに書いてから置き換えるので、
//! 書き込み途中で落ちても既存のファイルは壊れない。
//! 空のリストは保存しない（誤って全消去しないため）。

use super::types::{compare_projects, local_now, Project, SortKey, SortOrder};
use crate::engine::EngineOptions;
use crate::error::{DisnoteError, Result};
use crate::persist::write_json_atomic;
use std::path::{Path, PathBuf};

/// ファイルをドロップしたときの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// 新規プロジェクト
    Created(usize),
    /// 無効化されていたプロジェクトを再有効化
    Reenabled(usize),
    /// 既存プロジェクトの更新時刻のみ更新
    Refreshed(usize),
}

impl DropOutcome {
    pub fn id(&self) -> usize {
        match *self {
            DropOutcome::Created(id) | DropOutcome::Reenabled(id) | DropOutcome::Refreshed(id) => id,
        }
    }

    /// 新規扱いで表示すべきプロジェクトのid
    pub fn new_for_display(&self) -> Option<usize> {
        match *self {
            DropOutcome::Created(id) | DropOutcome::Reenabled(id) => Some(id),
            DropOutcome::Refreshed(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct ProjectStore {
    path: PathBuf,
    projects: Vec<Project>,
    persist_error: Option<String>,
}

impl ProjectStore {
    /// プロジェクトリストを読み込み（ファイルがなければ空）
    pub fn load(path: &Path) -> Result<Self> {
        let mut store = Self {
            path: path.to_path_buf(),
            projects: Vec::new(),
            persist_error: None,
        };

        if !path.exists() {
            return Ok(store);
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(store);
        }

        store.projects = serde_json::from_str(content.trim_start_matches('\u{FEFF}'))
            .map_err(|e| DisnoteError::CorruptProjects(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("プロジェクト {}件を読み込み: {}", store.projects.len(), path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// 同じファイル集合のプロジェクトを探し、なければ作成
    pub fn find_or_create(&mut self, file_paths: &[PathBuf]) -> Result<DropOutcome> {
        if file_paths.is_empty() {
            return Err(DisnoteError::EmptyFileList);
        }

        // ドロップ順は意味を持たないのでソートして比較
        let mut sorted = file_paths.to_vec();
        sorted.sort();

        let now = local_now();
        let outcome = match self.projects.iter_mut().find(|p| p.matches(&sorted)) {
            Some(project) => {
                project.modified = Some(now);
                if project.enabled {
                    DropOutcome::Refreshed(project.id)
                } else {
                    project.enabled = true;
                    DropOutcome::Reenabled(project.id)
                }
            }
            None => {
                let id = self.projects.len();
                self.projects.push(Project::new(id, &sorted, &now));
                DropOutcome::Created(id)
            }
        };

        tracing::info!("プロジェクト {:?}", outcome);
        self.persist();
        Ok(outcome)
    }

    pub fn get(&self, id: usize) -> Result<&Project> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .ok_or(DisnoteError::ProjectNotFound(id))
    }

    fn get_mut(&mut self, id: usize) -> Result<&mut Project> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(DisnoteError::ProjectNotFound(id))
    }

    /// 一覧から外す（ファイルを再ドロップすれば戻る）
    pub fn disable(&mut self, id: usize) -> Result<()> {
        self.get_mut(id)?.enabled = false;
        self.persist();
        Ok(())
    }

    /// 認識結果を記録（結果ファイルが不明なら前回の値を残す）
    pub fn mark_recognized(
        &mut self,
        id: usize,
        result: Option<PathBuf>,
        timestamp: String,
    ) -> Result<Project> {
        let project = self.get_mut(id)?;
        project.recognized = Some(timestamp);
        if result.is_some() {
            project.result = result;
        }
        let updated = project.clone();
        self.persist();
        Ok(updated)
    }

    pub fn touch_access(&mut self, id: usize) -> Result<()> {
        self.get_mut(id)?.accessed = Some(local_now());
        self.persist();
        Ok(())
    }

    pub fn record_options(&mut self, id: usize, options: &EngineOptions) -> Result<()> {
        self.get_mut(id)?.last_options = Some(options.clone());
        self.persist();
        Ok(())
    }

    /// 認識開始時の記録（エンジン指定とアクセス時刻、保存は1回）
    pub fn prepare_run(&mut self, id: usize, options: &EngineOptions) -> Result<()> {
        let project = self.get_mut(id)?;
        project.last_options = Some(options.clone());
        project.accessed = Some(local_now());
        self.persist();
        Ok(())
    }

    /// 有効なプロジェクトを並び替えて返す
    pub fn list_sorted(&self, key: SortKey, order: SortOrder) -> Vec<&Project> {
        let mut list: Vec<&Project> = self.projects.iter().filter(|p| p.enabled).collect();
        list.sort_by(|a, b| compare_projects(a, b, key, order));
        list
    }

    /// 直近の保存失敗（表示層への通知用）
    pub fn take_persist_error(&mut self) -> Option<String> {
        self.persist_error.take()
    }

    /// 保存。失敗してもメモリ上の状態を正とし、エラーは記録だけする
    fn persist(&mut self) {
        if self.projects.is_empty() {
            tracing::debug!("プロジェクトが空のため保存をスキップ");
            return;
        }

        match write_json_atomic(&self.path, &self.projects) {
            Ok(()) => {
                tracing::debug!("プロジェクトリストを保存: {}", self.path.display());
            }
            Err(e) => {
                tracing::error!("プロジェクトリストの保存に失敗: {}: {}", self.path.display(), e);
                // 通知されるまで最初の失敗を残す
                if self.persist_error.is_none() {
                    self.persist_error = Some(e.to_string());
                }
            }
        }
    }
}
