//! プロジェクトの型定義

use crate::engine::EngineOptions;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// 時刻の表示形式（ローカル時刻）
pub const TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

/// まだ時刻が記録されていないことを表す値（保存形式）
pub const NOT_RECOGNIZED: &str = "未認識";

pub fn local_now() -> String {
    chrono::Local::now().format(TIME_FORMAT).to_string()
}

/// プロジェクトに含まれるメディアファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub fullpath: PathBuf,
    pub filename: String,
    /// 拡張子なしのファイル名（話者名として表示）
    pub name: String,
}

impl ProjectFile {
    pub fn from_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let name = match filename.rfind('.') {
            Some(pos) if pos > 0 => filename[..pos].to_string(),
            _ => filename.clone(),
        };

        Self {
            fullpath: path.to_path_buf(),
            filename,
            name,
        }
    }
}

/// 認識対象のメディアファイルをまとめた単位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: usize,
    pub title: String,
    pub dir: PathBuf,
    pub files: Vec<ProjectFile>,
    pub enabled: bool,

    #[serde(rename = "created_time")]
    pub created: String,

    #[serde(rename = "recognized_time", default, with = "stamp")]
    pub recognized: Option<String>,

    #[serde(rename = "modified_time", default, with = "stamp")]
    pub modified: Option<String>,

    #[serde(rename = "access_time", default, with = "stamp")]
    pub accessed: Option<String>,

    /// 認識結果ファイル（認識成功後のみ）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PathBuf>,

    /// 前回の認識で使ったエンジン指定
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_options: Option<EngineOptions>,
}

impl Project {
    /// ソート済みのパスから新規作成
    pub fn new(id: usize, sorted_paths: &[PathBuf], now: &str) -> Self {
        let dir = sorted_paths
            .first()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self {
            id,
            title: now.to_string(),
            dir,
            files: sorted_paths.iter().map(|p| ProjectFile::from_path(p)).collect(),
            enabled: true,
            created: now.to_string(),
            recognized: None,
            modified: None,
            accessed: None,
            result: None,
            last_options: None,
        }
    }

    pub fn file_paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.fullpath.as_path()).collect()
    }

    /// ソート済みのパス列と同じファイル集合か
    pub fn matches(&self, sorted_paths: &[PathBuf]) -> bool {
        if self.files.len() != sorted_paths.len() {
            return false;
        }
        let mut own = self.file_paths();
        own.sort();
        own.iter().zip(sorted_paths).all(|(a, b)| *a == b.as_path())
    }
}

/// 一覧の並び替えキー
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SortKey {
    #[default]
    Id,
    Title,
    Created,
    Recognized,
    Modified,
    Accessed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// キーで比較し、同値はidで決める（方向はキーと同じ）
pub fn compare_projects(a: &Project, b: &Project, key: SortKey, order: SortOrder) -> Ordering {
    let primary = match key {
        SortKey::Id => Ordering::Equal,
        SortKey::Title => a.title.cmp(&b.title),
        SortKey::Created => a.created.cmp(&b.created),
        SortKey::Recognized => a.recognized.cmp(&b.recognized),
        SortKey::Modified => a.modified.cmp(&b.modified),
        SortKey::Accessed => a.accessed.cmp(&b.accessed),
    };
    let ordering = primary.then(a.id.cmp(&b.id));

    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// 未記録の時刻を `未認識` として読み書きする
mod stamp {
    use super::NOT_RECOGNIZED;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_deref().unwrap_or(NOT_RECOGNIZED))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.filter(|s| !s.is_empty() && s != NOT_RECOGNIZED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_file_from_path() {
        let file = ProjectFile::from_path(Path::new("/rec/話者A.part1.flac"));
        assert_eq!(file.filename, "話者A.part1.flac");
        assert_eq!(file.name, "話者A.part1");

        let file = ProjectFile::from_path(Path::new("/rec/noext"));
        assert_eq!(file.name, "noext");
    }

    #[test]
    fn test_new_project() {
        let paths = vec![PathBuf::from("/rec/a.wav"), PathBuf::from("/rec/b.wav")];
        let project = Project::new(3, &paths, "2024/05/01 10:00");
        assert_eq!(project.id, 3);
        assert_eq!(project.dir, PathBuf::from("/rec"));
        assert_eq!(project.title, "2024/05/01 10:00");
        assert_eq!(project.files[1].name, "b");
        assert!(project.enabled);
        assert!(project.recognized.is_none());
    }

    #[test]
    fn test_matches_is_order_independent() {
        let paths = vec![PathBuf::from("/rec/a.wav"), PathBuf::from("/rec/b.wav")];
        let mut project = Project::new(0, &paths, "t");
        project.files.reverse();
        assert!(project.matches(&paths));
        assert!(!project.matches(&paths[..1]));
        assert!(!project.matches(&[PathBuf::from("/rec/a.wav"), PathBuf::from("/rec/c.wav")]));
    }

    #[test]
    fn test_timestamp_sentinel_roundtrip() {
        let project = Project::new(0, &[PathBuf::from("/rec/a.wav")], "2024/05/01 10:00");
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["recognized_time"], NOT_RECOGNIZED);
        assert_eq!(json["created_time"], "2024/05/01 10:00");

        let back: Project = serde_json::from_value(json).unwrap();
        assert!(back.recognized.is_none());
        assert_eq!(back, project);
    }

    #[test]
    fn test_compare_ties_broken_by_id_in_same_direction() {
        let paths = vec![PathBuf::from("/rec/a.wav")];
        let a = Project::new(0, &paths, "same");
        let b = Project::new(1, &paths, "same");

        assert_eq!(compare_projects(&a, &b, SortKey::Title, SortOrder::Asc), Ordering::Less);
        assert_eq!(compare_projects(&a, &b, SortKey::Title, SortOrder::Desc), Ordering::Greater);
    }

    #[test]
    fn test_unrecognized_sorts_first_ascending() {
        let paths = vec![PathBuf::from("/rec/a.wav")];
        let mut a = Project::new(0, &paths, "t");
        let b = Project::new(1, &paths, "t");
        a.recognized = Some("2024/01/01 00:00".into());
        assert_eq!(compare_projects(&a, &b, SortKey::Recognized, SortOrder::Asc), Ordering::Greater);
    }
}
