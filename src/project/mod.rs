//! プロジェクト管理
//!
//! ドロップされたメディアファイルの集合を1つのプロジェクトとして保持する。
//! 同じファイル集合（順序不問）は同じプロジェクトとして扱い、削除は無効化のみ。

mod store;
mod types;

pub use store::{DropOutcome, ProjectStore};
pub use types::{
    compare_projects, local_now, Project, ProjectFile, SortKey, SortOrder, NOT_RECOGNIZED,
    TIME_FORMAT,
};
