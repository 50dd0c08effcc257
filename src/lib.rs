//! DisNOTE 音声認識ジョブ管理
//!
//! 外部の認識エンジンを子プロセスとして起動し、標準出力の進捗レコードを
//! 表示イベントに変換する。プロジェクト（メディアファイルの集合）は
//! JSONファイルに保存する。

pub mod cli;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod job;
pub mod opener;
pub mod persist;
pub mod project;
pub mod scanner;
