//! DisNOTE Common Library
//!
//! エンジン出力の解釈に必要な、I/Oを持たない部品群:
//! - ステージ語彙とエンジンスレッド
//! - 進捗レコードのパース
//! - バイトストリーム → 行の変換（StreamDecoder）
//! - 単調な進捗集計（ProgressAggregator）

pub mod stage;
pub mod record;
pub mod decoder;
pub mod aggregator;
pub mod event;
pub mod error;

pub use stage::{EngineThread, Stage};
pub use record::{extract_body, parse_record, ProgressRecord, PROGRESS_MARKER};
pub use decoder::{encoding_for_label, StreamDecoder};
pub use aggregator::{percentage, ProgressAggregator};
pub use event::{DisplayEvent, EngineSet, RecFile, StageTable};
pub use error::{Error, Result};
