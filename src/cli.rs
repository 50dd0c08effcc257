use crate::project::{SortKey, SortOrder};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "disnote")]
#[command(about = "DisNOTE 音声認識ジョブ管理ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// メディアファイルをプロジェクトとして登録
    Add {
        /// ファイル（フォルダは中のメディアファイルに展開）
        paths: Vec<PathBuf>,

        /// フォルダを指定して登録
        #[arg(short, long, conflicts_with = "paths")]
        dir: Option<PathBuf>,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,
    },

    /// プロジェクト一覧
    List {
        /// 並び替えキー
        #[arg(short, long, value_enum, default_value = "id")]
        sort: SortKey,

        /// 並び順
        #[arg(short, long, value_enum, default_value = "asc")]
        order: SortOrder,

        /// JSONで出力
        #[arg(long)]
        json: bool,
    },

    /// プロジェクトの詳細をJSONで表示
    Show {
        #[arg(required = true)]
        id: usize,
    },

    /// 音声認識を実行
    Recognize {
        #[arg(required = true)]
        id: usize,

        /// wit.ai のトークン（none で無効）
        #[arg(long)]
        witai: Option<String>,

        /// Whisper のモデル名（none で無効）
        #[arg(long)]
        whisper: Option<String>,

        /// イベントを JSON Lines で標準出力へ
        #[arg(long)]
        json: bool,
    },

    /// プロジェクトを一覧から外す
    Disable {
        #[arg(required = true)]
        id: usize,

        /// 確認しない
        #[arg(short, long)]
        yes: bool,
    },

    /// プロジェクトのフォルダを開く
    Open {
        #[arg(required = true)]
        id: usize,
    },

    /// 設定を表示/編集
    Config {
        /// 設定を表示
        #[arg(long)]
        show: bool,

        /// エンジンのコマンドライン（プログラムと先頭の引数）
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        set_engine: Option<Vec<String>>,

        /// エンジン出力の文字コード
        #[arg(long)]
        set_encoding: Option<String>,

        /// wit.ai のトークン
        #[arg(long)]
        set_witai_token: Option<String>,

        /// Whisper のモデル名
        #[arg(long)]
        set_whisper_model: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_recognize() {
        let cli = Cli::parse_from(["disnote", "recognize", "3", "--whisper", "small", "--json"]);
        match cli.command {
            Commands::Recognize { id, witai, whisper, json } => {
                assert_eq!(id, 3);
                assert_eq!(witai, None);
                assert_eq!(whisper.as_deref(), Some("small"));
                assert!(json);
            }
            _ => panic!("recognize expected"),
        }
    }

    #[test]
    fn test_parse_list_sort() {
        let cli = Cli::parse_from(["disnote", "list", "--sort", "recognized", "--order", "desc"]);
        match cli.command {
            Commands::List { sort, order, json } => {
                assert_eq!(sort, SortKey::Recognized);
                assert_eq!(order, SortOrder::Desc);
                assert!(!json);
            }
            _ => panic!("list expected"),
        }
    }

    #[test]
    fn test_parse_set_engine() {
        let cli = Cli::parse_from(["disnote", "config", "--set-engine", "python", "all.py"]);
        match cli.command {
            Commands::Config { set_engine, .. } => {
                assert_eq!(set_engine, Some(vec!["python".to_string(), "all.py".to_string()]));
            }
            _ => panic!("config expected"),
        }
    }
}
