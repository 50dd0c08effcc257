use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisnoteError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("プロジェクトが見つかりません: {0}")]
    ProjectNotFound(usize),

    #[error("ファイルが指定されていません")]
    EmptyFileList,

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("認識ジョブが実行中です（プロジェクト {0}）")]
    AlreadyRunning(usize),

    #[error("エンジンの起動に失敗: {0}")]
    EngineLaunch(String),

    #[error("プロジェクトリストが読み込めません: {0}")]
    CorruptProjects(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] disnote_common::Error),
}

pub type Result<T> = std::result::Result<T, DisnoteError>;
