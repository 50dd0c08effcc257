use crate::error::{DisnoteError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// エンジンが受け付ける音声・動画の拡張子（小文字で比較）
const MEDIA_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "flac", "m4a", "aac", "ogg", "opus", "wma", "mp4", "mkv", "mov", "avi", "webm",
];

fn is_media_extension(ext: &str) -> bool {
    let lower = ext.to_lowercase();
    MEDIA_EXTENSIONS.iter().any(|&e| e == lower)
}

/// フォルダ内のメディアファイルを列挙（パス順）
pub fn scan_folder(folder: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(DisnoteError::FolderNotFound(folder.display().to_string()));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map_or(false, |ext| is_media_extension(&ext.to_string_lossy())))
        .collect();

    files.sort();
    Ok(files)
}

/// ドロップされたパスを絶対パスに揃える（フォルダは中のメディアファイルに展開）
pub fn resolve_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            for file in scan_folder(input, recursive)? {
                files.push(std::fs::canonicalize(&file)?);
            }
        } else {
            files.push(std::fs::canonicalize(input)?);
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
