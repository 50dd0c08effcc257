use crate::error::{DisnoteError, Result};
use std::path::Path;
use std::process::Command;

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(target_os = "windows")]
const OPENER: &str = "explorer";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const OPENER: &str = "xdg-open";

/// フォルダをファイルマネージャで開く（終了は待たない）
pub fn open_folder(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(DisnoteError::FolderNotFound(dir.display().to_string()));
    }

    Command::new(OPENER).arg(dir).spawn().map_err(|e| {
        DisnoteError::Io(std::io::Error::new(e.kind(), format!("{} を起動できません: {}", OPENER, e)))
    })?;
    tracing::debug!("フォルダを開く: {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_folder() {
        let result = open_folder(Path::new("/nonexistent/folder"));
        assert!(matches!(result, Err(DisnoteError::FolderNotFound(_))));
    }
}
