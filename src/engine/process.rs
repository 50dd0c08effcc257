//! エンジンプロセスのハンドル

use super::EngineCommand;
use crate::error::{DisnoteError, Result};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// 起動中のエンジンプロセス
pub struct EngineProcess {
    child: Child,
    pid: Option<u32>,
}

impl EngineProcess {
    /// 標準出力・標準エラーをパイプにして起動
    pub fn spawn(command: &EngineCommand) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);

        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // ハンドルを落としたらエンジンも止める
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DisnoteError::EngineLaunch(format!("エンジンが見つかりません: {}", command.program))
            } else {
                DisnoteError::EngineLaunch(format!("{}: {}", command.program, e))
            }
        })?;

        let pid = child.id();
        tracing::info!("エンジン起動: {} (pid {:?})", command.program, pid);
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// 標準出力を取り出す（1回のみ）
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// 標準エラーを取り出す（1回のみ）
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// 終了を要求する（unix は SIGTERM）
    #[cfg(unix)]
    pub fn terminate(&mut self) -> std::io::Result<()> {
        // 終了済みなら id() は None
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: 自分が起動し、まだ回収していない子プロセスのpidに送る
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(&mut self) -> std::io::Result<()> {
        self.kill()
    }

    /// 強制終了
    pub fn kill(&mut self) -> std::io::Result<()> {
        if self.child.id().is_none() {
            return Ok(());
        }
        self.child.start_kill()
    }

    /// 終了を待つ
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }
}
