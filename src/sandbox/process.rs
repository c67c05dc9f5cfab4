use std::io;
use std::process::ExitStatus;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// An owned child process that leads its own process group
///
/// The group is killed as soon as the leader is reaped, by
/// [`ProcessHandle::terminate`], or when the handle is dropped, so neither
/// the child nor anything it spawned can outlive the owner.
///
/// The group is only signalled while its id cannot have been recycled: before
/// the leader is reaped, and once immediately after. Any later signal could
/// reach an unrelated group that reused the id.
pub struct ProcessHandle {
    child: Child,
    pgid: Option<libc::pid_t>,
    status: Option<ExitStatus>,
}

impl ProcessHandle {
    /// Spawns `command` as the leader of a new process group
    pub fn spawn(command: &mut Command) -> io::Result<Self> {
        command.process_group(0).kill_on_drop(true);
        let child = command.spawn()?;
        let pgid = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok());

        Ok(Self {
            child,
            pgid,
            status: None,
        })
    }

    pub fn id(&self) -> Option<libc::pid_t> {
        self.pgid
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Waits for the group leader to exit, then kills whatever it left behind
    ///
    /// Descendants still holding the leader's pipes would otherwise keep them
    /// open after the leader is gone.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.status = Some(status);
        self.kill_group();
        Ok(status)
    }

    /// Kills every process left in the group and reaps the leader
    ///
    /// A no-op once the leader has been reaped by [`ProcessHandle::wait`],
    /// which already killed the group.
    pub async fn terminate(&mut self) -> io::Result<()> {
        if self.status.is_none() {
            self.kill_group();
            // The leader may have left the group; signal it directly as well
            let _ = self.child.start_kill();
            let status = self.child.wait().await?;
            self.status = Some(status);
        }
        Ok(())
    }

    fn kill_group(&self) {
        let Some(pgid) = self.pgid else {
            return;
        };

        // SAFETY: killpg takes plain integers and has no memory-safety requirements
        if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                log::warn!("Failed to kill process group {pgid}: {err}");
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.status.is_none() {
            self.kill_group();
        }
    }
}

/// Reads a pipe until end of file
pub(super) async fn read_to_end<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Reads a pipe until end of file, giving up once it carries more than `limit` bytes
///
/// Returns `None` on overflow; the pipe is then left unread.
pub(super) async fn read_limited<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    limit: u64,
) -> io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        (&mut pipe)
            .take(limit.saturating_add(1))
            .read_to_end(&mut buf)
            .await?;
    }
    if buf.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(buf))
}

/// Keeps the first `limit` bytes of a pipe and discards the rest
///
/// The pipe is always drained so that the writer never blocks on it.
pub(super) async fn read_capped<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    limit: u64,
) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        (&mut pipe).take(limit).read_to_end(&mut buf).await?;
        tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    }
    Ok(buf)
}
