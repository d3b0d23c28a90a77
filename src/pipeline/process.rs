//! Uniform invocation of external tools.
//!
//! Every stage of the pipeline is "run a program with an argument list, look
//! at its exit status, and maybe keep what it wrote to stdout". [`ToolCommand`]
//! is that contract in one place, so the stage adapters stay a few lines each
//! and a failed tool always reports the same way.
//!
//! Output streams are copied in [`CHUNK_SIZE`] pieces; a 150 DPI raster of a
//! large page never sits in memory as a whole.
//!
//! Children are spawned with `kill_on_drop(true)`: dropping an in-flight
//! future (fail-fast cancellation) takes its process down with it.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::debug;

/// Buffer size for every streamed copy in the crate.
pub const CHUNK_SIZE: usize = 4096;

/// Maximum number of stderr bytes kept for diagnostics.
const STDERR_TAIL: usize = 2048;

/// Why an external tool invocation failed.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started (not installed, not executable).
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program ran and returned a non-success status.
    #[error("'{program}' exited with {status}{}", stderr_suffix(.stderr))]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Reading the program's output or writing the artifact failed.
    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program reported success but its artifact is not on disk.
    #[error("'{program}' exited successfully but did not write '{}'", .path.display())]
    MissingOutput { program: String, path: PathBuf },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// A program plus its argument list.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Program name as shown in diagnostics.
    pub fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    /// Arguments in invocation order.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    /// Run to completion, discarding stdout. Artifacts are written by the
    /// tool itself.
    pub async fn run(&self) -> Result<(), ToolError> {
        debug!("exec: {}", self);
        let output = self
            .command()
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.launch_error(e))?;

        if !output.status.success() {
            return Err(ToolError::Exit {
                program: self.program_name(),
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }

    /// Run and stream stdout into `dst` in [`CHUNK_SIZE`] pieces.
    ///
    /// Returns the number of bytes written. `dst` is created or truncated.
    pub async fn run_to_file(&self, dst: &Path) -> Result<u64, ToolError> {
        debug!("exec: {} > {}", self, dst.display());
        let mut child = self
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.launch_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.io_error(io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.io_error(io::Error::other("stderr was not captured")))?;

        let mut file = tokio::fs::File::create(dst)
            .await
            .map_err(|e| self.io_error(e))?;

        // stderr is drained alongside stdout so a chatty tool cannot block
        // on a full pipe while we wait on the other stream.
        let (copied, stderr) = tokio::join!(copy_chunked(stdout, &mut file), read_stderr(stderr));
        let status = child.wait().await.map_err(|e| self.io_error(e))?;
        let copied = copied.map_err(|e| self.io_error(e))?;

        if !status.success() {
            return Err(ToolError::Exit {
                program: self.program_name(),
                status,
                stderr,
            });
        }
        Ok(copied)
    }

    /// Run and collect stdout as lines, lossily decoded as UTF-8.
    pub async fn run_capture_lines(&self) -> Result<Vec<String>, ToolError> {
        debug!("exec: {}", self);
        let mut child = self
            .command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.launch_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.io_error(io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| self.io_error(io::Error::other("stderr was not captured")))?;

        let (lines, stderr) = tokio::join!(read_lines(stdout), read_stderr(stderr));
        let status = child.wait().await.map_err(|e| self.io_error(e))?;
        let lines = lines.map_err(|e| self.io_error(e))?;

        if !status.success() {
            return Err(ToolError::Exit {
                program: self.program_name(),
                status,
                stderr,
            });
        }
        Ok(lines)
    }

    fn launch_error(&self, source: io::Error) -> ToolError {
        ToolError::Launch {
            program: self.program_name(),
            source,
        }
    }

    fn io_error(&self, source: io::Error) -> ToolError {
        ToolError::Io {
            program: self.program_name(),
            source,
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Copy `reader` into `writer` through a fixed [`CHUNK_SIZE`] buffer.
pub async fn copy_chunked<R, W>(mut reader: R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}

async fn read_lines<R: AsyncRead + Unpin>(reader: R) -> io::Result<Vec<String>> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        lines.push(line.trim_end_matches(['\r', '\n']).to_string());
    }
    Ok(lines)
}

async fn read_stderr(mut stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(e) = stderr.read_to_end(&mut buf).await {
        debug!("could not read tool stderr: {}", e);
    }
    stderr_tail(&buf)
}

fn stderr_tail(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
