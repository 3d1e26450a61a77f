//! Subprocess command channel.
//! Runs ipmitool / ssh invocations with separate bounds on process exit and
//! output collection, both racing the shared shutdown token.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::ChannelError;

/// A single external command: program, arguments, extra environment and
/// an optional secret that must never reach the logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    secret: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            secret: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Mark a value (password) to be masked in `display()`.
    pub fn redact(mut self, secret: &str) -> Self {
        if !secret.is_empty() {
            self.secret = Some(secret.to_string());
        }
        self
    }

    /// Loggable command line with the secret replaced by `{password}`.
    pub fn display(&self) -> String {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        match &self.secret {
            Some(secret) => line.replace(secret.as_str(), "{password}"),
            None => line,
        }
    }
}

/// Bounds applied to every external call.
#[derive(Debug, Clone, Copy)]
pub struct CommandTimeouts {
    /// Maximum wait for the process to exit.
    pub completion: Duration,
    /// Maximum wait for captured output once the process has exited.
    pub output_read: Duration,
}

impl Default for CommandTimeouts {
    fn default() -> Self {
        Self {
            completion: Duration::from_secs(30),
            output_read: Duration::from_secs(5),
        }
    }
}

#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Run `spec` and return its stdout. Non-zero exit is an error.
    async fn execute(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<String, ChannelError>;
}

/// Local process execution via `tokio::process`.
pub struct ProcessChannel {
    timeouts: CommandTimeouts,
}

impl ProcessChannel {
    pub fn new(timeouts: CommandTimeouts) -> Self {
        Self { timeouts }
    }
}

type PipeTask = JoinHandle<std::io::Result<Vec<u8>>>;

/// Background readers draining stdout/stderr so a chatty child can never
/// block on a full pipe while we wait for it. Aborted when dropped.
struct OutputCollector {
    stdout: PipeTask,
    stderr: PipeTask,
}

impl OutputCollector {
    fn spawn<O, E>(stdout: O, stderr: E) -> Self
    where
        O: tokio::io::AsyncRead + Unpin + Send + 'static,
        E: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        Self {
            stdout: tokio::spawn(drain(stdout)),
            stderr: tokio::spawn(drain(stderr)),
        }
    }

    async fn finish(&mut self, program: &str) -> Result<(Vec<u8>, Vec<u8>), ChannelError> {
        let stdout = join_pipe(&mut self.stdout, program).await?;
        let stderr = join_pipe(&mut self.stderr, program).await?;
        Ok((stdout, stderr))
    }
}

impl Drop for OutputCollector {
    fn drop(&mut self) {
        self.stdout.abort();
        self.stderr.abort();
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(mut pipe: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf).await?;
    Ok(buf)
}

async fn join_pipe(task: &mut PipeTask, program: &str) -> Result<Vec<u8>, ChannelError> {
    match task.await {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(source)) => Err(ChannelError::Io {
            program: program.to_string(),
            source,
        }),
        Err(join) => Err(ChannelError::Io {
            program: program.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, join.to_string()),
        }),
    }
}

#[async_trait]
impl CommandChannel for ProcessChannel {
    async fn execute(&self, spec: &CommandSpec, cancel: &CancellationToken) -> Result<String, ChannelError> {
        let program = spec.program.clone();
        debug!("Executing: {}", spec.display());

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ChannelError::Spawn {
            program: program.clone(),
            source,
        })?;

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(out), Some(err)) => (out, err),
            _ => {
                return Err(ChannelError::Io {
                    program,
                    source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child pipes unavailable"),
                })
            }
        };
        let mut collector = OutputCollector::spawn(stdout, stderr);

        // Stage 1: process exit. Dropping `child` on any early return kills it.
        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
            waited = tokio::time::timeout(self.timeouts.completion, child.wait()) => match waited {
                Ok(Ok(status)) => status,
                Ok(Err(source)) => return Err(ChannelError::Io { program, source }),
                Err(_) => {
                    return Err(ChannelError::Timeout {
                        program,
                        stage: "waiting for exit",
                        after: self.timeouts.completion,
                    })
                }
            },
        };
        trace!("{} exited with {}", program, status);

        // Stage 2: captured output.
        let (stdout, stderr) = tokio::select! {
            _ = cancel.cancelled() => return Err(ChannelError::Cancelled),
            read = tokio::time::timeout(self.timeouts.output_read, collector.finish(&spec.program)) => match read {
                Ok(output) => output?,
                Err(_) => {
                    return Err(ChannelError::Timeout {
                        program,
                        stage: "reading output",
                        after: self.timeouts.output_read,
                    })
                }
            },
        };

        if !status.success() {
            return Err(ChannelError::Exit {
                program,
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).to_string())
    }
}
