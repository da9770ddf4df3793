//! External process plumbing shared by the link source and the probers.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from running external tools.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with status {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {millis}ms")]
    Timeout { program: String, millis: u64 },

    #[error("{prober} prober produced no result within {millis}ms")]
    NoResult { prober: String, millis: u64 },

    #[error("{prober} prober exited without a result")]
    Vanished { prober: String },

    #[error("failed to start {prober} reader thread: {source}")]
    Thread {
        prober: String,
        #[source]
        source: io::Error,
    },
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    fn spawn_error(&self, source: io::Error) -> ProbeError {
        ProbeError::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Run to completion and return stdout.
    ///
    /// The child is killed if it has not exited within `timeout`.
    pub fn output(&self, timeout: Duration) -> Result<String, ProbeError> {
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = drain_in_background(child.stdout.take());
        let stderr = drain_in_background(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait().map_err(|e| self.spawn_error(e))? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProbeError::Timeout {
                        program: self.program.clone(),
                        millis: timeout.as_millis() as u64,
                    });
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let stdout = stdout.recv().unwrap_or_default();
        if !status.success() {
            return Err(ProbeError::Command {
                program: self.program.clone(),
                status: status.to_string(),
                stderr: stderr.recv().unwrap_or_default().trim().to_string(),
            });
        }
        Ok(stdout)
    }

    /// Start the program with stdout piped for line-by-line reading.
    pub fn spawn_streaming(&self) -> Result<(Child, Box<dyn BufRead + Send>), ProbeError> {
        let mut child = self
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        match child.stdout.take() {
            Some(stdout) => Ok((child, Box::new(BufReader::new(stdout)))),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(self.spawn_error(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "stdout was not captured",
                )))
            }
        }
    }
}

fn drain_in_background<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (tx, rx) = mpsc::sync_channel(1);
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            let _ = tx.send(buf);
        });
    }
    rx
}

/// Handle on a running prober.
///
/// The reader thread is never joined. Its terminal result arrives over a
/// one-shot channel; the child process is killed and reaped on `terminate`
/// or drop.
pub struct ProberHandle<R> {
    name: String,
    child: Option<Child>,
    result_rx: Receiver<R>,
}

impl<R> ProberHandle<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait (bounded) for the prober's terminal result.
    pub fn wait_result(&self, timeout: Duration) -> Result<R, ProbeError> {
        self.result_rx
            .recv_timeout(timeout)
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => ProbeError::NoResult {
                    prober: self.name.clone(),
                    millis: timeout.as_millis() as u64,
                },
                RecvTimeoutError::Disconnected => ProbeError::Vanished {
                    prober: self.name.clone(),
                },
            })
    }

    /// Kill and reap the child process if it is still running.
    pub fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

impl<R> Drop for ProberHandle<R> {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Start a reader thread that pumps `reader` into a bounded channel.
///
/// `pump` pushes observations and returns the terminal result; the
/// observation sender is dropped when it returns so the consumer sees a
/// disconnect once the prober is done.
pub fn spawn_prober<T, R, P>(
    name: &str,
    child: Option<Child>,
    reader: Box<dyn BufRead + Send>,
    capacity: usize,
    pump: P,
) -> Result<(ProberHandle<R>, Receiver<T>), ProbeError>
where
    T: Send + 'static,
    R: Send + 'static,
    P: FnOnce(Box<dyn BufRead + Send>, &SyncSender<T>) -> R + Send + 'static,
{
    let (obs_tx, obs_rx) = mpsc::sync_channel(capacity);
    let (result_tx, result_rx) = mpsc::sync_channel(1);

    let spawned = thread::Builder::new()
        .name(format!("wlq-{}", name))
        .spawn(move || {
            let result = pump(reader, &obs_tx);
            drop(obs_tx);
            let _ = result_tx.send(result);
        });

    let mut handle = ProberHandle {
        name: name.to_string(),
        child,
        result_rx,
    };

    if let Err(source) = spawned {
        handle.terminate();
        return Err(ProbeError::Thread {
            prober: name.to_string(),
            source,
        });
    }

    Ok((handle, obs_rx))
}
