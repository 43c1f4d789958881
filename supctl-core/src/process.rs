use std::process::Stdio;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::registry::ProcessSpec;

/// Owned handle to one spawned child. The monitor task that spawned the
/// child holds this exclusively; control operations reach the process by
/// pid through [`signal_pid`].
#[derive(Debug)]
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl ProcessHandle {
    pub fn new(name: impl Into<String>, mut child: Child) -> crate::Result<Self> {
        let pid = child
            .id()
            .ok_or_else(|| crate::Error::SpawnFailed("child exited before pid was read".into()))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        Ok(Self {
            pid,
            name: name.into(),
            child,
            stdout,
            stderr,
        })
    }

    /// Suspend until the child exits. Only the owning monitor task calls
    /// this, never the control surface.
    pub async fn wait(&mut self) -> crate::Result<ExitStatus> {
        let status = self.child.wait().await?;
        Ok(ExitStatus::from_std(status))
    }

    pub async fn kill(&mut self) -> crate::Result<()> {
        self.child.kill().await?;
        Ok(())
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
    Reload,
}

impl Signal {
    #[cfg(unix)]
    fn to_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as NixSignal;
        match self {
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
            Signal::Reload => NixSignal::SIGHUP,
        }
    }
}

/// Send a signal to a process by pid without blocking. A dead pid is not an
/// error from the caller's point of view (the exit is observed through the
/// monitor's `wait`), so ESRCH is swallowed.
pub fn signal_pid(pid: u32, signal: Signal) -> crate::Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal;
        use nix::unistd::Pid;
        match signal::kill(Pid::from_raw(pid as i32), signal.to_nix()) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, signal);
        Err(crate::Error::Other(anyhow::anyhow!(
            "signals are only supported on unix"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitStatus {
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }

    pub fn new(code: Option<i32>, signal: Option<i32>) -> Self {
        Self { code, signal }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

/// Builds and spawns the child for one spec: piped stdout/stderr, clean
/// env plus spec overrides, spec working directory.
pub struct ProcessBuilder {
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<std::path::PathBuf>,
}

impl ProcessBuilder {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn from_spec(spec: &ProcessSpec) -> Self {
        let mut builder = Self::new(spec.command.as_str())
            .args(&spec.args)
            .current_dir(&spec.cwd);
        for (key, value) in &spec.env {
            builder = builder.env(key, value);
        }
        builder
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    pub fn env<K, V>(mut self, key: K, value: V) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.env
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<std::path::Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn spawn(self) -> crate::Result<Child> {
        // A command with embedded whitespace and no explicit args is treated
        // as a shell-style string, e.g. "./server --port 8080".
        let (program, mut args) = if self.command.contains(' ') && self.args.is_empty() {
            match shell_words::split(&self.command) {
                Ok(parts) if !parts.is_empty() => {
                    let mut parts = parts.into_iter();
                    let program = parts.next().unwrap_or_else(|| self.command.clone());
                    (program, parts.collect())
                }
                _ => (self.command.clone(), Vec::new()),
            }
        } else {
            (self.command.clone(), Vec::new())
        };
        args.extend(self.args);

        tracing::debug!(command = %program, ?args, "spawning child");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let Some(cwd) = self.cwd {
            cmd.current_dir(cwd);
        }
        for (key, value) in self.env {
            cmd.env(key, value);
        }

        cmd.spawn()
            .map_err(|e| crate::Error::SpawnFailed(format!("{program}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_status_success_only_on_zero() {
        assert!(ExitStatus::new(Some(0), None).success());
        assert!(!ExitStatus::new(Some(1), None).success());
        assert!(!ExitStatus::new(None, Some(9)).success());
    }

    #[test]
    fn exit_status_display() {
        assert_eq!(ExitStatus::new(Some(3), None).to_string(), "exit code 3");
        assert_eq!(ExitStatus::new(None, Some(15)).to_string(), "signal 15");
    }

    #[cfg(unix)]
    #[test]
    fn signal_to_dead_pid_is_not_an_error() {
        // Pid in a range no live process should occupy on a test box.
        assert!(signal_pid(i32::MAX as u32, Signal::Terminate).is_ok());
    }
}
