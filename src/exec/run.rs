use std::io::BufRead;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

use super::Executor;
use super::types::{ExecCommand, ExecResult, OutputLine};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// How long output readers may keep draining after a timeout kill.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs commands as local child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    /// Spawn the process and return a channel that streams its output.
    ///
    /// The caller receives [`OutputLine::Stdout`]/[`OutputLine::Stderr`] as
    /// they arrive, followed by exactly one [`OutputLine::Done`] carrying the
    /// final result.
    fn spawn(&self, cmd: ExecCommand) -> Result<Receiver<OutputLine>> {
        let spawn_err = |source| Error::Spawn {
            program: cmd.program.clone(),
            source,
        };

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout reaches everything it forks.
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(spawn_err)?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_err(std::io::Error::other("child pipes were not captured")));
        };

        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            supervise(child, stdout, stderr, tx, cmd);
        });

        Ok(rx)
    }
}

fn supervise(
    mut child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    tx: Sender<OutputLine>,
    cmd: ExecCommand,
) {
    let out_buf = Arc::new(Mutex::new(String::new()));
    let err_buf = Arc::new(Mutex::new(String::new()));

    // --- reader threads ---------------------------------------------------
    let stdout_handle = pump(stdout, out_buf.clone(), tx.clone(), OutputLine::Stdout);
    let stderr_handle = pump(stderr, err_buf.clone(), tx.clone(), OutputLine::Stderr);

    // --- poll loop ---------------------------------------------------------
    let start = Instant::now();
    let mut timed_out = false;

    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {}
            Err(_) => break None,
        }

        if start.elapsed() > cmd.timeout {
            timed_out = true;
            kill_tree(&mut child);
            let _ = child.wait();
            break None;
        }

        std::thread::sleep(POLL_INTERVAL);
    };

    // --- finalize ----------------------------------------------------------
    // A process that escaped the group can hold the pipes open; after a
    // timeout the readers are abandoned once the grace period runs out.
    if timed_out {
        let deadline = Instant::now() + DRAIN_GRACE;
        while !(stdout_handle.is_finished() && stderr_handle.is_finished())
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(20));
        }
        if stdout_handle.is_finished() {
            let _ = stdout_handle.join();
        }
        if stderr_handle.is_finished() {
            let _ = stderr_handle.join();
        }
    } else {
        let _ = stdout_handle.join();
        let _ = stderr_handle.join();
    }

    let exit_code = exit_status.and_then(|s| s.code());
    let stdout = out_buf.lock().map(|b| b.clone()).unwrap_or_default();
    let stderr = err_buf.lock().map(|b| b.clone()).unwrap_or_default();

    if timed_out {
        tracing::warn!(
            command = %cmd.display(),
            timeout_secs = cmd.timeout.as_secs(),
            "command killed after timeout"
        );
    }

    if let Some(path) = &cmd.log_path {
        let _ = std::fs::write(path, format!("{stdout}{stderr}"));
    }

    let _ = tx.send(OutputLine::Done(ExecResult {
        success: exit_code == Some(0),
        exit_code,
        stdout,
        stderr,
        timed_out,
    }));
}

/// Kill the child's whole process group, falling back to the child alone.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal; the group id is the child's
            // pid, set via process_group(0) at spawn.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                return;
            }
        }
    }
    let _ = child.kill();
}

fn pump<R>(
    source: R,
    buf: Arc<Mutex<String>>,
    tx: Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) -> std::thread::JoinHandle<()>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::spawn(move || {
        let reader = std::io::BufReader::new(source);
        for line in reader.lines() {
            let Ok(l) = line else { break };
            if let Ok(mut b) = buf.lock() {
                b.push_str(&l);
                b.push('\n');
            }
            // Receiver may be dropped; ignore send errors.
            let _ = tx.send(wrap(l));
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::{Runner, run};

    fn sh(script: &str, timeout: Duration) -> ExecCommand {
        ExecCommand::new("sh", vec!["-c".into(), script.into()], timeout)
    }

    #[test]
    fn captures_both_streams_separately() {
        let result = run(
            &ProcessExecutor,
            sh("echo out; echo err 1>&2", Duration::from_secs(10)),
        )
        .unwrap();
        assert!(result.success);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
    }

    #[test]
    fn non_zero_exit_is_reported_not_swallowed() {
        let result = run(&ProcessExecutor, sh("exit 3", Duration::from_secs(10))).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.timed_out);
    }

    #[test]
    fn kills_process_after_timeout() {
        let started = Instant::now();
        let result = run(&ProcessExecutor, sh("sleep 30", Duration::from_millis(300))).unwrap();
        assert!(result.timed_out);
        assert!(!result.success);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn timeout_also_stops_forked_children() {
        let started = Instant::now();
        let result = run(
            &ProcessExecutor,
            sh("sleep 30; true", Duration::from_millis(300)),
        )
        .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.exit_code, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cmd = ExecCommand::new(
            "definitely-not-a-real-binary-shipcheck",
            vec![],
            Duration::from_secs(1),
        );
        let err = ProcessExecutor.spawn(cmd).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[test]
    fn runner_forwards_lines_to_sink() {
        let seen = Mutex::new(Vec::new());
        let runner = Runner::new(&ProcessExecutor).with_output(|line| {
            seen.lock().unwrap().push(line.to_string());
        });
        runner
            .run(sh("echo one; echo two", Duration::from_secs(10)))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[test]
    fn log_path_receives_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd.log");
        let mut cmd = sh("echo logged", Duration::from_secs(10));
        cmd.log_path = Some(path.clone());
        run(&ProcessExecutor, cmd).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "logged\n");
    }
}
