// Command execution: process spawning, streamed output, timeouts.

pub mod engine;
pub mod run;
pub mod testing;
pub mod types;

use std::sync::mpsc::Receiver;

pub use engine::ensure_available;
pub use run::ProcessExecutor;
pub use testing::ScriptedExecutor;
pub use types::{ExecCommand, ExecResult, OutputLine};

use crate::error::{Error, Result};

/// Something that can run an [`ExecCommand`].
///
/// Implementations must send zero or more output lines followed by exactly
/// one [`OutputLine::Done`].
pub trait Executor: Send + Sync {
    fn spawn(&self, cmd: ExecCommand) -> Result<Receiver<OutputLine>>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn spawn(&self, cmd: ExecCommand) -> Result<Receiver<OutputLine>> {
        (**self).spawn(cmd)
    }
}

impl<E: Executor + ?Sized> Executor for std::sync::Arc<E> {
    fn spawn(&self, cmd: ExecCommand) -> Result<Receiver<OutputLine>> {
        (**self).spawn(cmd)
    }
}

type LineSink<'a> = Box<dyn Fn(&str) + Send + Sync + 'a>;

/// Runs commands through an [`Executor`], forwarding each output line to an
/// optional sink before returning the final result.
pub struct Runner<'a> {
    executor: &'a dyn Executor,
    sink: Option<LineSink<'a>>,
}

impl<'a> Runner<'a> {
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self {
            executor,
            sink: None,
        }
    }

    pub fn with_output(mut self, sink: impl Fn(&str) + Send + Sync + 'a) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Run `cmd` to completion. A non-zero exit is returned in the result,
    /// not as an error; only a failure to start the process is an `Err`.
    pub fn run(&self, cmd: ExecCommand) -> Result<ExecResult> {
        let program = cmd.program.clone();
        let rendered = cmd.display();
        tracing::debug!(command = %rendered, "running");

        let rx = self.executor.spawn(cmd)?;
        for line in rx {
            match line {
                OutputLine::Stdout(s) | OutputLine::Stderr(s) => {
                    if let Some(sink) = &self.sink {
                        sink(&s);
                    }
                }
                OutputLine::Done(result) => {
                    tracing::debug!(
                        command = %rendered,
                        exit_code = ?result.exit_code,
                        timed_out = result.timed_out,
                        "finished"
                    );
                    return Ok(result);
                }
            }
        }

        Err(Error::Spawn {
            program,
            source: std::io::Error::other("output channel closed before the process finished"),
        })
    }
}

/// Run `cmd` without forwarding its output anywhere.
pub fn run(executor: &dyn Executor, cmd: ExecCommand) -> Result<ExecResult> {
    Runner::new(executor).run(cmd)
}
