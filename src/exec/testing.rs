//! Scripted executor for exercising stages without a container engine.
//!
//! Rules match on substrings of the space-joined command line. The first rule
//! whose needles all appear wins; unmatched commands succeed with empty
//! output so tests only script the calls they care about.

use std::sync::Mutex;
use std::time::Duration;
use std::sync::mpsc::{self, Receiver};

use crate::error::Result;

use super::Executor;
use super::types::{ExecCommand, ExecResult, OutputLine};

struct Rule {
    needles: Vec<String>,
    response: ExecResult,
    remaining: Option<usize>,
}

/// An [`Executor`] that answers from a list of scripted rules and records
/// every command it was asked to run.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing all of `needles` with `response`.
    pub fn on(self, needles: &[&str], response: ExecResult) -> Self {
        self.push(needles, response, None)
    }

    /// Like [`ScriptedExecutor::on`], but only for the next `times` matches.
    pub fn on_times(self, needles: &[&str], times: usize, response: ExecResult) -> Self {
        self.push(needles, response, Some(times))
    }

    fn push(self, needles: &[&str], response: ExecResult, remaining: Option<usize>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                needles: needles.iter().map(|n| n.to_string()).collect(),
                response,
                remaining,
            });
        }
        self
    }

    /// Space-joined command lines in the order they were run.
    pub fn calls(&self) -> Vec<String> {
        self.calls_with_timeouts()
            .into_iter()
            .map(|(line, _)| line)
            .collect()
    }

    /// Recorded command lines paired with the timeout each was given.
    pub fn calls_with_timeouts(&self) -> Vec<(String, Duration)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    fn respond(&self, line: &str) -> ExecResult {
        let Ok(mut rules) = self.rules.lock() else {
            return ExecResult::ok("");
        };
        for rule in rules.iter_mut() {
            if rule.remaining == Some(0) || !rule.needles.iter().all(|n| line.contains(n)) {
                continue;
            }
            if let Some(left) = rule.remaining.as_mut() {
                *left -= 1;
            }
            return rule.response.clone();
        }
        ExecResult::ok("")
    }
}

impl Executor for ScriptedExecutor {
    fn spawn(&self, cmd: ExecCommand) -> Result<Receiver<OutputLine>> {
        // Plain space-joined so needles never have to account for quoting.
        let mut words = vec![cmd.program.as_str()];
        words.extend(cmd.args.iter().map(String::as_str));
        let line = words.join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((line.clone(), cmd.timeout));
        }

        let result = self.respond(&line);
        let (tx, rx) = mpsc::channel();
        for l in result.stdout.lines() {
            let _ = tx.send(OutputLine::Stdout(l.to_string()));
        }
        for l in result.stderr.lines() {
            let _ = tx.send(OutputLine::Stderr(l.to_string()));
        }
        let _ = tx.send(OutputLine::Done(result));
        Ok(rx)
    }
}
