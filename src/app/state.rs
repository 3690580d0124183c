use std::sync::mpsc::{Receiver, TryRecvError};

use shipcheck::pipeline::{DeployReport, PipelineEvent, ProbeReport, Stage};

/// Which panel currently has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Stages,
    Probes,
    Log,
    Report,
}

impl Panel {
    pub const ALL: [Panel; 4] = [Panel::Stages, Panel::Probes, Panel::Log, Panel::Report];

    pub fn index(self) -> usize {
        match self {
            Panel::Stages => 0,
            Panel::Probes => 1,
            Panel::Log => 2,
            Panel::Report => 3,
        }
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    pub fn next(self) -> Self {
        let i = (self.index() + 1) % Self::ALL.len();
        Self::ALL[i]
    }

    pub fn prev(self) -> Self {
        let i = (self.index() + Self::ALL.len() - 1) % Self::ALL.len();
        Self::ALL[i]
    }
}

/// Screen mode for the main content panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    Normal,
    Half,
    Full,
}

impl ScreenMode {
    pub fn cycle_next(self) -> Self {
        match self {
            Self::Normal => Self::Half,
            Self::Half => Self::Full,
            Self::Full => Self::Normal,
        }
    }

    pub fn cycle_prev(self) -> Self {
        match self {
            Self::Normal => Self::Full,
            Self::Full => Self::Half,
            Self::Half => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Running,
    Pass,
    Fail,
}

/// One row of the stages panel, with the output captured while it ran.
#[derive(Debug, Clone)]
pub struct StageEntry {
    pub stage: Stage,
    pub status: StageStatus,
    pub log: String,
}

/// Top-level application state.
pub struct App {
    pub running: bool,
    pub focused_panel: Panel,
    pub screen_mode: ScreenMode,
    pub show_help: bool,

    pub stages: Vec<StageEntry>,
    pub probes: Vec<ProbeReport>,

    /// Index of selected item in the stages list.
    pub stage_index: usize,
    /// Index of selected item in the probes list.
    pub probe_index: usize,
    /// Scroll offset for the log panel.
    pub log_scroll: u16,
    /// Keep the log panel on the stage that is currently running.
    pub follow: bool,
    /// Scroll offset for the report panel.
    pub report_scroll: u16,

    pub run_id: Option<String>,
    pub report: Option<DeployReport>,
    pub aborted: Option<String>,
    /// Whether the pipeline is still running.
    pub deploying: bool,
    pub pipeline_rx: Option<Receiver<PipelineEvent>>,
}

impl App {
    pub fn new(rx: Receiver<PipelineEvent>) -> Self {
        Self {
            running: true,
            focused_panel: Panel::Stages,
            screen_mode: ScreenMode::Normal,
            show_help: false,
            stages: Stage::PIPELINE
                .iter()
                .map(|&stage| StageEntry {
                    stage,
                    status: StageStatus::Pending,
                    log: String::new(),
                })
                .collect(),
            probes: Vec::new(),
            stage_index: 0,
            probe_index: 0,
            log_scroll: 0,
            follow: true,
            report_scroll: 0,
            run_id: None,
            report: None,
            aborted: None,
            deploying: true,
            pipeline_rx: Some(rx),
        }
    }

    /// Fold one pipeline event into the state.
    pub fn apply(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::StageStarted(stage) => {
                if let Some(i) = self.position(stage) {
                    self.stages[i].status = StageStatus::Running;
                    if self.follow {
                        self.stage_index = i;
                        self.log_scroll = 0;
                    }
                }
            }
            PipelineEvent::Log { stage, line } => {
                if let Some(i) = self.position(stage) {
                    let log = &mut self.stages[i].log;
                    log.push_str(&line);
                    log.push('\n');
                }
            }
            PipelineEvent::StageFinished { stage, success } => {
                if let Some(i) = self.position(stage) {
                    self.stages[i].status = if success {
                        StageStatus::Pass
                    } else {
                        StageStatus::Fail
                    };
                }
            }
            PipelineEvent::ProbeFinished(report) => self.probes.push(report),
            PipelineEvent::Completed(report) => {
                self.run_id = Some(report.run_id.clone());
                self.report = Some(report);
                self.deploying = false;
            }
            PipelineEvent::Aborted(reason) => {
                self.aborted = Some(reason);
                self.deploying = false;
            }
        }
    }

    /// Drain pending pipeline events without blocking.
    pub fn drain_events(&mut self) {
        let Some(rx) = self.pipeline_rx.take() else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.deploying {
                        self.aborted = Some("pipeline stopped without a result".into());
                        self.deploying = false;
                    }
                    break;
                }
            }
        }
        if self.deploying {
            self.pipeline_rx = Some(rx);
        }
        self.clamp_indices();
    }

    pub fn selected_stage(&self) -> Option<&StageEntry> {
        self.stages.get(self.stage_index)
    }

    pub fn selected_probe(&self) -> Option<&ProbeReport> {
        self.probes.get(self.probe_index)
    }

    /// True once the run finished and every probe passed.
    pub fn succeeded(&self) -> bool {
        self.report.as_ref().is_some_and(DeployReport::all_passed)
    }

    pub fn clamp_indices(&mut self) {
        self.stage_index = self.stage_index.min(self.stages.len().saturating_sub(1));
        self.probe_index = self.probe_index.min(self.probes.len().saturating_sub(1));
    }

    fn position(&self, stage: Stage) -> Option<usize> {
        self.stages.iter().position(|e| e.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn app() -> (App, mpsc::Sender<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        (App::new(rx), tx)
    }

    #[test]
    fn panel_cycle_wraps() {
        assert_eq!(Panel::Report.next(), Panel::Stages);
        assert_eq!(Panel::Stages.prev(), Panel::Report);
        assert_eq!(Panel::from_index(2), Some(Panel::Log));
        assert_eq!(Panel::from_index(4), None);
    }

    #[test]
    fn stage_events_update_status_and_log() {
        let (mut app, tx) = app();
        tx.send(PipelineEvent::StageStarted(Stage::ClusterReady)).unwrap();
        tx.send(PipelineEvent::Log {
            stage: Stage::ClusterReady,
            line: "network created".into(),
        })
        .unwrap();
        app.drain_events();

        assert_eq!(app.stages[1].status, StageStatus::Running);
        assert_eq!(app.stage_index, 1);
        assert_eq!(app.selected_stage().unwrap().log, "network created\n");

        tx.send(PipelineEvent::StageFinished {
            stage: Stage::ClusterReady,
            success: false,
        })
        .unwrap();
        tx.send(PipelineEvent::Aborted("boom".into())).unwrap();
        app.drain_events();

        assert_eq!(app.stages[1].status, StageStatus::Fail);
        assert!(!app.deploying);
        assert!(app.pipeline_rx.is_none());
        assert!(!app.succeeded());
    }

    #[test]
    fn dropped_channel_ends_the_run() {
        let (mut app, tx) = app();
        drop(tx);
        app.drain_events();
        assert!(!app.deploying);
        assert!(app.aborted.is_some());
    }

    #[test]
    fn follow_off_keeps_selection() {
        let (mut app, _tx) = app();
        app.follow = false;
        app.apply(PipelineEvent::StageStarted(Stage::Tested));
        assert_eq!(app.stage_index, 0);
        assert_eq!(app.stages[4].status, StageStatus::Running);
    }

    #[test]
    fn clamp_handles_empty_probe_list() {
        let (mut app, _tx) = app();
        app.probe_index = 5;
        app.stage_index = 99;
        app.clamp_indices();
        assert_eq!(app.probe_index, 0);
        assert_eq!(app.stage_index, Stage::PIPELINE.len() - 1);
    }
}
