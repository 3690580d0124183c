use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use uuid::Uuid;

use crate::cluster::{
    ClusterConfig, ClusterSession, Mount, PortMapping, Provisioner, ServiceBinding, ServiceHandle,
    API_PORT,
};
use crate::config::{Config, ProbeTarget};
use crate::error::{Error, Result};
use crate::exec::{Executor, ProcessExecutor, Runner};
use crate::image::{self, ImageReference};
use crate::manifest::{self, ApplySummary, ManifestSet};
use crate::probe;
use crate::rollout;

use super::report::{DeployReport, ProbeReport};
use super::types::{PipelineEvent, ProbeKind, SessionState, Stage};

/// Where the manifest directory is mounted inside the cluster server.
const MANIFEST_MOUNT: &str = "/manifests";

/// Launch a full-stack deploy on a background thread.
///
/// Returns a receiver that streams `PipelineEvent` values. The final event
/// is always either `Completed` or `Aborted`.
pub fn run_full_stack<E>(config: Config, src: PathBuf, executor: E) -> Receiver<PipelineEvent>
where
    E: Executor + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut orchestrator = Orchestrator::new(config, executor).with_events(tx);
        // Completion and failure are both reported through the channel.
        let _ = orchestrator.deploy_full_stack(&src);
    });
    rx
}

/// Sequences the deploy stages and owns the run's single cluster session.
///
/// Pipeline transitions (`build_and_publish_images`, `provision_and_deploy`,
/// `wait_ready`, `deploy_full_stack`) move [`Stage`] forward; the first one
/// that fails moves it to [`Stage::Failed`], after which every further
/// transition is refused. Errors are returned to the caller unmodified.
pub struct Orchestrator<E: Executor = ProcessExecutor> {
    config: Config,
    executor: E,
    run_id: String,
    stage: Stage,
    /// Stage whose transition is running; output lines are tagged with it.
    active: Stage,
    session: SessionState,
    images: Vec<ImageReference>,
    events: Option<Sender<PipelineEvent>>,
    state_dir: PathBuf,
    probe_seq: usize,
    generation: usize,
    poll_interval: Option<Duration>,
}

impl<E: Executor> Orchestrator<E> {
    pub fn new(config: Config, executor: E) -> Self {
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let state_dir = PathBuf::from(&config.state_dir);
        Self {
            config,
            executor,
            run_id,
            stage: Stage::Init,
            active: Stage::Init,
            session: SessionState::Unprovisioned,
            images: Vec::new(),
            events: None,
            state_dir,
            probe_seq: 0,
            generation: 0,
            poll_interval: None,
        }
    }

    pub fn with_events(mut self, tx: Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Override how often the control plane is polled while starting.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Short run id carried by every resource this orchestrator creates.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build and publish every configured image. Sequential unless
    /// `parallel_builds` is set; either way all builds finish before this
    /// returns.
    pub fn build_and_publish_images(&mut self, src: &Path) -> Result<Vec<ImageReference>> {
        self.step(Stage::ImagesPublished, |o| {
            let images = if o.config.parallel_builds {
                o.build_parallel(src)?
            } else {
                o.build_sequential(src)?
            };
            o.images = images.clone();
            Ok(images)
        })
    }

    /// Build the images, provision a fresh cluster bound to a local
    /// registry, and apply the manifests. Returns the server's handle.
    ///
    /// Calling this again provisions a new cluster whose session replaces
    /// the stored one; the old cluster is left running until torn down.
    pub fn provision_and_deploy(&mut self, src: &Path) -> Result<ServiceHandle> {
        self.ensure_not_failed()?;
        let manifests = ManifestSet::discover(&src.join(&self.config.manifests_dir))?;

        self.build_and_publish_images(src)?;

        let session = self.step(Stage::ClusterReady, |o| o.provision(&manifests))?;
        let server = session.server().clone();
        if let SessionState::Active(old) = &self.session {
            tracing::warn!(
                old = %old.id(),
                new = %session.id(),
                "replacing cluster session; the old cluster keeps running"
            );
        }
        self.session = SessionState::Active(session);

        self.step(Stage::ManifestsApplied, |o| o.apply_manifests(&manifests))?;
        Ok(server)
    }

    /// Pass `argv` through to the cluster server and return its stdout.
    pub fn run_command(&self, argv: &[String]) -> Result<String> {
        let session = self.require_session()?;
        if argv.is_empty() {
            return Err(Error::Precondition("no command given".into()));
        }

        let cmd = session.exec(&self.config.engine, argv, self.config.timeouts.command());
        let result = self.runner(self.active).run(cmd)?;
        if !result.success {
            return Err(Error::Command {
                command: argv.join(" "),
                code: result.exit_code,
                output: result.combined_output(),
            });
        }
        Ok(result.stdout)
    }

    /// Wait for every configured workload to roll out, in order. The first
    /// timeout aborts the wait; later workloads are not checked.
    pub fn wait_ready(&mut self) -> Result<Vec<String>> {
        self.require_session()?;
        self.step(Stage::WorkloadsReady, |o| {
            let session = o.require_session()?;
            let runner = o.runner(Stage::WorkloadsReady);
            let mut statuses = Vec::with_capacity(o.config.workloads.len());
            for workload in &o.config.workloads {
                let result = rollout::wait_for_rollout(
                    &runner,
                    &o.config.engine,
                    session,
                    workload,
                    o.config.timeouts.rollout(),
                )?;
                statuses.push(result.stdout.trim().to_string());
            }
            Ok(statuses)
        })
    }

    pub fn test_data_service(&mut self) -> Result<String> {
        self.run_fixed_probe(ProbeKind::DataService).1
    }

    pub fn test_frontend(&mut self) -> Result<String> {
        self.run_fixed_probe(ProbeKind::Frontend).1
    }

    pub fn test_cross_service(&mut self) -> Result<String> {
        self.run_fixed_probe(ProbeKind::CrossService).1
    }

    /// Run every stage and assemble the report.
    ///
    /// Stages up to readiness are fail-fast. The three probes are all
    /// attempted and recorded in the report whether or not they pass, so a
    /// report is returned even when probes failed; check
    /// [`DeployReport::all_passed`].
    pub fn deploy_full_stack(&mut self, src: &Path) -> Result<DeployReport> {
        let outcome = self.deploy_inner(src);
        match &outcome {
            Ok(report) => self.emit(PipelineEvent::Completed(report.clone())),
            Err(e) => self.emit(PipelineEvent::Aborted(format!(
                "{e} (run {}; `shipcheck down {}` removes its resources)",
                self.run_id, self.run_id
            ))),
        }
        outcome
    }

    fn deploy_inner(&mut self, src: &Path) -> Result<DeployReport> {
        self.provision_and_deploy(src)?;
        self.wait_ready()?;

        let (workloads, probes) = self.step(Stage::Tested, |o| {
            let workloads = o.run_command(&[
                "kubectl".to_string(),
                "get".to_string(),
                "pods".to_string(),
                "-o".to_string(),
                "wide".to_string(),
            ])?;
            let probes = ProbeKind::ALL.map(|kind| o.probe_report(kind));
            Ok((workloads, probes))
        })?;
        let [data_service, frontend, cross_service] = probes;

        self.step(Stage::Done, |o| {
            let cluster = o
                .session
                .active()
                .map(|s| s.id().to_string())
                .unwrap_or_default();
            let report = DeployReport {
                run_id: o.run_id.clone(),
                cluster,
                images: o.images.clone(),
                workloads,
                data_service,
                frontend,
                cross_service,
            };
            tracing::info!(
                run = %report.run_id,
                all_passed = report.all_passed(),
                cross_matches_data = report.cross_matches_data(),
                "deploy report assembled"
            );
            Ok(report)
        })
    }

    // ── Stage bodies ─────────────────────────────────────────────────

    fn build_sequential(&self, src: &Path) -> Result<Vec<ImageReference>> {
        let runner = self.runner(Stage::ImagesPublished);
        self.config
            .images
            .iter()
            .map(|spec| {
                image::build_and_publish(
                    &runner,
                    &self.config.engine,
                    &src.join(&spec.context),
                    &spec.dockerfile,
                    &spec.reference,
                    &self.config.timeouts,
                )
            })
            .collect()
    }

    fn build_parallel(&self, src: &Path) -> Result<Vec<ImageReference>> {
        let results: Vec<Result<ImageReference>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .config
                .images
                .iter()
                .map(|spec| {
                    scope.spawn(move || {
                        let runner = self.runner(Stage::ImagesPublished);
                        image::build_and_publish(
                            &runner,
                            &self.config.engine,
                            &src.join(&spec.context),
                            &spec.dockerfile,
                            &spec.reference,
                            &self.config.timeouts,
                        )
                    })
                })
                .collect();

            handles
                .into_iter()
                .zip(&self.config.images)
                .map(|(handle, spec)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(Error::Build {
                            image: spec.reference.clone(),
                            detail: "build thread panicked".into(),
                        })
                    })
                })
                .collect()
        });
        results.into_iter().collect()
    }

    fn provision(&mut self, manifests: &ManifestSet) -> Result<ClusterSession> {
        self.generation += 1;
        let id = format!(
            "{}-{}-{}",
            self.config.cluster.name, self.run_id, self.generation
        );

        let runner = self.runner(Stage::ClusterReady);
        let mut provisioner = Provisioner::new(
            &runner,
            &self.config.engine,
            &self.run_id,
            self.state_dir.clone(),
            self.config.timeouts,
        );
        if let Some(interval) = self.poll_interval {
            provisioner = provisioner.with_poll_interval(interval);
        }

        let registry = provisioner.create_registry_service(&id, &self.config.registry)?;
        let config = ClusterConfig {
            bindings: vec![ServiceBinding::new(
                self.config.registry.binding.clone(),
                registry,
            )],
            ports: self
                .config
                .cluster
                .api_port
                .map(|host| PortMapping {
                    host,
                    container: API_PORT,
                })
                .into_iter()
                .collect(),
            mounts: vec![Mount::read_only(manifests.dir(), MANIFEST_MOUNT)],
            server_args: self.config.cluster.server_args.clone(),
        };
        let pending = provisioner.bootstrap(&id, config)?;
        provisioner.start(pending, &self.config.cluster)
    }

    fn apply_manifests(&self, manifests: &ManifestSet) -> Result<ApplySummary> {
        let session = self.require_session()?;
        manifest::apply(
            &self.runner(Stage::ManifestsApplied),
            &self.config.engine,
            session,
            manifests,
            self.config.timeouts.apply(),
        )
    }

    /// Run one of the fixed probes under a fresh pod name. The name is
    /// returned alongside the outcome so failures can still be reported.
    fn run_fixed_probe(&mut self, kind: ProbeKind) -> (String, Result<String>) {
        self.probe_seq += 1;
        let pod = format!("{}-{}-{}", kind.pod_prefix(), self.run_id, self.probe_seq);
        let result = self.probe(kind, &pod);
        match &result {
            Ok(_) => tracing::info!(probe = %pod, "probe passed"),
            Err(e) => tracing::warn!(probe = %pod, error = %e, "probe failed"),
        }
        (pod, result)
    }

    fn probe_report(&mut self, kind: ProbeKind) -> ProbeReport {
        let (pod, result) = self.run_fixed_probe(kind);
        let url = self.probe_target(kind).url.clone();
        let report = ProbeReport::from_result(kind, pod, url, result);
        self.emit(PipelineEvent::ProbeFinished(report.clone()));
        report
    }

    fn probe(&self, kind: ProbeKind, pod: &str) -> Result<String> {
        let session = self.require_session()?;
        let target = self.probe_target(kind);
        let body = probe::run_probe(
            &self.runner(self.active),
            &self.config.engine,
            session,
            pod,
            &self.config.probe_image,
            &probe::curl_command(&target.url),
            self.config.timeouts.probe(),
        )?;
        probe::check_expectation(pod, &body, target.expect.as_deref())?;
        Ok(body)
    }

    fn probe_target(&self, kind: ProbeKind) -> &ProbeTarget {
        match kind {
            ProbeKind::DataService => &self.config.probes.data_service,
            ProbeKind::Frontend => &self.config.probes.frontend,
            ProbeKind::CrossService => &self.config.probes.cross_service,
        }
    }

    // ── Plumbing ─────────────────────────────────────────────────────

    /// Run one pipeline transition, emitting start/finish events. On
    /// success the orchestrator is in `stage`; on failure it is `Failed`.
    fn step<T>(&mut self, stage: Stage, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ensure_not_failed()?;
        self.active = stage;
        self.emit(PipelineEvent::StageStarted(stage));
        tracing::info!(run = %self.run_id, stage = %stage, "stage started");

        let outcome = f(self);

        let success = outcome.is_ok();
        self.emit(PipelineEvent::StageFinished { stage, success });
        match &outcome {
            Ok(_) => {
                self.stage = stage;
                tracing::info!(run = %self.run_id, stage = %stage, "stage finished");
            }
            Err(e) => {
                self.stage = Stage::Failed;
                tracing::error!(run = %self.run_id, stage = %stage, error = %e, "stage failed");
            }
        }
        outcome
    }

    fn ensure_not_failed(&self) -> Result<()> {
        if self.stage == Stage::Failed {
            return Err(Error::Precondition(format!(
                "run {} already failed; start a new run",
                self.run_id
            )));
        }
        Ok(())
    }

    fn require_session(&self) -> Result<&ClusterSession> {
        match &self.session {
            SessionState::Active(session) => Ok(session),
            SessionState::Unprovisioned => Err(Error::Precondition(
                "no cluster session; run provision_and_deploy first".into(),
            )),
        }
    }

    /// A runner whose output lines are forwarded as `Log` events of `stage`.
    fn runner(&self, stage: Stage) -> Runner<'_> {
        let runner = Runner::new(&self.executor);
        match self.events.clone() {
            Some(tx) => runner.with_output(move |line| {
                let _ = tx.send(PipelineEvent::Log {
                    stage,
                    line: line.to_string(),
                });
            }),
            None => runner,
        }
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
