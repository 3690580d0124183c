use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{ClusterSettings, RegistrySettings, Timeouts};
use crate::error::{Error, Result};
use crate::exec::{ExecCommand, Runner};

use super::session::{ClusterConfig, ClusterSession, Mount, PendingCluster, ServiceHandle};
use super::{API_PORT, RUN_LABEL};

const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const REGISTRIES_MOUNT: &str = "/etc/rancher/k3s/registries.yaml";

/// Stands up the registry service and the cluster server for one run.
///
/// Containers and networks carry a `shipcheck.run=<run>` label so
/// [`super::teardown`] can find them later.
pub struct Provisioner<'a> {
    runner: &'a Runner<'a>,
    engine: &'a str,
    run_id: &'a str,
    state_dir: PathBuf,
    timeouts: Timeouts,
    poll_interval: Duration,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        runner: &'a Runner<'a>,
        engine: &'a str,
        run_id: &'a str,
        state_dir: impl Into<PathBuf>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            runner,
            engine,
            run_id,
            state_dir: state_dir.into(),
            timeouts,
            poll_interval: READY_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start a detached registry container. It is not reachable from the
    /// cluster until it is bound by [`Provisioner::bootstrap`].
    pub fn create_registry_service(
        &self,
        id: &str,
        settings: &RegistrySettings,
    ) -> Result<ServiceHandle> {
        let container = format!("{id}-registry");
        let mut args = self.run_args(&container);
        args.extend([
            "--expose".into(),
            settings.port.to_string(),
            "-e".into(),
            format!("REGISTRY_HTTP_ADDR=0.0.0.0:{}", settings.port),
            settings.image.clone(),
        ]);

        tracing::info!(container = %container, image = %settings.image, "starting registry service");
        self.check(
            ExecCommand::new(self.engine, args, self.timeouts.start()),
            "registry service did not start",
        )?;

        Ok(ServiceHandle {
            endpoint: format!("{}:{}", settings.binding, settings.port),
            container,
            port: settings.port,
        })
    }

    /// Create the cluster network, attach every binding to it under its
    /// name, and write the registry mirror file the server will mount.
    ///
    /// Bindings must exist before the server starts so images pulled from a
    /// bound registry resolve for the very first scheduled pod.
    pub fn bootstrap(&self, id: &str, mut config: ClusterConfig) -> Result<PendingCluster> {
        let network = id.to_string();
        self.check(
            ExecCommand::new(
                self.engine,
                vec![
                    "network".into(),
                    "create".into(),
                    "--label".into(),
                    format!("{RUN_LABEL}={}", self.run_id),
                    network.clone(),
                ],
                self.timeouts.start(),
            ),
            "cluster network could not be created",
        )?;

        for binding in &config.bindings {
            tracing::info!(binding = %binding.name, container = %binding.service.container, "binding service");
            self.check(
                ExecCommand::new(
                    self.engine,
                    vec![
                        "network".into(),
                        "connect".into(),
                        "--alias".into(),
                        binding.name.clone(),
                        network.clone(),
                        binding.service.container.clone(),
                    ],
                    self.timeouts.start(),
                ),
                &format!("could not bind {}", binding.name),
            )?;
        }

        if !config.bindings.is_empty() {
            let mirrors = self.write_mirrors(id, &config)?;
            config.mounts.push(Mount::read_only(mirrors, REGISTRIES_MOUNT));
        }

        Ok(PendingCluster {
            id: id.to_string(),
            run_id: self.run_id.to_string(),
            network,
            config,
        })
    }

    /// Start the server and block until its API answers `/readyz`, or fail
    /// once the start bound elapses. The session only exists on success.
    pub fn start(&self, pending: PendingCluster, settings: &ClusterSettings) -> Result<ClusterSession> {
        let container = format!("{}-server", pending.id);
        let mut args = self.run_args(&container);
        args.extend([
            "--privileged".into(),
            "--hostname".into(),
            container.clone(),
            "--network".into(),
            pending.network.clone(),
        ]);
        for port in &pending.config.ports {
            args.extend(["-p".into(), format!("{}:{}", port.host, port.container)]);
        }
        for mount in &pending.config.mounts {
            args.extend(["-v".into(), mount.volume_arg()]);
        }
        args.push(settings.image.clone());
        args.push("server".into());
        args.extend(pending.config.server_args.iter().cloned());

        tracing::info!(container = %container, image = %settings.image, "starting cluster server");
        self.check(
            ExecCommand::new(self.engine, args, self.timeouts.start()),
            "cluster server did not start",
        )?;

        let endpoint = match pending.config.ports.iter().find(|p| p.container == API_PORT) {
            Some(p) => format!("https://127.0.0.1:{}", p.host),
            None => format!("https://{container}:{API_PORT}"),
        };
        let server = ServiceHandle {
            container,
            port: API_PORT,
            endpoint,
        };

        self.wait_until_ready(&server)?;
        Ok(ClusterSession::started(pending, server))
    }

    fn wait_until_ready(&self, server: &ServiceHandle) -> Result<()> {
        let bound = self.timeouts.start();
        let started = Instant::now();
        let mut last = String::new();
        loop {
            // Each attempt only gets what is left of the overall bound.
            let remaining = bound.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(Error::Provision(format!(
                    "control plane of {} not ready after {}s: {}",
                    server.container,
                    bound.as_secs(),
                    last
                )));
            }
            let attempt = ExecCommand::new(
                self.engine,
                vec![
                    "exec".into(),
                    server.container.clone(),
                    "kubectl".into(),
                    "get".into(),
                    "--raw=/readyz".into(),
                ],
                remaining,
            );
            let result = self.runner.run(attempt)?;
            if result.success {
                tracing::info!(
                    container = %server.container,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "cluster control plane ready"
                );
                return Ok(());
            }
            last = result.combined_output();
            std::thread::sleep(self.poll_interval.min(bound.saturating_sub(started.elapsed())));
        }
    }

    fn write_mirrors(&self, id: &str, config: &ClusterConfig) -> Result<PathBuf> {
        let dir = self.state_dir.join(id);
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::Provision(format!("cannot create state dir {}: {e}", dir.display()))
        })?;
        let path = dir.join("registries.yaml");
        std::fs::write(&path, registries_yaml(config)?)
            .map_err(|e| Error::Provision(format!("cannot write {}: {e}", path.display())))?;
        Ok(absolute(&path))
    }

    fn run_args(&self, container: &str) -> Vec<String> {
        vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            container.to_string(),
            "--label".into(),
            format!("{RUN_LABEL}={}", self.run_id),
        ]
    }

    fn check(&self, cmd: ExecCommand, what: &str) -> Result<()> {
        let result = self.runner.run(cmd)?;
        if result.success {
            Ok(())
        } else {
            Err(Error::Provision(format!("{what}: {}", result.combined_output())))
        }
    }
}

#[derive(Serialize)]
struct Registries {
    mirrors: BTreeMap<String, Mirror>,
}

#[derive(Serialize)]
struct Mirror {
    endpoint: Vec<String>,
}

/// k3s `registries.yaml` mirroring every bound service over plain HTTP.
fn registries_yaml(config: &ClusterConfig) -> Result<String> {
    let mirrors = config
        .bindings
        .iter()
        .map(|b| {
            (
                b.address(),
                Mirror {
                    endpoint: vec![format!("http://{}", b.address())],
                },
            )
        })
        .collect();
    serde_yaml::to_string(&Registries { mirrors })
        .map_err(|e| Error::Provision(format!("cannot render registries.yaml: {e}")))
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
