use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::exec::ExecCommand;

/// A running service container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceHandle {
    /// Container name.
    pub container: String,
    /// Port the service listens on inside its container.
    pub port: u16,
    /// Address clients should use.
    pub endpoint: String,
}

/// An auxiliary service attached to the cluster network under `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBinding {
    pub name: String,
    pub service: ServiceHandle,
}

impl ServiceBinding {
    pub fn new(name: impl Into<String>, service: ServiceHandle) -> Self {
        Self {
            name: name.into(),
            service,
        }
    }

    /// `name:port`, as seen from inside the cluster.
    pub fn address(&self) -> String {
        format!("{}:{}", self.name, self.service.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            read_only: true,
        }
    }

    pub(crate) fn volume_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.host.display(), self.container);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Everything the cluster server container is started with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    pub bindings: Vec<ServiceBinding>,
    pub ports: Vec<PortMapping>,
    pub mounts: Vec<Mount>,
    pub server_args: Vec<String>,
}

/// A bootstrapped cluster that has not been started yet.
///
/// Only [`super::Provisioner::start`] turns this into a [`ClusterSession`].
#[derive(Debug)]
pub struct PendingCluster {
    pub(super) id: String,
    pub(super) run_id: String,
    pub(super) network: String,
    pub(super) config: ClusterConfig,
}

impl PendingCluster {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

/// A live, started cluster plus the services bound into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSession {
    id: String,
    run_id: String,
    network: String,
    server: ServiceHandle,
    bindings: Vec<ServiceBinding>,
    mounts: Vec<Mount>,
    started: bool,
}

impl ClusterSession {
    pub(super) fn started(pending: PendingCluster, server: ServiceHandle) -> Self {
        Self {
            id: pending.id,
            run_id: pending.run_id,
            network: pending.network,
            server,
            bindings: pending.config.bindings,
            mounts: pending.config.mounts,
            started: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn server(&self) -> &ServiceHandle {
        &self.server
    }

    pub fn bindings(&self) -> &[ServiceBinding] {
        &self.bindings
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn ensure_started(&self) -> Result<()> {
        if self.started {
            Ok(())
        } else {
            Err(Error::Precondition(format!(
                "cluster {} has not been started",
                self.id
            )))
        }
    }

    /// The mount that exposes `host` inside the server, if any.
    pub fn mount_for(&self, host: &Path) -> Option<&Mount> {
        let wanted = host.canonicalize().unwrap_or_else(|_| host.to_path_buf());
        self.mounts.iter().find(|m| {
            let have = m.host.canonicalize().unwrap_or_else(|_| m.host.clone());
            have == wanted
        })
    }

    /// `engine exec <server> <argv...>`.
    pub fn exec(&self, engine: &str, argv: &[String], timeout: Duration) -> ExecCommand {
        let mut args = Vec::with_capacity(argv.len() + 2);
        args.push("exec".to_string());
        args.push(self.server.container.clone());
        args.extend(argv.iter().cloned());
        ExecCommand::new(engine, args, timeout)
    }

    /// `kubectl <args...>` inside the server.
    pub fn kubectl(&self, engine: &str, args: &[&str], timeout: Duration) -> ExecCommand {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("kubectl".to_string());
        argv.extend(args.iter().map(|a| a.to_string()));
        self.exec(engine, &argv, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(mounts: Vec<Mount>) -> ClusterSession {
        let pending = PendingCluster {
            id: "test-abc-1".into(),
            run_id: "abc".into(),
            network: "test-abc-1".into(),
            config: ClusterConfig {
                mounts,
                ..ClusterConfig::default()
            },
        };
        ClusterSession::started(
            pending,
            ServiceHandle {
                container: "test-abc-1-server".into(),
                port: 6443,
                endpoint: "https://test-abc-1-server:6443".into(),
            },
        )
    }

    #[test]
    fn kubectl_runs_inside_server() {
        let cmd = session(vec![]).kubectl("docker", &["get", "pods"], Duration::from_secs(5));
        assert_eq!(cmd.display(), "docker exec test-abc-1-server kubectl get pods");
        assert_eq!(cmd.timeout, Duration::from_secs(5));
    }

    #[test]
    fn mount_lookup_canonicalizes() {
        let dir = tempfile::tempdir().unwrap();
        let manifests = dir.path().join("manifests");
        std::fs::create_dir(&manifests).unwrap();
        let s = session(vec![Mount::read_only(&manifests, "/manifests")]);

        let via_dot = dir.path().join(".").join("manifests");
        assert_eq!(s.mount_for(&via_dot).unwrap().container, "/manifests");
        assert!(s.mount_for(dir.path()).is_none());
    }

    #[test]
    fn volume_arg_marks_read_only() {
        let m = Mount::read_only("/src/manifests", "/manifests");
        assert_eq!(m.volume_arg(), "/src/manifests:/manifests:ro");
    }

    #[test]
    fn started_session_passes_precondition() {
        let s = session(vec![]);
        assert!(s.is_started());
        assert!(s.ensure_started().is_ok());
    }

    #[test]
    fn binding_address_uses_service_port() {
        let b = ServiceBinding::new(
            "registry",
            ServiceHandle {
                container: "reg".into(),
                port: 5000,
                endpoint: "registry:5000".into(),
            },
        );
        assert_eq!(b.address(), "registry:5000");
    }
}
