use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// One image to build from the source tree and publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSpec {
    pub name: String,
    /// Build context, relative to the source root.
    pub context: String,
    /// Build file, relative to the context.
    pub dockerfile: String,
    /// Target reference the image is published under.
    pub reference: String,
}

impl Default for ImageSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            context: ".".to_string(),
            dockerfile: "Dockerfile".to_string(),
            reference: String::new(),
        }
    }
}

impl ImageSpec {
    fn demo(name: &str, dockerfile: &str, reference: &str) -> Self {
        Self {
            name: name.to_string(),
            context: ".".to_string(),
            dockerfile: dockerfile.to_string(),
            reference: reference.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub image: String,
    pub port: u16,
    /// Name the registry resolves under from inside the cluster.
    pub binding: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            image: "registry:2.8".to_string(),
            port: 5000,
            binding: "registry".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub name: String,
    pub image: String,
    /// Host port to publish the API server on. Unpublished when unset.
    pub api_port: Option<u16>,
    pub server_args: Vec<String>,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            name: "test".to_string(),
            image: "rancher/k3s:v1.30.4-k3s1".to_string(),
            api_port: None,
            server_args: Vec::new(),
        }
    }
}

/// An in-cluster HTTP target for a smoke probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    pub url: String,
    /// Text the response body must contain.
    pub expect: Option<String>,
}

impl ProbeTarget {
    fn new(url: &str, expect: &str) -> Self {
        Self {
            url: url.to_string(),
            expect: Some(expect.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTargets {
    pub data_service: ProbeTarget,
    pub frontend: ProbeTarget,
    pub cross_service: ProbeTarget,
}

impl Default for ProbeTargets {
    fn default() -> Self {
        Self {
            data_service: ProbeTarget::new(
                "http://backend-service:5000/api",
                "Hello from Backend!",
            ),
            frontend: ProbeTarget::new("http://frontend-service:80/", "<html"),
            cross_service: ProbeTarget::new(
                "http://frontend-service:80/api",
                "Hello from Backend!",
            ),
        }
    }
}

/// A probe target as written in the config file. Missing fields fall back
/// to that probe's own default; `expect: null` clears the expectation.
#[derive(Default, Deserialize)]
#[serde(default)]
struct TargetOverride {
    url: Option<String>,
    #[serde(deserialize_with = "present")]
    expect: Option<Option<String>>,
}

fn present<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<Option<String>>, D::Error> {
    Option::<String>::deserialize(d).map(Some)
}

impl TargetOverride {
    fn over(self, base: ProbeTarget) -> ProbeTarget {
        ProbeTarget {
            url: self.url.unwrap_or(base.url),
            expect: self.expect.unwrap_or(base.expect),
        }
    }
}

impl<'de> Deserialize<'de> for ProbeTargets {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Default, Deserialize)]
        #[serde(default)]
        struct Raw {
            data_service: TargetOverride,
            frontend: TargetOverride,
            cross_service: TargetOverride,
        }

        let raw = Raw::deserialize(d)?;
        let base = ProbeTargets::default();
        Ok(Self {
            data_service: raw.data_service.over(base.data_service),
            frontend: raw.frontend.over(base.frontend),
            cross_service: raw.cross_service.over(base.cross_service),
        })
    }
}

/// Per-stage bounds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub build: u64,
    pub publish: u64,
    pub start: u64,
    pub apply: u64,
    pub rollout: u64,
    pub probe: u64,
    pub command: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            build: 900,
            publish: 600,
            start: 120,
            apply: 120,
            rollout: 120,
            probe: 120,
            command: 120,
        }
    }
}

impl Timeouts {
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_secs(self.publish)
    }

    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start)
    }

    pub fn apply(&self) -> Duration {
        Duration::from_secs(self.apply)
    }

    pub fn rollout(&self) -> Duration {
        Duration::from_secs(self.rollout)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command)
    }

    fn all(&self) -> [(&'static str, u64); 7] {
        [
            ("build", self.build),
            ("publish", self.publish),
            ("start", self.start),
            ("apply", self.apply),
            ("rollout", self.rollout),
            ("probe", self.probe),
            ("command", self.command),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container engine CLI.
    pub engine: String,
    pub images: Vec<ImageSpec>,
    pub registry: RegistrySettings,
    pub cluster: ClusterSettings,
    /// Manifest directory, relative to the source root.
    pub manifests_dir: String,
    /// Deployments that must roll out, in wait order.
    pub workloads: Vec<String>,
    pub probe_image: String,
    pub probes: ProbeTargets,
    pub timeouts: Timeouts,
    pub parallel_builds: bool,
    /// Per-run scratch files, relative to the working directory.
    pub state_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: "docker".to_string(),
            images: vec![
                ImageSpec::demo(
                    "backend",
                    "backend/Dockerfile",
                    "ttl.sh/my-backend-app:latest",
                ),
                ImageSpec::demo(
                    "frontend",
                    "frontend/Dockerfile",
                    "ttl.sh/my-frontend-app:latest",
                ),
            ],
            registry: RegistrySettings::default(),
            cluster: ClusterSettings::default(),
            manifests_dir: "manifests".to_string(),
            workloads: vec!["backend-app".to_string(), "frontend-app".to_string()],
            probe_image: "curlimages/curl:7.85.0".to_string(),
            probes: ProbeTargets::default(),
            timeouts: Timeouts::default(),
            parallel_builds: false,
            state_dir: ".shipcheck".to_string(),
        }
    }
}

impl Config {
    /// Reject configurations the pipeline cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.engine.trim().is_empty() {
            return Err(Error::Config("engine cannot be blank".into()));
        }
        if self.images.is_empty() {
            return Err(Error::Config("at least one image is required".into()));
        }
        for image in &self.images {
            if image.name.trim().is_empty() || image.reference.trim().is_empty() {
                return Err(Error::Config(format!(
                    "image {:?} needs both a name and a reference",
                    image.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for workload in &self.workloads {
            if !seen.insert(workload.as_str()) {
                return Err(Error::Config(format!("workload {workload} listed twice")));
            }
        }

        for (name, secs) in self.timeouts.all() {
            if secs == 0 {
                return Err(Error::Config(format!("timeouts.{name} must be positive")));
            }
        }

        for (name, target) in [
            ("data_service", &self.probes.data_service),
            ("frontend", &self.probes.frontend),
            ("cross_service", &self.probes.cross_service),
        ] {
            if target.url.trim().is_empty() {
                return Err(Error::Config(format!("probes.{name}.url cannot be blank")));
            }
        }

        if self.cluster.name.trim().is_empty() {
            return Err(Error::Config("cluster.name cannot be blank".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_demo_stack() {
        let cfg = Config::default();
        assert_eq!(cfg.images.len(), 2);
        assert_eq!(cfg.images[0].reference, "ttl.sh/my-backend-app:latest");
        assert_eq!(cfg.images[1].dockerfile, "frontend/Dockerfile");
        assert_eq!(cfg.registry.port, 5000);
        assert_eq!(cfg.workloads, vec!["backend-app", "frontend-app"]);
        assert_eq!(cfg.timeouts.rollout(), Duration::from_secs(120));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "registry:\n  port: 5001\ntimeouts:\n  rollout: 30\nparallel_builds: true\n",
        )
        .unwrap();
        assert_eq!(cfg.registry.port, 5001);
        assert_eq!(cfg.registry.image, "registry:2.8");
        assert_eq!(cfg.timeouts.rollout, 30);
        assert_eq!(cfg.timeouts.start, 120);
        assert!(cfg.parallel_builds);
        assert_eq!(cfg.images.len(), 2);
    }

    #[test]
    fn validate_rejects_duplicate_workloads() {
        let cfg = Config {
            workloads: vec!["a".into(), "a".into()],
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut cfg = Config::default();
        cfg.timeouts.probe = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("timeouts.probe"));
    }

    #[test]
    fn validate_rejects_missing_images() {
        let cfg = Config {
            images: Vec::new(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn probe_expectation_can_be_cleared() {
        let cfg: Config =
            serde_yaml::from_str("probes:\n  frontend:\n    url: http://web/\n    expect: null\n")
                .unwrap();
        assert_eq!(cfg.probes.frontend.url, "http://web/");
        assert_eq!(cfg.probes.frontend.expect, None);
        assert!(cfg.probes.data_service.expect.is_some());
    }

    #[test]
    fn partial_probe_override_keeps_that_probes_url() {
        let cfg: Config =
            serde_yaml::from_str("probes:\n  frontend:\n    expect: \"<!DOCTYPE\"\n").unwrap();
        assert_eq!(cfg.probes.frontend.url, "http://frontend-service:80/");
        assert_eq!(cfg.probes.frontend.expect.as_deref(), Some("<!DOCTYPE"));
        assert_eq!(cfg.probes.cross_service, ProbeTargets::default().cross_service);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_probe_url() {
        let mut cfg = Config::default();
        cfg.probes.cross_service.url = "  ".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("probes.cross_service.url"));
    }
}
