//! Workload manifests: discovery on disk, batch apply, apply output parsing.
mod apply;
mod outcome;

pub use apply::apply;
pub use outcome::{AppliedResource, ApplyAction, ApplySummary, parse_apply_log};

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// A directory of manifests applied together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSet {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl ManifestSet {
    /// List the top-level `.yaml`/`.yml`/`.json` files of `dir`, sorted.
    /// `kubectl apply -f <dir>` does not recurse, so neither does this.
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Precondition(format!(
                "manifest directory {} does not exist",
                dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file() && is_manifest(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(Error::Precondition(format!(
                "manifest directory {} contains no manifests",
                dir.display()
            )));
        }

        Ok(Self {
            dir: dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()),
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cluster::{ClusterConfig, Mount, Provisioner};
    use crate::config::{ClusterSettings, Timeouts};
    use crate::exec::{ExecResult, Runner, ScriptedExecutor};

    fn manifests_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("backend.yaml"), "kind: Deployment\n").unwrap();
        std::fs::write(dir.path().join("frontend.yml"), "kind: Deployment\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "docs\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/extra.yaml"), "kind: Service\n").unwrap();
        dir
    }

    fn session_with(exec: &ScriptedExecutor, mounts: Vec<Mount>) -> crate::cluster::ClusterSession {
        let runner = Runner::new(exec);
        let state = tempfile::tempdir().unwrap();
        let p = Provisioner::new(&runner, "docker", "run", state.path(), Timeouts::default());
        let pending = p
            .bootstrap(
                "test-run-1",
                ClusterConfig {
                    mounts,
                    ..ClusterConfig::default()
                },
            )
            .unwrap();
        p.start(pending, &ClusterSettings::default()).unwrap()
    }

    #[test]
    fn discover_lists_top_level_manifests_only() {
        let dir = manifests_dir();
        let set = ManifestSet::discover(dir.path()).unwrap();
        let names: Vec<_> = set
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["backend.yaml", "frontend.yml"]);
    }

    #[test]
    fn discover_rejects_missing_or_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ManifestSet::discover(&dir.path().join("nope")),
            Err(Error::Precondition(_))
        ));
        assert!(matches!(
            ManifestSet::discover(dir.path()),
            Err(Error::Precondition(_))
        ));
    }

    #[test]
    fn apply_uses_mounted_path() {
        let dir = manifests_dir();
        let set = ManifestSet::discover(dir.path()).unwrap();
        let exec = ScriptedExecutor::new().on(
            &["kubectl apply -f /manifests"],
            ExecResult::ok("deployment.apps/backend-app created\n"),
        );
        let session = session_with(&exec, vec![Mount::read_only(dir.path(), "/manifests")]);

        let summary = apply(
            &Runner::new(&exec),
            "docker",
            &session,
            &set,
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(summary.changed());
        assert_eq!(exec.count("kubectl apply"), 1);
    }

    #[test]
    fn reapplying_unchanged_set_reports_no_change() {
        let dir = manifests_dir();
        let set = ManifestSet::discover(dir.path()).unwrap();
        let exec = ScriptedExecutor::new()
            .on_times(
                &["kubectl apply"],
                1,
                ExecResult::ok("deployment.apps/backend-app created\nservice/backend-service created\n"),
            )
            .on(
                &["kubectl apply"],
                ExecResult::ok(
                    "deployment.apps/backend-app unchanged\nservice/backend-service unchanged\n",
                ),
            );
        let session = session_with(&exec, vec![Mount::read_only(dir.path(), "/manifests")]);
        let runner = Runner::new(&exec);

        let first = apply(&runner, "docker", &session, &set, Duration::from_secs(5)).unwrap();
        let second = apply(&runner, "docker", &session, &set, Duration::from_secs(5)).unwrap();
        assert!(first.changed());
        assert!(!second.changed());
    }

    #[test]
    fn unmounted_set_is_a_precondition_failure() {
        let dir = manifests_dir();
        let set = ManifestSet::discover(dir.path()).unwrap();
        let exec = ScriptedExecutor::new();
        let session = session_with(&exec, vec![]);

        let err = apply(
            &Runner::new(&exec),
            "docker",
            &session,
            &set,
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn non_zero_apply_is_reported_verbatim() {
        let dir = manifests_dir();
        let set = ManifestSet::discover(dir.path()).unwrap();
        let exec = ScriptedExecutor::new().on(
            &["kubectl apply"],
            ExecResult::failed(1, "error: unable to recognize \"backend.yaml\""),
        );
        let session = session_with(&exec, vec![Mount::read_only(dir.path(), "/manifests")]);

        let err = apply(
            &Runner::new(&exec),
            "docker",
            &session,
            &set,
            Duration::from_secs(5),
        )
        .unwrap_err();
        match err {
            Error::Apply { code, output } => {
                assert_eq!(code, Some(1));
                assert!(output.contains("unable to recognize"));
            }
            other => panic!("expected Apply, got {other:?}"),
        }
        assert_eq!(exec.count("kubectl apply"), 1);
    }
}
