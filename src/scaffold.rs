//! Demo source tree: two build contexts, their manifests and a config file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use include_dir::{Dir, DirEntry, include_dir};

static TEMPLATE: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/template");

/// Write the demo tree into `dir`, creating it if needed.
///
/// Refuses to overwrite: if any template file already exists, nothing is
/// written. Returns the created files, relative to `dir`.
pub fn init(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect(&TEMPLATE, &mut files);
    files.sort_by(|a, b| a.path().cmp(b.path()));

    let existing: Vec<String> = files
        .iter()
        .filter(|f| dir.join(f.path()).exists())
        .map(|f| f.path().display().to_string())
        .collect();
    if !existing.is_empty() {
        bail!(
            "{} already contains {}; refusing to overwrite",
            dir.display(),
            existing.join(", ")
        );
    }

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let target = dir.join(file.path());
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&target, file.contents())
            .with_context(|| format!("failed to write {}", target.display()))?;
        written.push(file.path().to_path_buf());
    }
    tracing::info!(dir = %dir.display(), files = written.len(), "demo tree written");
    Ok(written)
}

fn collect<'a>(dir: &'a Dir<'a>, out: &mut Vec<&'a include_dir::File<'a>>) {
    for entry in dir.entries() {
        match entry {
            DirEntry::Dir(d) => collect(d, out),
            DirEntry::File(f) => out.push(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::manifest::ManifestSet;

    #[test]
    fn writes_a_deployable_tree() {
        let dir = tempfile::tempdir().unwrap();
        let written = init(dir.path()).unwrap();

        assert!(written.contains(&PathBuf::from("backend/Dockerfile")));
        assert!(written.contains(&PathBuf::from("frontend/nginx.conf")));
        assert!(dir.path().join("frontend/index.html").is_file());

        let cfg = config::load(dir.path()).unwrap();
        assert_eq!(cfg, config::Config::default());

        let set = ManifestSet::discover(&dir.path().join(&cfg.manifests_dir)).unwrap();
        assert_eq!(set.files().len(), 2);
    }

    #[test]
    fn manifests_match_default_workloads() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path()).unwrap();
        let cfg = config::Config::default();
        let backend = std::fs::read_to_string(dir.path().join("manifests/backend.yaml")).unwrap();
        let frontend =
            std::fs::read_to_string(dir.path().join("manifests/frontend.yaml")).unwrap();

        assert!(backend.contains(&format!("name: {}", cfg.workloads[0])));
        assert!(backend.contains(&cfg.images[0].reference));
        assert!(frontend.contains(&format!("name: {}", cfg.workloads[1])));
        assert!(frontend.contains(&cfg.images[1].reference));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(config::CONFIG_FILE), "engine: podman\n").unwrap();

        let err = init(dir.path()).unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
        assert!(!dir.path().join("backend").exists());
        let kept = std::fs::read_to_string(dir.path().join(config::CONFIG_FILE)).unwrap();
        assert_eq!(kept, "engine: podman\n");
    }
}
