//! Image build and publish through the container engine CLI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::exec::{ExecCommand, Runner};

/// A published, registry-qualified image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse `repo[:tag][@digest]`. The tag defaults to `latest`.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => (name, Some(digest.to_string())),
            None => (reference, None),
        };

        // A colon after the last slash separates the tag; earlier colons
        // belong to a registry port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => (&name[..last_slash + i], &name[last_slash + i + 1..]),
            None => (name, "latest"),
        };

        if repository.is_empty() || tag.is_empty() {
            return Err(Error::Build {
                image: reference.to_string(),
                detail: "not a valid image reference".to_string(),
            });
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

/// Build the image described by `descriptor` inside `context`, publish it
/// as `target`, and return the resolved reference.
///
/// Any failure is returned as [`Error::Build`] before a reference is handed
/// out; a failed build never reaches the push step.
pub fn build_and_publish(
    runner: &Runner,
    engine: &str,
    context: &Path,
    descriptor: &str,
    target: &str,
    timeouts: &Timeouts,
) -> Result<ImageReference> {
    let mut reference = ImageReference::parse(target)?;
    let build_err = |detail: String| Error::Build {
        image: target.to_string(),
        detail,
    };

    let build_file = resolve_descriptor(context, descriptor).map_err(build_err)?;

    tracing::info!(image = %target, file = %build_file.display(), "building image");
    let built = runner.run(build_command(
        engine,
        context,
        &build_file,
        target,
        timeouts.build(),
    ))?;
    if !built.success {
        return Err(build_err(format!("build failed: {}", built.combined_output())));
    }

    tracing::info!(image = %target, "publishing image");
    let pushed = runner.run(push_command(engine, target, timeouts.publish()))?;
    if !pushed.success {
        return Err(build_err(format!("push failed: {}", pushed.combined_output())));
    }

    // Digest lookup is best effort: some engines only record it after a pull.
    let inspected = runner.run(digest_command(engine, target, timeouts.publish()))?;
    if inspected.success {
        reference.digest = parse_digest(&inspected.stdout);
    }

    Ok(reference)
}

/// The descriptor must name a regular file that stays inside the context.
fn resolve_descriptor(context: &Path, descriptor: &str) -> std::result::Result<PathBuf, String> {
    let context = context
        .canonicalize()
        .map_err(|e| format!("build context {} is not accessible: {e}", context.display()))?;
    let file = context.join(descriptor);
    let file = file
        .canonicalize()
        .map_err(|_| format!("build file {} not found", file.display()))?;
    if !file.starts_with(&context) {
        return Err(format!("build file {descriptor} escapes the build context"));
    }
    if !file.is_file() {
        return Err(format!("build file {} is not a file", file.display()));
    }
    Ok(file)
}

fn build_command(
    engine: &str,
    context: &Path,
    build_file: &Path,
    target: &str,
    timeout: Duration,
) -> ExecCommand {
    ExecCommand::new(
        engine,
        vec![
            "build".into(),
            "-f".into(),
            build_file.display().to_string(),
            "-t".into(),
            target.to_string(),
            context.display().to_string(),
        ],
        timeout,
    )
}

fn push_command(engine: &str, target: &str, timeout: Duration) -> ExecCommand {
    ExecCommand::new(engine, vec!["push".into(), target.to_string()], timeout)
}

fn digest_command(engine: &str, target: &str, timeout: Duration) -> ExecCommand {
    ExecCommand::new(
        engine,
        vec![
            "image".into(),
            "inspect".into(),
            "--format".into(),
            "{{index .RepoDigests 0}}".into(),
            target.to_string(),
        ],
        timeout,
    )
}

/// Extract `sha256:...` from `repo@sha256:...`.
fn parse_digest(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|l| l.trim().split_once('@').map(|(_, d)| d.to_string()))
        .filter(|d| !d.is_empty())
}
