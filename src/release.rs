//! Release publishing through the GitHub CLI.
//!
//! The release host is driven entirely via `gh`: the latest release
//! body is the release history, and `gh release create` is the single
//! state-mutating step of the whole pipeline.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use tracing::warn;

use crate::{Error, Result};

/// Latest release as reported by `gh release view`.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestRelease {
    #[serde(rename = "tagName")]
    pub tag_name: String,
    #[serde(default)]
    pub body: String,
}

/// Client for the `gh` CLI.
pub struct GhClient {
    repo: Option<String>,
}

impl GhClient {
    /// Target the repository `gh` infers from the working directory.
    pub fn new(repo: Option<String>) -> Self {
        Self { repo }
    }

    /// Check that gh is available before any network work happens.
    pub fn check_gh() -> Result<()> {
        if which::which("gh").is_err() {
            return Err(Error::Publish(
                "gh command not found - install the GitHub CLI to publish releases".into(),
            ));
        }
        Ok(())
    }

    fn repo_args(&self) -> Vec<&str> {
        match self.repo {
            Some(ref repo) => vec!["-R", repo.as_str()],
            None => Vec::new(),
        }
    }

    /// Fetch the most recent release, or `None` when history is empty.
    ///
    /// Any failure here (no releases yet, transient API error) is
    /// treated as absent history and the run proceeds as a first
    /// publish.
    pub fn latest_release(&self) -> Option<LatestRelease> {
        let output = Command::new("gh")
            .args(["release", "view", "--json", "tagName,body"])
            .args(self.repo_args())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("failed to run gh release view: {}", e);
                return None;
            }
        };
        if !output.status.success() || output.stdout.is_empty() {
            return None;
        }

        match serde_json::from_slice::<LatestRelease>(&output.stdout) {
            Ok(release) => Some(release),
            Err(e) => {
                warn!("unexpected gh release view output: {}", e);
                None
            }
        }
    }

    /// Create a release with the given tag, title, assets, and notes file.
    pub fn create_release(
        &self,
        tag: &str,
        title: &str,
        assets: &[&Path],
        notes_file: &Path,
    ) -> Result<()> {
        let mut cmd = Command::new("gh");
        cmd.args(["release", "create", tag])
            .args(self.repo_args())
            .arg("-t")
            .arg(title)
            .arg("-F")
            .arg(notes_file);
        for asset in assets {
            cmd.arg(asset);
        }

        let output = cmd
            .output()
            .map_err(|e| Error::Publish(format!("failed to run gh release create: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Publish(format!(
                "gh release create {} failed: {}",
                tag, stderr
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_release_json_shape() {
        let json = r#"{"tagName": "v4.0.5", "body": "- DestVersion: 4.0.5\n- Sha256: abc"}"#;
        let release: LatestRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "v4.0.5");
        assert!(release.body.contains("DestVersion"));
    }

    #[test]
    fn test_latest_release_body_defaults_empty() {
        let release: LatestRelease = serde_json::from_str(r#"{"tagName": "v1"}"#).unwrap();
        assert_eq!(release.body, "");
    }
}
