//! Disk image access.
//!
//! Opening a DMG is delegated to an external tool: `hdiutil` mounts it
//! in place on macOS, `7z` extracts it into the run's temp directory
//! everywhere else. Either way the result is a browsable file tree that
//! is torn down when the [`MountedImage`] guard drops.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{Error, Result};

static MOUNT_POINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(/Volumes/[^\n\t]+)").expect("valid mount point regex"));

/// External tool used to open the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTool {
    Hdiutil,
    SevenZip,
}

impl ImageTool {
    /// Pick the available tool, preferring the OS-level mount.
    pub fn detect() -> Result<Self> {
        if which::which("hdiutil").is_ok() {
            return Ok(ImageTool::Hdiutil);
        }
        if which::which("7z").is_ok() {
            return Ok(ImageTool::SevenZip);
        }
        Err(Error::Mount(
            "neither hdiutil nor 7z is available to open the image".into(),
        ))
    }
}

/// An opened disk image rooted at [`MountedImage::root`].
///
/// Dropping the guard detaches the volume (hdiutil) or removes the
/// extracted tree (7z), so the image is released on every exit path.
pub struct MountedImage {
    root: PathBuf,
    mount_point: Option<String>,
}

impl MountedImage {
    /// Open `dmg`, extracting into `workdir` when mounting is not an option.
    pub fn open(dmg: &Path, workdir: &Path) -> Result<Self> {
        match ImageTool::detect()? {
            ImageTool::Hdiutil => Self::attach(dmg),
            ImageTool::SevenZip => Self::extract(dmg, workdir),
        }
    }

    /// Root of the browsable file tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn attach(dmg: &Path) -> Result<Self> {
        let output = Command::new("hdiutil")
            .arg("attach")
            .arg(dmg)
            .args(["-nobrowse", "-readonly"])
            .output()
            .map_err(|e| Error::Mount(format!("failed to run hdiutil: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Mount(format!("hdiutil attach failed: {}", stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mount_point = MOUNT_POINT_RE
            .find_iter(&stdout)
            .last()
            .map(|m| m.as_str().trim().to_string())
            .ok_or_else(|| Error::Mount("no mount point in hdiutil output".into()))?;

        debug!("attached image at {}", mount_point);
        Ok(Self {
            root: PathBuf::from(&mount_point),
            mount_point: Some(mount_point),
        })
    }

    fn extract(dmg: &Path, workdir: &Path) -> Result<Self> {
        let out_dir = workdir.join("image");
        std::fs::create_dir_all(&out_dir)?;

        let output = Command::new("7z")
            .arg("x")
            .arg("-y")
            .arg(format!("-o{}", out_dir.display()))
            .arg(dmg)
            .output()
            .map_err(|e| Error::Mount(format!("failed to run 7z: {}", e)))?;

        // 7z exits 1 for warnings (e.g. unsupported HFS padding entries)
        // while still extracting the payload.
        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() && code != 1 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Mount(format!("7z extraction failed: {}", stderr)));
        }

        debug!("extracted image into {}", out_dir.display());
        Ok(Self {
            root: out_dir,
            mount_point: None,
        })
    }
}

impl Drop for MountedImage {
    fn drop(&mut self) {
        if let Some(ref mount_point) = self.mount_point {
            let result = Command::new("hdiutil")
                .args(["detach", mount_point.as_str()])
                .output();
            if let Err(e) = result {
                warn!("failed to detach {}: {}", mount_point, e);
            }
        } else if self.root.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                warn!("failed to remove extracted tree {}: {}", self.root.display(), e);
            }
        }
    }
}

/// Locate the application's `Info.plist` inside the image tree.
///
/// The expected location is `<root>/<app_name>.app/Contents/Info.plist`.
/// When the bundle was renamed or nested, the tree is searched for any
/// `Info.plist` inside an `.app` bundle, then for any `Info.plist` at
/// all. Nothing found is fatal for the run.
pub fn find_info_plist(root: &Path, app_name: &str) -> Result<PathBuf> {
    let expected = root
        .join(format!("{}.app", app_name))
        .join("Contents")
        .join("Info.plist");
    if expected.is_file() {
        return Ok(expected);
    }

    let mut fallback = None;
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || entry.file_name() != "Info.plist" {
            continue;
        }
        let path = entry.into_path();
        if in_app_bundle(&path) {
            return Ok(path);
        }
        fallback.get_or_insert(path);
    }

    fallback.ok_or_else(|| {
        Error::MetadataNotFound(format!("no Info.plist under {}", root.display()))
    })
}

fn in_app_bundle(plist_path: &Path) -> bool {
    let contents = plist_path.parent();
    let bundle = contents.and_then(Path::parent);
    contents.and_then(Path::file_name).map(|n| n == "Contents") == Some(true)
        && bundle
            .and_then(Path::extension)
            .map(|ext| ext == "app")
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"plist").unwrap();
    }

    #[test]
    fn test_find_plist_at_expected_path() {
        let dir = TempDir::new().unwrap();
        let expected = dir.path().join("Chat.app/Contents/Info.plist");
        touch(&expected);
        touch(&dir.path().join("Other.app/Contents/Info.plist"));

        let found = find_info_plist(dir.path(), "Chat").unwrap();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_find_plist_falls_back_to_any_bundle() {
        let dir = TempDir::new().unwrap();
        let renamed = dir.path().join("Renamed.app/Contents/Info.plist");
        touch(&renamed);

        let found = find_info_plist(dir.path(), "Chat").unwrap();
        assert_eq!(found, renamed);
    }

    #[test]
    fn test_find_plist_prefers_bundle_over_stray_file() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("docs/Info.plist"));
        let bundled = dir.path().join("nested/App.app/Contents/Info.plist");
        touch(&bundled);

        let found = find_info_plist(dir.path(), "Chat").unwrap();
        assert_eq!(found, bundled);
    }

    #[test]
    fn test_find_plist_stray_file_as_last_resort() {
        let dir = TempDir::new().unwrap();
        let stray = dir.path().join("somewhere/Info.plist");
        touch(&stray);

        let found = find_info_plist(dir.path(), "Chat").unwrap();
        assert_eq!(found, stray);
    }

    #[test]
    fn test_find_plist_missing_is_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            find_info_plist(dir.path(), "Chat"),
            Err(Error::MetadataNotFound(_))
        ));
    }
}
