//! Manifest rendering, release-body parsing, and the publish decision.
//!
//! The manifest is the four-line text record published next to every
//! artifact. The release notes body carries the same keys in `- Key:
//! Value` form; later runs parse that body back to learn the latest
//! published version and digests.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

use crate::fetch::HeadMetadata;

/// The text record accompanying a published artifact.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub dest_version: String,
    pub sha256: String,
    pub update_time: DateTime<Utc>,
    pub download_from: String,
}

impl Manifest {
    /// Render the manifest in its exact four-line wire form.
    pub fn render(&self) -> String {
        format!(
            "DestVersion: {}\nSha256: {}\nUpdateTime: {} (UTC)\nDownloadFrom: {}\n",
            self.dest_version,
            self.sha256,
            self.update_time.format("%Y-%m-%d %H:%M:%S"),
            self.download_from,
        )
    }

    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, self.render())
    }
}

/// Parse `Key: Value` lines from a release body.
///
/// List markers (`- `) in front of keys are stripped so the notes body
/// and the manifest file parse the same way. Lines without a colon are
/// ignored.
pub fn parse_release_body(body: &str) -> HashMap<String, String> {
    let mut info = HashMap::new();
    for line in body.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim_start_matches(['-', ' ']).trim();
        if key.is_empty() {
            continue;
        }
        info.insert(key.to_string(), value.trim().to_string());
    }
    info
}

/// Decide the release tag for a new artifact.
///
/// Re-publishing the same version string with different content (a
/// silent patch release) gets a UTC date suffix so the tag stays
/// unique.
pub fn release_tag(version: &str, latest_version: Option<&str>, today: NaiveDate) -> String {
    match latest_version {
        Some(latest) if latest == version => {
            format!("{}_{}", version, today.format("%Y%m%d"))
        }
        _ => version.to_string(),
    }
}

/// Build the human-readable release notes body.
pub fn build_release_notes(
    product: &str,
    version: &str,
    download_from: &str,
    head: &HeadMetadata,
    sha256: &str,
) -> String {
    let mut lines = vec![
        format!("{} automatic release", product),
        String::new(),
        "Download and integrity details are below.".to_string(),
        String::new(),
        "Release details".to_string(),
        format!("- DestVersion: {}", version),
        String::new(),
        "Source and checksums".to_string(),
        format!("- DownloadFrom: {}", download_from),
        format!("- Md5: {}", head.md5.as_deref().unwrap_or_default()),
        format!("- Sha256: {}", sha256),
    ];
    if let Some(ref size) = head.content_length {
        lines.push(format!("- ContentLength: {}", size));
    }
    if let Some(ref modified) = head.last_modified {
        lines.push(format!("- LastModified: {}", modified));
    }
    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manifest_wire_format() {
        let manifest = Manifest {
            dest_version: "4.0.6".into(),
            sha256: "a".repeat(64),
            update_time: Utc.with_ymd_and_hms(2026, 8, 5, 12, 30, 45).unwrap(),
            download_from: "https://dldir.example.com/App.dmg".into(),
        };

        assert_eq!(
            manifest.render(),
            format!(
                "DestVersion: 4.0.6\n\
                 Sha256: {}\n\
                 UpdateTime: 2026-08-05 12:30:45 (UTC)\n\
                 DownloadFrom: https://dldir.example.com/App.dmg\n",
                "a".repeat(64)
            )
        );
    }

    #[test]
    fn test_manifest_roundtrips_through_parser() {
        let manifest = Manifest {
            dest_version: "4.0.6".into(),
            sha256: "deadbeef".into(),
            update_time: Utc.with_ymd_and_hms(2026, 8, 5, 0, 0, 0).unwrap(),
            download_from: "https://dldir.example.com/App.dmg".into(),
        };
        let info = parse_release_body(&manifest.render());
        assert_eq!(info.get("DestVersion").unwrap(), "4.0.6");
        assert_eq!(info.get("Sha256").unwrap(), "deadbeef");
    }

    #[test]
    fn test_parse_release_body_strips_list_markers() {
        let body = "Release details\n- DestVersion: 4.0.6\n- Sha256: abc\n\nnot a field";
        let info = parse_release_body(body);
        assert_eq!(info.get("DestVersion").unwrap(), "4.0.6");
        assert_eq!(info.get("Sha256").unwrap(), "abc");
        assert!(!info.contains_key("not a field"));
    }

    #[test]
    fn test_parse_release_body_keeps_colons_in_values() {
        let info = parse_release_body("- DownloadFrom: https://host/path");
        assert_eq!(info.get("DownloadFrom").unwrap(), "https://host/path");
    }

    #[test]
    fn test_tag_for_new_version() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        assert_eq!(release_tag("4.0.6", Some("4.0.5"), today), "4.0.6");
        assert_eq!(release_tag("4.0.6", None, today), "4.0.6");
    }

    #[test]
    fn test_tag_for_silent_patch_release() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        assert_eq!(release_tag("4.0.6", Some("4.0.6"), today), "4.0.6_20260805");
    }

    #[test]
    fn test_release_notes_parse_back() {
        let head = HeadMetadata {
            md5: Some("f00d".into()),
            content_length: Some("52428800".into()),
            last_modified: Some("Tue, 04 Aug 2026 08:00:00 GMT".into()),
        };
        let notes =
            build_release_notes("ChatMac", "4.0.6", "https://host/App.dmg", &head, "cafe");
        let info = parse_release_body(&notes);
        assert_eq!(info.get("DestVersion").unwrap(), "4.0.6");
        assert_eq!(info.get("Md5").unwrap(), "f00d");
        assert_eq!(info.get("Sha256").unwrap(), "cafe");
        assert_eq!(info.get("ContentLength").unwrap(), "52428800");
    }

    #[test]
    fn test_release_notes_without_head_metadata() {
        let notes = build_release_notes(
            "ChatMac",
            "4.0.6",
            "https://host/App.dmg",
            &HeadMetadata::default(),
            "cafe",
        );
        let info = parse_release_body(&notes);
        // Md5 is present but empty, so later runs fall back to Sha256
        assert_eq!(info.get("Md5").unwrap(), "");
        assert!(!notes.contains("ContentLength"));
    }
}
