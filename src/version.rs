//! Version extraction from the application bundle descriptor.
//!
//! `CFBundleShortVersionString` gives the precise dotted version. When
//! the vendor ships a build without it, a degraded identifier of the
//! form `<major>+build.<buildNumber>` is synthesized from
//! `CFBundleVersion` so releases keep ordering by build number. The
//! major component comes from the last published version.

use std::path::Path;

use plist::Value;
use tracing::warn;

use crate::{Error, Result};

/// Where a version identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// `CFBundleShortVersionString` was present.
    ShortVersion,
    /// Synthesized from `CFBundleVersion` and the last published major.
    Synthesized,
}

/// The extracted or synthesized version identifier for an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: String,
    pub source: VersionSource,
}

impl VersionRecord {
    pub fn is_precise(&self) -> bool {
        self.source == VersionSource::ShortVersion
    }
}

/// Read the bundle descriptor and produce a version record.
///
/// `last_version` is the `DestVersion` of the most recent published
/// manifest, consulted only when the precise version must be
/// synthesized.
pub fn read_bundle_version(plist_path: &Path, last_version: Option<&str>) -> Result<VersionRecord> {
    let value = Value::from_file(plist_path)?;
    let dict = value.as_dictionary().ok_or_else(|| {
        Error::MetadataNotFound(format!(
            "{} is not a property-list dictionary",
            plist_path.display()
        ))
    })?;

    let field = |key: &str| {
        dict.get(key)
            .and_then(Value::as_string)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    from_fields(
        field("CFBundleShortVersionString"),
        field("CFBundleVersion"),
        last_version,
    )
}

/// Decide the version record from the two descriptor fields.
pub fn from_fields(
    short_version: Option<String>,
    build_number: Option<String>,
    last_version: Option<&str>,
) -> Result<VersionRecord> {
    if let Some(version) = short_version {
        return Ok(VersionRecord {
            version,
            source: VersionSource::ShortVersion,
        });
    }

    if let Some(build) = build_number {
        let major = match last_version.and_then(major_component) {
            Some(major) => major,
            None => {
                warn!("no published version to take the major component from, using 0");
                "0".to_string()
            }
        };
        return Ok(VersionRecord {
            version: format!("{}+build.{}", major, build),
            source: VersionSource::Synthesized,
        });
    }

    Err(Error::MetadataNotFound(
        "neither CFBundleShortVersionString nor CFBundleVersion is set".into(),
    ))
}

/// Leading numeric component of a dotted version, e.g. `4.0.6` -> `4`.
fn major_component(version: &str) -> Option<String> {
    let digits: String = version
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}
