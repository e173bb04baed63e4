//! dmgpub: vendor DMG watcher and release publisher
//!
//! This crate provides the building blocks for a periodic job that:
//! - Resolves and downloads the current macOS installer image from a
//!   vendor page
//! - Extracts a version identifier from the bundled `Info.plist`
//! - Compares the image's SHA-256 against the latest published release
//! - Publishes the image and a manifest as a new GitHub release when
//!   the content changed

pub mod checksum;
pub mod error;
pub mod fetch;
pub mod image;
pub mod manifest;
pub mod release;
pub mod version;

pub use error::{Error, Result};
pub use manifest::Manifest;
pub use version::{VersionRecord, VersionSource};
