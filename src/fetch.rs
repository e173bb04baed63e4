//! Download-link resolution and artifact retrieval.
//!
//! The vendor page advertises the current installer through a styled
//! download button; the link is scraped from the first anchor carrying
//! the `download-button` class. The image itself is streamed to a
//! `.part` file and renamed once the transfer completes.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use tracing::warn;
use url::Url;

use crate::{Error, Result};

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>").expect("valid anchor regex"));
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)class\s*=\s*["']([^"']*)["']"#).expect("valid class regex"));
static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']*)["']"#).expect("valid href regex"));

/// Metadata the vendor exposes on the direct file link via HEAD.
#[derive(Debug, Clone, Default)]
pub struct HeadMetadata {
    pub md5: Option<String>,
    pub content_length: Option<String>,
    pub last_modified: Option<String>,
}

/// Build the shared HTTP client.
pub fn http_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("dmgpub/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

/// Extract the installer link from the vendor page HTML.
///
/// Takes the first `<a>` whose class list contains `download-button`
/// and resolves its `href` against the page URL, so relative links are
/// accepted.
pub fn resolve_download_url(html: &str, page_url: &Url) -> Result<Url> {
    for tag in ANCHOR_RE.find_iter(html) {
        let tag = tag.as_str();
        let Some(classes) = CLASS_RE.captures(tag) else {
            continue;
        };
        if !classes[1]
            .split_whitespace()
            .any(|class| class == "download-button")
        {
            continue;
        }
        let href = HREF_RE
            .captures(tag)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_default();
        if href.is_empty() {
            continue;
        }
        return Ok(page_url.join(&href)?);
    }
    Err(Error::LinkNotFound)
}

/// Fetch the vendor page and resolve the current download link.
pub async fn fetch_download_url(client: &reqwest::Client, page_url: &Url) -> Result<Url> {
    let response = client.get(page_url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "vendor page {} returned {}",
            page_url,
            response.status()
        )));
    }
    let html = response.text().await?;
    resolve_download_url(&html, page_url)
}

/// Read vendor metadata from a HEAD request on the direct file link.
///
/// Best effort: the headers feed the pre-download comparison and the
/// release notes, so a failure degrades to empty metadata instead of
/// aborting the run.
pub async fn head_metadata(client: &reqwest::Client, url: &Url) -> HeadMetadata {
    const ATTEMPTS: usize = 2;

    for attempt in 1..=ATTEMPTS {
        match client.head(url.clone()).send().await {
            Ok(response) if response.status().is_success() => {
                let header = |name: &str| {
                    response
                        .headers()
                        .get(name)
                        .and_then(|value| value.to_str().ok())
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                };
                return HeadMetadata {
                    md5: header("x-cos-meta-md5"),
                    content_length: header("content-length"),
                    last_modified: header("last-modified"),
                };
            }
            Ok(response) => {
                warn!("HEAD request returned {} (attempt {})", response.status(), attempt);
            }
            Err(e) => {
                warn!("HEAD request failed (attempt {}): {}", attempt, e);
            }
        }
        if attempt < ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    HeadMetadata::default()
}

/// Download `url` to `dest`, streaming through a `.part` file.
///
/// Single attempt; an HTTP failure or an empty body is fatal for the
/// run. The next scheduled invocation retries from scratch.
pub async fn download(client: &reqwest::Client, url: &Url, dest: &Path) -> Result<()> {
    let response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "{} returned {}",
            url,
            response.status()
        )));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let part_path = dest.with_extension("part");
    let mut file = File::create(&part_path)?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        written += chunk.len() as u64;
    }
    file.flush()?;

    if written == 0 {
        let _ = fs::remove_file(&part_path);
        return Err(Error::Download(format!("{} returned an empty body", url)));
    }

    fs::rename(&part_path, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://vendor.example.com/?t=mac").unwrap()
    }

    #[test]
    fn test_resolve_download_link() {
        let html = r#"
            <html><body>
            <a class="nav-link" href="/about">About</a>
            <a class="btn download-button" href="https://dldir.example.com/App-4.0.6.dmg">Download</a>
            </body></html>
        "#;
        let url = resolve_download_url(html, &page()).unwrap();
        assert_eq!(url.as_str(), "https://dldir.example.com/App-4.0.6.dmg");
    }

    #[test]
    fn test_resolve_takes_first_button() {
        let html = r#"
            <a class="download-button" href="/first.dmg">one</a>
            <a class="download-button" href="/second.dmg">two</a>
        "#;
        let url = resolve_download_url(html, &page()).unwrap();
        assert_eq!(url.path(), "/first.dmg");
    }

    #[test]
    fn test_resolve_relative_href() {
        let html = r#"<a class="download-button" href="downloads/App.dmg">dl</a>"#;
        let url = resolve_download_url(html, &page()).unwrap();
        assert_eq!(url.as_str(), "https://vendor.example.com/downloads/App.dmg");
    }

    #[test]
    fn test_resolve_missing_button() {
        let html = r#"<a class="other" href="/x.dmg">dl</a>"#;
        assert!(matches!(
            resolve_download_url(html, &page()),
            Err(Error::LinkNotFound)
        ));
    }

    #[test]
    fn test_resolve_ignores_button_without_href() {
        let html = r#"
            <a class="download-button">broken</a>
            <a class="download-button" href="/ok.dmg">dl</a>
        "#;
        let url = resolve_download_url(html, &page()).unwrap();
        assert_eq!(url.path(), "/ok.dmg");
    }

    #[test]
    fn test_class_must_match_exactly() {
        // "download-buttons" is a different class
        let html = r#"<a class="download-buttons" href="/x.dmg">dl</a>"#;
        assert!(resolve_download_url(html, &page()).is_err());
    }
}
