//! dmgpub CLI
//!
//! Command-line interface for the vendor DMG watcher: a full publish
//! run, a download-free check, and a local image inspector.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use url::Url;

use dmgpub::{
    checksum,
    fetch::{self, HeadMetadata},
    image::{self, MountedImage},
    manifest::{self, Manifest},
    release::GhClient,
    version, Result,
};

const DEFAULT_PAGE_URL: &str = "https://mac.weixin.qq.com/?t=mac&lang=zh_CN";
const DEFAULT_APP_NAME: &str = "WeChat";
const DEFAULT_PRODUCT: &str = "WeChatMac";

#[derive(Parser)]
#[command(name = "dmgpub")]
#[command(about = "Vendor DMG watcher and release publisher", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Vendor page to scrape for the download button
    #[arg(long, env = "DMGPUB_PAGE_URL", default_value = DEFAULT_PAGE_URL)]
    page_url: Url,

    /// Direct download URL (skips page scraping)
    #[arg(long, env = "DMGPUB_URL")]
    url: Option<Url>,

    /// App bundle name expected inside the image
    #[arg(long, env = "DMGPUB_APP_NAME", default_value = DEFAULT_APP_NAME)]
    app_name: String,

    /// Product name used in artifact names and release titles
    #[arg(long, env = "DMGPUB_PRODUCT", default_value = DEFAULT_PRODUCT)]
    product: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the vendor site and publish a release when the build changed
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Repository to publish to (OWNER/REPO); defaults to the
        /// repository of the working directory
        #[arg(long, env = "DMGPUB_REPO")]
        repo: Option<String>,

        /// Publish even when the checksum matches the latest release
        #[arg(long, env = "DMGPUB_FORCE")]
        force: bool,

        /// Keep the run's temp directory for debugging
        #[arg(long)]
        keep_temp: bool,
    },

    /// Compare vendor metadata against the latest release without downloading
    Check {
        #[command(flatten)]
        source: SourceArgs,

        /// Repository to read release history from (OWNER/REPO)
        #[arg(long, env = "DMGPUB_REPO")]
        repo: Option<String>,
    },

    /// Print the version record and checksum of a local disk image
    Inspect {
        /// Path to the disk image
        dmg: PathBuf,

        /// App bundle name expected inside the image
        #[arg(long, default_value = DEFAULT_APP_NAME)]
        app_name: String,
    },
}

fn setup_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            source,
            repo,
            force,
            keep_temp,
        } => cmd_run(source, repo, force, keep_temp).await,

        Commands::Check { source, repo } => cmd_check(source, repo).await,

        Commands::Inspect { dmg, app_name } => cmd_inspect(&dmg, &app_name),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

/// Resolve the download link: explicit URL wins, otherwise the vendor
/// page is scraped.
async fn resolve_source(client: &reqwest::Client, source: &SourceArgs) -> Result<Url> {
    match source.url {
        Some(ref url) => Ok(url.clone()),
        None => {
            info!("Resolving download link from {}", source.page_url);
            fetch::fetch_download_url(client, &source.page_url).await
        }
    }
}

async fn cmd_run(
    source: SourceArgs,
    repo: Option<String>,
    force: bool,
    keep_temp: bool,
) -> Result<()> {
    GhClient::check_gh()?;
    let client = fetch::http_client()?;
    let gh = GhClient::new(repo);

    let url = resolve_source(&client, &source).await?;
    info!("Download link: {}", url);

    let head = fetch::head_metadata(&client, &url).await;
    info!(
        "HEAD metadata: md5={}, size={}, last_modified={}",
        head.md5.as_deref().unwrap_or("n/a"),
        head.content_length.as_deref().unwrap_or("n/a"),
        head.last_modified.as_deref().unwrap_or("n/a"),
    );

    let latest = gh
        .latest_release()
        .map(|release| manifest::parse_release_body(&release.body))
        .unwrap_or_default();

    // The vendor advertises an MD5 on the direct file link; an
    // unchanged build is detected without downloading it.
    let latest_md5 = latest.get("Md5").filter(|v| !v.is_empty());
    if let (Some(remote), Some(known)) = (head.md5.as_deref(), latest_md5) {
        if remote == known.as_str() {
            if force {
                info!("MD5 matches the latest release, but force publish is enabled");
            } else {
                info!("No new build detected by MD5. Skipping download.");
                return Ok(());
            }
        }
    }

    let tmp = tempfile::Builder::new().prefix("dmgpub-").tempdir()?;
    let result =
        download_and_publish(&client, &gh, &source, &url, &head, &latest, force, tmp.path()).await;

    if keep_temp {
        let kept = tmp.keep();
        info!("Keeping temp directory {}", kept.display());
    }
    result
}

#[allow(clippy::too_many_arguments)]
async fn download_and_publish(
    client: &reqwest::Client,
    gh: &GhClient,
    source: &SourceArgs,
    url: &Url,
    head: &HeadMetadata,
    latest: &HashMap<String, String>,
    force: bool,
    workdir: &Path,
) -> Result<()> {
    let latest_version = latest
        .get("DestVersion")
        .map(String::as_str)
        .filter(|v| !v.is_empty());
    let latest_sha256 = latest
        .get("Sha256")
        .map(String::as_str)
        .filter(|v| !v.is_empty());

    info!("Downloading image...");
    let dmg_path = workdir.join(format!("{}.dmg", source.product));
    fetch::download(client, url, &dmg_path).await?;
    info!("Downloaded image to {}", dmg_path.display());

    let record = {
        // Scoped so the image is detached before hashing and publishing.
        let image = MountedImage::open(&dmg_path, workdir)?;
        let plist_path = image::find_info_plist(image.root(), &source.app_name)?;
        version::read_bundle_version(&plist_path, latest_version)?
    };
    info!("Detected version: {}", record.version);

    let sha256 = checksum::sha256sum(&dmg_path)?;
    info!("Computed SHA256: {}", sha256);

    if checksum::matches_latest(&sha256, latest_sha256) {
        if force {
            info!("SHA256 matches the latest release, but force publish is enabled");
        } else {
            info!("Latest release already has this content. Nothing to publish.");
            return Ok(());
        }
    }

    let tag = manifest::release_tag(&record.version, latest_version, Utc::now().date_naive());

    let final_dmg = workdir.join(format!("{}-{}.dmg", source.product, tag));
    fs::rename(&dmg_path, &final_dmg)?;

    let manifest = Manifest {
        dest_version: record.version.clone(),
        sha256: sha256.clone(),
        update_time: Utc::now(),
        download_from: url.to_string(),
    };
    let sha_file = workdir.join(format!("{}-{}.dmg.sha256", source.product, tag));
    manifest.write_to(&sha_file)?;

    let notes = manifest::build_release_notes(
        &source.product,
        &record.version,
        url.as_str(),
        head,
        &sha256,
    );
    let notes_file = workdir.join("release_notes.txt");
    fs::write(&notes_file, notes)?;

    let release_tag = format!("v{}", tag);
    let title = format!("{} {}", source.product, tag);
    info!("Creating release {}...", release_tag);
    gh.create_release(&release_tag, &title, &[&final_dmg, &sha_file], &notes_file)?;
    info!("Release {} created", release_tag);

    Ok(())
}

async fn cmd_check(source: SourceArgs, repo: Option<String>) -> Result<()> {
    let client = fetch::http_client()?;
    let url = resolve_source(&client, &source).await?;
    println!("Download link: {}", url);

    let head = fetch::head_metadata(&client, &url).await;

    let Some(release) = GhClient::new(repo).latest_release() else {
        println!("No release history. The next run will publish the current build.");
        return Ok(());
    };
    println!("Latest release: {}", release.tag_name);

    let latest = manifest::parse_release_body(&release.body);
    if let Some(version) = latest.get("DestVersion") {
        println!("Latest published version: {}", version);
    }

    let latest_md5 = latest.get("Md5").filter(|v| !v.is_empty());
    match (head.md5.as_deref(), latest_md5) {
        (Some(remote), Some(known)) if remote == known.as_str() => {
            println!("Up to date (MD5 {})", remote);
        }
        (Some(remote), Some(known)) => {
            println!(
                "Update pending: vendor MD5 {} differs from published {}",
                remote, known
            );
        }
        _ => {
            println!("Vendor MD5 unavailable; a full run is needed to compare by SHA256.");
        }
    }

    Ok(())
}

fn cmd_inspect(dmg: &Path, app_name: &str) -> Result<()> {
    let tmp = tempfile::Builder::new().prefix("dmgpub-").tempdir()?;

    let record = {
        let image = MountedImage::open(dmg, tmp.path())?;
        let plist_path = image::find_info_plist(image.root(), app_name)?;
        version::read_bundle_version(&plist_path, None)?
    };
    let sha256 = checksum::sha256sum(dmg)?;

    println!(
        "Version: {}{}",
        record.version,
        if record.is_precise() { "" } else { " (synthesized)" }
    );
    println!("Sha256: {}", sha256);
    Ok(())
}
