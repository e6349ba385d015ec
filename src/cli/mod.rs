//! Command-line front-end: a thin shell over [`Session`].

mod progress;

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use video_downloader_lib::{
    build_session, AppConfig, DownloadError, FormatDescriptor, Resolution, Session,
    SessionEvent, ToolManager,
};

use progress::JobBar;

/// Download videos in the quality you pick
#[derive(Parser)]
#[command(name = "video-downloader")]
#[command(version, about = "Resolve a video URL, pick a quality and download it")]
#[command(long_about = "Lists the qualities a site offers and downloads the chosen one.
Separate video and audio streams are merged with ffmpeg.

  video-downloader formats <URL>           # list qualities
  video-downloader download <URL> -q 720p  # download 720p
  video-downloader interactive             # paste URLs one after another
  video-downloader doctor                  # check yt-dlp and ffmpeg")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Config file (default: <config dir>/video-downloader/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the yt-dlp binary
    #[arg(long, global = true)]
    pub ytdlp: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(long, global = true)]
    pub ffmpeg: Option<PathBuf>,

    /// Where finished files go
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Proxy URL handed to yt-dlp (http://, socks5://)
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Netscape cookies.txt handed to yt-dlp
    #[arg(long, global = true)]
    pub cookies: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the available qualities of a URL
    Formats {
        url: String,
    },
    /// Download one quality of a URL
    Download {
        url: String,

        /// Format id, label prefix (e.g. 720p) or list position; default is the first
        #[arg(short, long)]
        quality: Option<String>,

        /// Output directory for this download
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep the separate video and audio files after merging
        #[arg(long)]
        keep_streams: bool,
    },
    /// Paste URLs and pick qualities in a loop
    Interactive,
    /// Show whether yt-dlp and ffmpeg are usable
    Doctor,
}

/// Logs go to stderr so they never mix with listings on stdout.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "video_downloader=debug,video_downloader_lib=debug"
    } else {
        "video_downloader=warn,video_downloader_lib=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let config = AppConfig::load(global.config.as_deref()).context("loading configuration")?;
    Ok(config
        .with_ytdlp_path(global.ytdlp.clone())
        .with_ffmpeg_path(global.ffmpeg.clone())
        .with_output_dir(global.output_dir.clone())
        .with_proxy(global.proxy.clone())
        .with_cookies_path(global.cookies.clone()))
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.global)?;
    debug!(?config, "[cli] configuration");

    match cli.command {
        Command::Formats { url } => {
            let mut session = build_session(&config);
            let resolution = resolve(&mut session, &url).await?;
            print_formats(&resolution);
            Ok(())
        }
        Command::Download {
            url,
            quality,
            output,
            keep_streams,
        } => {
            let keep = keep_streams || config.keep_streams;
            let config = config.with_keep_streams(keep);
            let mut session = build_session(&config);
            let resolution = resolve(&mut session, &url).await?;
            let descriptor = pick_format(&resolution, quality.as_deref())?;
            println!("{}: {}", resolution.title, descriptor.label);
            download(&mut session, &descriptor.id, output).await
        }
        Command::Interactive => interactive(&config).await,
        Command::Doctor => {
            doctor(&config);
            Ok(())
        }
    }
}

fn user_error(err: DownloadError) -> anyhow::Error {
    anyhow!(err.user_message())
}

async fn resolve(session: &mut Session, url: &str) -> Result<Resolution> {
    session.submit_url(url).map_err(user_error)?;
    eprintln!("Looking up {}...", url.trim());

    loop {
        tokio::select! {
            event = session.next_event() => match event {
                Some(SessionEvent::Resolved(resolution)) => return Ok(resolution),
                Some(SessionEvent::ResolveFailed(err)) => return Err(user_error(err)),
                Some(_) => continue,
                None => bail!("lookup ended without a result"),
            },
            _ = tokio::signal::ctrl_c() => {
                session.cancel().await;
                bail!("cancelled");
            }
        }
    }
}

fn print_formats(resolution: &Resolution) {
    println!("{}", resolution.title);
    for (i, format) in resolution.formats.iter().enumerate() {
        let marker = if i == 0 { " (recommended)" } else { "" };
        println!("  {:>2}. [{}] {}{}", i + 1, format.id, format.label, marker);
    }
}

/// Exact id first, then list position (1-based), then label prefix.
fn pick_format<'a>(resolution: &'a Resolution, query: Option<&str>) -> Result<&'a FormatDescriptor> {
    let Some(query) = query.map(str::trim).filter(|q| !q.is_empty()) else {
        return resolution
            .recommended()
            .ok_or_else(|| anyhow!("no formats to choose from"));
    };

    if let Some(found) = resolution.find(query) {
        return Ok(found);
    }

    if let Ok(position) = query.parse::<usize>() {
        if let Some(found) = position.checked_sub(1).and_then(|i| resolution.formats.get(i)) {
            return Ok(found);
        }
    }

    let wanted = query.to_lowercase();
    resolution
        .formats
        .iter()
        .find(|f| f.label.to_lowercase().starts_with(&wanted))
        .ok_or_else(|| anyhow!("no quality matches \"{}\"; run `formats` to list them", query))
}

async fn download(session: &mut Session, format_id: &str, output: Option<PathBuf>) -> Result<()> {
    session.select_format(format_id).map_err(user_error)?;
    if let Some(dir) = output {
        session.set_output_dir(dir).map_err(user_error)?;
    }
    session.start_download().map_err(user_error)?;

    let mut bar = JobBar::new();
    loop {
        tokio::select! {
            event = session.next_event() => match event {
                Some(SessionEvent::Stage(stage)) => bar.stage(stage),
                Some(SessionEvent::Progress(sample)) => bar.update(&sample),
                Some(SessionEvent::Completed(outcome)) => {
                    bar.finish(format!("Saved {}", outcome.output.display()));
                    for kept in &outcome.kept_streams {
                        println!("  kept {}", kept.display());
                    }
                    return Ok(());
                }
                Some(SessionEvent::DownloadFailed(err)) => {
                    bar.abandon("Failed".to_string());
                    return Err(user_error(err));
                }
                Some(SessionEvent::Resolved(_)) | Some(SessionEvent::ResolveFailed(_)) => continue,
                None => bail!("download ended without a result"),
            },
            _ = tokio::signal::ctrl_c() => {
                session.cancel().await;
                bar.abandon("Cancelled; partial data is left as .part files".to_string());
                bail!("cancelled");
            }
        }
    }
}

async fn prompt(
    lines: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    text: &str,
) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

async fn interactive(config: &AppConfig) -> Result<()> {
    let mut session = build_session(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(url) = prompt(&mut lines, "\nURL (empty to quit): ").await? else {
            return Ok(());
        };
        if url.is_empty() {
            return Ok(());
        }

        let resolution = match resolve(&mut session, &url).await {
            Ok(resolution) => resolution,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        print_formats(&resolution);

        let Some(answer) = prompt(&mut lines, "Pick a quality [1]: ").await? else {
            return Ok(());
        };
        let descriptor = match pick_format(&resolution, Some(&answer)) {
            Ok(descriptor) => descriptor.clone(),
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        // failures are reported and the loop goes on; the session keeps the resolution
        if let Err(e) = download(&mut session, &descriptor.id, None).await {
            eprintln!("{}", e);
        }
    }
}

fn doctor(config: &AppConfig) {
    let manager = ToolManager::new(config);
    for tool in manager.get_all_tools() {
        match (&tool.version, &tool.path) {
            (Some(version), Some(path)) => {
                println!("✓ {} {} ({})", tool.name, version, path.display())
            }
            (None, Some(path)) => {
                println!("✗ {} found at {} but did not run", tool.name, path.display());
                println!("    {}", tool.tool_type.install_hint());
            }
            _ => {
                println!("✗ {} not found", tool.name);
                println!("    {}", tool.tool_type.install_hint());
            }
        }
    }
    println!("Output directory: {}", config.output_dir.display());
}
