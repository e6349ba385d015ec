//! # video-downloader
//!
//! Command-line front-end for `video_downloader_lib`.

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    cli::init_tracing(args.global.verbose);

    if let Err(e) = cli::run(args).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
