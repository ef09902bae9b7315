// MediaFetch - background network fetch and download engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use mediafetch_core::download::progress::TransferProgress;
use mediafetch_core::{
    download_to_file, fetch, AddOutcome, CancelFlag, DownloadQueue, EngineConfig, ReleaseInfo,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mediafetch-cli")]
#[command(about = "MediaFetch CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); defaults apply when missing
    #[arg(short, long, default_value = "mediafetch.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a small payload into memory and print it
    Fetch {
        url: String,
        /// Buffer size
        #[arg(short, long, default_value_t = 64 * 1024)]
        max_bytes: usize,
    },
    /// Stream a URL to a file
    Download { url: String, dest: PathBuf },
    /// Work with a download queue
    Queue {
        #[arg(value_enum)]
        kind: QueueKind,
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Download and install a release from its manifest
    Update {
        manifest_url: String,
        /// Use the built-in downloader instead of the helper program
        #[arg(long)]
        no_helper: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum QueueKind {
    Podcast,
    Audio,
}

#[derive(Subcommand)]
enum QueueAction {
    /// Add an item
    Add {
        id: String,
        title: String,
        /// Source URL; derived from the id when omitted
        #[arg(long)]
        url: Option<String>,
    },
    /// Show queued items
    List,
    /// Drain the queue in the foreground
    Run,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Fetch { url, max_bytes } => {
            let result = fetch(&url, max_bytes, &config.http)?;
            println!("URL:          {}", result.final_url);
            println!("Content-Type: {}", result.content_type.as_deref().unwrap_or("-"));
            println!("Length:       {}{}", result.len(), if result.truncated { " (truncated)" } else { "" });
            println!();
            println!("{}", result.text());
        }
        Commands::Download { url, dest } => {
            let bytes = download_to_file(&url, &dest, print_progress, &CancelFlag::new(), &config.http)?;
            println!();
            println!("Wrote {} to {}", TransferProgress::bytes_string(bytes), dest.display());
        }
        Commands::Queue { kind, action } => {
            let queue = match kind {
                QueueKind::Podcast => DownloadQueue::podcast(&config),
                QueueKind::Audio => DownloadQueue::audio(&config),
            };
            queue.load()?;
            match action {
                QueueAction::Add { id, title, url } => {
                    let url = url.unwrap_or_else(|| id.clone());
                    match queue.add(&id, &title, &url)? {
                        AddOutcome::Added => println!("Queued {}", id),
                        AddOutcome::AlreadyQueued => println!("{} is already queued", id),
                    }
                }
                QueueAction::List => {
                    for item in queue.items() {
                        println!("{:?}\t{}\t{}", item.status, item.id, item.title);
                    }
                }
                QueueAction::Run => run_queue(&queue)?,
            }
        }
        Commands::Update { manifest_url, no_helper } => {
            let mut config = config;
            if no_helper {
                config.update.use_helper = false;
            }
            let release = ReleaseInfo::fetch(&manifest_url, &config.http)?;
            let version = release.version.clone();
            let url = release.url.clone();
            let queue = DownloadQueue::self_update(&config, release);
            queue.add(&version, &format!("Release {}", version), &url)?;
            run_queue(&queue)?;
        }
    }

    Ok(())
}

fn run_queue(queue: &DownloadQueue) -> anyhow::Result<()> {
    if !queue.start()? {
        println!("Nothing to download");
        return Ok(());
    }

    while queue.is_running() {
        let status = queue.status();
        if let Some(title) = &status.current_title {
            print!(
                "\r[{}/{}] {:<40.40} {:>3}% {}",
                status.current_index,
                status.total_items,
                title,
                status.progress_percent,
                TransferProgress::bytes_string(status.bytes_written)
            );
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    queue.join();

    let status = queue.status();
    println!();
    println!("Completed: {}  Failed: {}", status.completed_count, status.failed_count);
    if status.failed_count > 0 {
        bail!(
            "last error: {}",
            status.last_error.unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(())
}

fn print_progress(progress: &TransferProgress) {
    match progress.percent() {
        Some(percent) => print!(
            "\r{:>3}% {} {}",
            percent,
            TransferProgress::bytes_string(progress.bytes_written),
            progress.speed_string()
        ),
        None => print!(
            "\r{} {}",
            TransferProgress::bytes_string(progress.bytes_written),
            progress.speed_string()
        ),
    }
    let _ = std::io::stdout().flush();
}
