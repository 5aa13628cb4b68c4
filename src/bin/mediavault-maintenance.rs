use std::path::PathBuf;

use clap::{Parser, Subcommand};

use mediavault::{DirectoryRoots, Mediavault, MediavaultConfig, MediavaultError};

/// Maintenance commands for a local media store
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Directory for application data
    #[clap(long, value_name = "PATH", required = true)]
    data_dir: PathBuf,

    /// Directory for application logs
    #[clap(long, value_name = "PATH", required = true)]
    logs_dir: PathBuf,

    /// Parent of the uploads/cache/tmp media directories instead of the
    /// platform locations (also read from MEDIAVAULT_MEDIA_ROOT)
    #[clap(long, value_name = "PATH")]
    media_root: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Demote interrupted uploads and drop unrecoverable records
    Reconcile,
    /// Print the allocated size of the uploads and cache directories
    Size,
    /// Remove upload files not referenced by media attached to a blog
    CleanUnused,
    /// Remove local copies of media that already have a remote copy
    CleanCached,
    /// Empty the cache directory and remove unused upload files
    ClearCache,
    /// List failed media eligible for another upload attempt
    RetryCandidates {
        /// Apply the automated retry cap
        #[clap(long)]
        automated: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), MediavaultError> {
    // A missing .env is fine; the process environment still applies
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let mut config = MediavaultConfig::new(&args.data_dir, &args.logs_dir);
    let media_root = args
        .media_root
        .or_else(|| std::env::var_os("MEDIAVAULT_MEDIA_ROOT").map(PathBuf::from));
    if let Some(root) = media_root {
        config = config.with_directory_roots(DirectoryRoots::under(&root));
    }

    let mediavault = match Mediavault::new(config).await {
        Ok(mediavault) => mediavault,
        Err(err) => {
            eprintln!("Failed to open media store: {}", err);
            std::process::exit(1);
        }
    };

    match args.command {
        Command::Reconcile => {
            let summary = mediavault.reconcile().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).map_err(anyhow::Error::from)?
            );
        }
        Command::Size => match mediavault.calculate_local_store_size().await {
            Some(bytes) => println!("{}", bytes),
            None => {
                eprintln!("Could not measure any media directory");
                std::process::exit(1);
            }
        },
        Command::CleanUnused => {
            let removed = mediavault.clear_unused_files().await?;
            println!("Removed {} unused file(s)", removed);
        }
        Command::CleanCached => {
            let removed = mediavault.clear_cached_files_available_remotely().await?;
            println!("Removed {} file(s) available remotely", removed);
        }
        Command::ClearCache => {
            let removed = mediavault.clear_all_cache_files().await?;
            println!("Removed {} cached file(s)", removed);
        }
        Command::RetryCandidates { automated } => {
            let media = mediavault.media_for_retry(automated).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&media).map_err(anyhow::Error::from)?
            );
        }
    }

    Ok(())
}
