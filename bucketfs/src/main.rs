use bucketfs::cadapter::localfs::LocalFsBackend;
use bucketfs::cadapter::s3::{S3Backend, S3Config};
use bucketfs::{Bucket, Handle, UNBOUNDED};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use futures::stream::BoxStream;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "bucketfs")]
#[command(about = "Browse and edit an object store bucket like a file tree", long_about = None)]
struct Cli {
    /// Bucket name
    #[arg(long, env = "BUCKETFS_BUCKET", default_value = "bucketfs")]
    bucket: String,

    /// Serve the bucket from this local directory instead of S3
    #[arg(long, env = "BUCKETFS_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List the direct children of a directory")]
    Ls {
        #[arg(value_name = "DIR", default_value = "")]
        dir: String,
    },
    #[command(about = "Walk a directory tree level by level")]
    Walk {
        #[arg(value_name = "DIR", default_value = "")]
        dir: String,
        #[arg(long, default_value_t = 0)]
        min_depth: usize,
        /// Unbounded when omitted
        #[arg(long)]
        max_depth: Option<usize>,
    },
    #[command(about = "Print the value of a key")]
    Cat {
        #[arg(value_name = "KEY")]
        key: String,
    },
    #[command(about = "Store a local file under a key")]
    Put {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    #[command(about = "Delete a key")]
    Rm {
        #[arg(value_name = "KEY")]
        key: String,
    },
    #[command(about = "Show etag, size and modification time of a key")]
    Stat {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

async fn open_bucket(cli: &Cli) -> Bucket {
    match &cli.local_root {
        Some(root) => Bucket::new(cli.bucket.clone(), LocalFsBackend::new(root)),
        None => {
            let backend = S3Backend::new(cli.bucket.clone(), S3Config::from_env()).await;
            Bucket::new(cli.bucket.clone(), backend)
        }
    }
}

fn directory(bucket: &Bucket, dir: &str) -> Result<Handle, BoxError> {
    if dir.is_empty() {
        return Ok(bucket.root());
    }
    Ok(bucket.root().get_file(&format!("{}/", dir.trim_end_matches('/')))?)
}

async fn print_tree(mut entries: BoxStream<'static, bucketfs::Result<Handle>>) -> Result<(), BoxError> {
    while let Some(entry) = entries.try_next().await? {
        if entry.is_directory().await? {
            println!("{}/", entry.absolute_name());
        } else {
            println!("{}", entry.absolute_name());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    let bucket = open_bucket(&cli).await;

    match &cli.command {
        Commands::Ls { dir } => print_tree(directory(&bucket, dir)?.walk_depth(1)).await?,
        Commands::Walk {
            dir,
            min_depth,
            max_depth,
        } => {
            let start = directory(&bucket, dir)?;
            let max_depth = max_depth.unwrap_or(UNBOUNDED);
            print_tree(start.walk_bounded(*min_depth, max_depth)).await?
        }
        Commands::Cat { key } => {
            let value = bucket.root().get_file(key)?.get_value().await?;
            print!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Put { key, file } => {
            let handle = bucket.root().get_file(key)?;
            handle.set_value_as_file(file).await?;
            println!("{} {}", handle.get_etag().await?, handle.absolute_name());
        }
        Commands::Rm { key } => bucket.root().get_file(key)?.delete().await?,
        Commands::Stat { key } => {
            let handle = bucket.file(key).await?;
            println!("key:           {}", handle.absolute_name());
            println!("etag:          {}", handle.get_etag().await?);
            println!("size:          {}", handle.get_size().await?);
            println!("last modified: {}", handle.get_last_modified().await?);
        }
    }
    Ok(())
}
