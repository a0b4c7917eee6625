use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use treesync_cli::{commands, RemoteOptions};
use treesync_config::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_INDEX_FILE, DEFAULT_WORKERS, HASH_ENV_VAR,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Digest algorithm: md5 (default) or xx
    #[arg(long, global = true, env = HASH_ENV_VAR)]
    hash: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a directory and write its index into it
    Index {
        path: Utf8PathBuf,
        #[arg(short, long, default_value = DEFAULT_INDEX_FILE)]
        index: String,
        /// Also list every digest
        #[arg(long)]
        print: bool,
    },
    /// Show what `sync` would change, without changing anything
    Check {
        source: String,
        path: Utf8PathBuf,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Make a directory match a published index
    Sync {
        source: String,
        path: Utf8PathBuf,
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        threads: usize,
        /// Stage changed files and swap them in only after every download
        #[arg(long, alias = "delay-changes")]
        atomic: bool,
        /// Command to run after a sync that changed something
        #[arg(long)]
        exec: Option<String>,
    },
}

#[derive(Args)]
struct RemoteArgs {
    #[arg(short, long, default_value = DEFAULT_INDEX_FILE)]
    index: String,
    /// PEM client certificate for mutual TLS
    #[arg(long, requires = "key")]
    cert: Option<Utf8PathBuf>,
    /// PEM private key for --cert
    #[arg(long, requires = "cert")]
    key: Option<Utf8PathBuf>,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    timeout: u64,
}

impl RemoteArgs {
    fn into_options(self, source: String) -> RemoteOptions {
        RemoteOptions {
            source,
            index_name: self.index,
            timeout: Duration::from_secs(self.timeout),
            cert: self.cert,
            key: self.key,
        }
    }
}

async fn run(command: Commands, hash: Option<String>) -> anyhow::Result<()> {
    let algorithm = treesync_cli::digest_algorithm(hash.as_deref());
    match command {
        Commands::Index { path, index, print } => {
            commands::cmd_index(path, index, print, algorithm).await?;
        }
        Commands::Check {
            source,
            path,
            remote,
        } => {
            commands::cmd_check(remote.into_options(source), path, algorithm).await?;
        }
        Commands::Sync {
            source,
            path,
            remote,
            threads,
            atomic,
            exec,
        } => {
            commands::cmd_sync(
                remote.into_options(source),
                path,
                algorithm,
                threads,
                atomic,
                exec,
            )
            .await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: logging unavailable: {e}");
    }

    match run(cli.command, cli.hash).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(treesync_cli::exit_code(&e))
        }
    }
}
