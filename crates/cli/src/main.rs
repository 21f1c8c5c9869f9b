// ABOUTME: CLI binary for rssdump: archives a feed into a directory or uploads a finished archive.
// ABOUTME: Thin wrapper over rssdump-archive with logging setup, Ctrl-C handling and exit codes.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rssdump_archive::{
    default_output_dir_now, find_recent_dump, read_keys, Archiver, ItemFormat, UploadConfig,
    UploadOutcome, Uploader, DEFAULT_SEARCH_ENDPOINT, RECENT_DAYS,
};
use rssdump_feed::standardize_url;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "rssdump")]
#[command(about = "Archive RSS/Atom feeds with all their media", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a feed and write it, its items and its media into an archive directory
    Archive {
        /// Feed URL (https:// is assumed when no scheme is given)
        url: String,

        /// Archive directory (default: <host>_<YYYYMMDD_HHMMSS>)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Item file format
        #[arg(short = 'f', long = "format", value_enum, default_value_t = FormatArg::Json)]
        format: FormatArg,

        /// Skip the check for a recent dump in the Internet Archive
        #[arg(long = "no-remote-check")]
        no_remote_check: bool,

        /// Override the User-Agent sent with every request
        #[arg(long = "user-agent")]
        user_agent: Option<String>,

        /// Record every HTTP exchange into feed.warc.gz
        #[arg(long = "warc")]
        warc: bool,

        /// Keep .ico files as they are instead of converting them to PNG
        #[arg(long = "no-icon-convert")]
        no_icon_convert: bool,
    },

    /// Upload a finished archive directory to the Internet Archive
    Upload {
        /// Archive directory created by `rssdump archive`
        dir: PathBuf,

        /// File with the access key and the secret key on two lines
        #[arg(long = "keysfile")]
        keysfile: Option<PathBuf>,

        /// Target collection
        #[arg(long = "collection", default_value = rssdump_archive::upload::DEFAULT_COLLECTION)]
        collection: String,

        /// Delete the archive directory after a successful upload
        #[arg(long = "delete")]
        delete: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Json,
    Md,
}

impl From<FormatArg> for ItemFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ItemFormat::Json,
            FormatArg::Md => ItemFormat::Markdown,
        }
    }
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = tokio::select! {
        result = run(cli.command) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Archive {
            url,
            output,
            format,
            no_remote_check,
            user_agent,
            warc,
            no_icon_convert,
        } => {
            let feed_url = standardize_url(&url).with_context(|| format!("invalid feed URL {:?}", url))?;

            let mut builder = Archiver::builder()
                .item_format(format.into())
                .capture(warc)
                .convert_icons(!no_icon_convert);
            if let Some(user_agent) = user_agent {
                builder = builder.user_agent(user_agent);
            }
            let archiver = builder.build();

            if !no_remote_check && !confirm_despite_remote_dump(&archiver, &feed_url).await? {
                return Ok(());
            }

            let root = output.unwrap_or_else(|| default_output_dir_now(&feed_url));
            let summary = archiver.run(&feed_url, &root).await?;
            print!("{}", summary);
            Ok(())
        }

        Command::Upload {
            dir,
            keysfile,
            collection,
            delete,
        } => {
            let keys_path = keysfile
                .or_else(UploadConfig::default_keys_path)
                .ok_or_else(|| anyhow!("no keys file given and no home directory found"))?;
            let (access, secret) = read_keys(&keys_path)?;

            let mut config = UploadConfig::new(dir.clone(), access, secret);
            config.collection = collection;
            config.delete_after_upload = delete;

            match Uploader::new(config).upload().await? {
                UploadOutcome::AlreadyUploaded => {
                    println!(
                        "{} has already been uploaded; remove {} to upload it again.",
                        dir.display(),
                        rssdump_archive::upload::UPLOADED_MARK
                    );
                }
                UploadOutcome::Uploaded {
                    remote_identifier,
                    uploaded,
                    skipped,
                } => {
                    println!(
                        "Uploaded {} files ({} already present): https://archive.org/details/{}",
                        uploaded, skipped, remote_identifier
                    );
                }
            }
            Ok(())
        }
    }
}

/// `false` when a recent dump exists and the user declines to continue.
async fn confirm_despite_remote_dump(archiver: &Archiver, feed_url: &str) -> Result<bool> {
    let found = match find_recent_dump(
        archiver.fetcher().as_ref(),
        DEFAULT_SEARCH_ENDPOINT,
        feed_url,
        RECENT_DAYS,
    )
    .await
    {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "remote check failed, continuing");
            return Ok(true);
        }
    };
    let Some(item) = found else {
        return Ok(true);
    };

    println!("Found an existing dump at the Internet Archive: {}", item.details_url());
    ask_to_continue(io::BufReader::new(io::stdin())).await
}

/// Asks on stdout and reads the answer off the async runtime; only `y` continues.
async fn ask_to_continue<R>(mut input: R) -> Result<bool>
where
    R: BufRead + Send + 'static,
{
    let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("Continue local dump anyway? (y/N) ");
        io::stdout().flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(answer)
    })
    .await??;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn only_yes_continues() {
        assert!(ask_to_continue(Cursor::new("y\n")).await.unwrap());
        assert!(ask_to_continue(Cursor::new(" Y \n")).await.unwrap());
        assert!(!ask_to_continue(Cursor::new("n\n")).await.unwrap());
        assert!(!ask_to_continue(Cursor::new("yes\n")).await.unwrap());
        assert!(!ask_to_continue(Cursor::new("")).await.unwrap());
    }

    #[test]
    fn format_argument_maps_to_item_format() {
        let cli = Cli::try_parse_from(["rssdump", "archive", "example.com", "--format", "md"]).unwrap();
        let Command::Archive { format, .. } = cli.command else {
            panic!("expected archive");
        };
        assert_eq!(ItemFormat::from(format), ItemFormat::Markdown);
        assert!(Cli::try_parse_from(["rssdump", "archive", "example.com", "-f", "xml"]).is_err());
    }
}
