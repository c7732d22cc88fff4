use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use cobranca::{
    config::{CollisionPolicy, Config, SourceEncoding},
    fetch::{collect, report_window, ReportStatus},
    process::{merge_files, tag_file},
};
use glob::glob;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Tag and merge billing report CSV exports from the property-management portal"
)]
struct Cli {
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Encoding of the input CSVs (utf-8, latin1, windows-1252, ...)
    #[arg(long, global = true)]
    encoding: Option<String>,
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Fail instead of suffixing when two headers normalize to the same name
    #[arg(long, global = true)]
    reject_collisions: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalize headers and add a status column, rewriting the file in place
    Tag {
        path: PathBuf,
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Concatenate CSVs (paths or glob patterns) into one file
    Merge {
        #[arg(required = true)]
        inputs: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
        /// Normalize each input's headers first
        #[arg(long)]
        normalize: bool,
    },
    /// Wait for each status export to download, tag it, then merge them all
    Collect {
        #[arg(short, long = "status")]
        statuses: Vec<String>,
        #[arg(long)]
        download_dir: Option<PathBuf>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Also accept files already in the download directory at start
        #[arg(long)]
        include_existing: bool,
    },
    /// Print the date window used to filter the report
    Window,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match cli.command {
        Command::Tag { path, status } => {
            let status = status
                .or_else(|| config.status_label.clone())
                .ok_or_else(|| anyhow!("no status given; pass --status or set status_label"))?;
            tag_file(&path, &status, &config)?;
        }
        Command::Merge {
            inputs,
            output,
            normalize,
        } => {
            let inputs = expand_inputs(&inputs)?;
            let config = Config {
                normalize_on_merge: config.normalize_on_merge || normalize,
                ..config
            };
            merge_files(&inputs, &output, &config)?;
        }
        Command::Collect {
            statuses,
            download_dir,
            timeout_secs,
            include_existing,
        } => {
            let mut config = config;
            if let Some(dir) = download_dir {
                config.download.directory = dir;
            }
            if let Some(secs) = timeout_secs {
                config.download.timeout_secs = secs;
            }
            let statuses: Vec<ReportStatus> = if statuses.is_empty() {
                ReportStatus::ALL.to_vec()
            } else {
                statuses
                    .iter()
                    .map(|s| {
                        ReportStatus::from_str(s).ok_or_else(|| anyhow!("unknown status '{}'", s))
                    })
                    .collect::<Result<_>>()?
            };
            let out = collect(&statuses, include_existing, &config).await?;
            info!(
                reports = out.reports.len(),
                rows = out.rows,
                merged = %out.merged.display(),
                "collect finished"
            );
        }
        Command::Window => {
            let window = report_window(Utc::now());
            println!("{} {}", window.start, window.end);
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(label) = &cli.encoding {
        config.source_encoding = SourceEncoding::from_label(label)?;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_directory = dir.clone();
    }
    if cli.reject_collisions {
        config.collision_policy = CollisionPolicy::Reject;
    }
    Ok(config)
}

/// Paths pass through; anything with glob metacharacters is expanded.
fn expand_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if !input.contains(['*', '?', '[']) {
            out.push(PathBuf::from(input));
            continue;
        }
        let mut matched = Vec::new();
        for entry in glob(input).with_context(|| format!("bad glob pattern '{}'", input))? {
            match entry {
                Ok(path) => matched.push(path),
                Err(e) => warn!(
                    pattern = %input,
                    path = %e.path().display(),
                    error = %e.error(),
                    "skipping unreadable glob match"
                ),
            }
        }
        if matched.is_empty() {
            bail!("no files match '{}'", input);
        }
        out.extend(matched);
    }
    Ok(out)
}
