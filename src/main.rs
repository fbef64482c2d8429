mod builder;
mod check;
mod checkout;
mod diff;
mod records;
mod settings;
mod statblock;

#[cfg(test)]
mod testutil;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{ensure, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use builder::Builder;
use check::CheckSummary;
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "diffset",
    about = "Join open bench / fishtest records with their search-code diffs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Test records JSON (bare array or {"list": [...]})
    #[arg(short, long)]
    input: PathBuf,
    /// Directory holding one git checkout per repository
    #[arg(short, long, alias = "repos_base_dir")]
    repos_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the dataset JSON
    Build {
        #[command(flatten)]
        source: SourceArgs,
        /// Output JSON file (overwritten)
        #[arg(short, long)]
        output: PathBuf,
        /// TOML settings file (DIFFSET_* env vars still apply on top)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Strip comments before diffing
        #[arg(long, alias = "remove_comments")]
        remove_comments: bool,
        /// Search-code glob; repeat to replace the configured list
        #[arg(long = "filter-path", alias = "filter_paths", num_args = 1..)]
        filter_paths: Vec<String>,
        /// Skip records that touch any file outside the filter
        #[arg(long)]
        exclusive: bool,
        /// Add old/new file contents to each record
        #[arg(long)]
        include_files: bool,
        /// Drop records whose filtered diff is empty
        #[arg(long)]
        skip_empty: bool,
    },
    /// Show which records resolve against the local checkouts
    Check {
        #[command(flatten)]
        source: SourceArgs,
        /// Max rows to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Build {
            source,
            output,
            config,
            remove_comments,
            filter_paths,
            exclusive,
            include_files,
            skip_empty,
        } => {
            let mut settings = settings::load(config.as_deref())?;
            settings.remove_comments |= remove_comments;
            settings.exclusive |= exclusive;
            settings.include_file_versions |= include_files;
            settings.skip_empty |= skip_empty;
            if !filter_paths.is_empty() {
                settings.filter_paths = filter_paths;
            }
            build(&source, &output, &settings)
        }
        Commands::Check { source, limit } => check(&source, limit),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn ensure_repos_dir(dir: &Path) -> Result<()> {
    ensure!(dir.is_dir(), "Repositories directory not found: {:?}", dir);
    Ok(())
}

fn build(source: &SourceArgs, output: &Path, settings: &Settings) -> Result<()> {
    ensure_repos_dir(&source.repos_dir)?;
    let records = records::load_records(&source.input)?;
    println!(
        "Building dataset from {} records (remove_comments: {}, exclusive: {})",
        records.len(),
        settings.remove_comments,
        settings.exclusive
    );
    println!("filter_paths: {:?}", settings.filter_paths);

    let builder = Builder::new(&source.repos_dir, settings)?;
    let pb = progress_bar(records.len())?;
    let (rows, stats) = builder.build(&records, &pb)?;
    pb.finish_and_clear();

    records::write_dataset(output, &rows)?;
    stats.print();
    println!("Wrote {} records to {:?}", rows.len(), output);
    Ok(())
}

fn check(source: &SourceArgs, limit: Option<usize>) -> Result<()> {
    ensure_repos_dir(&source.repos_dir)?;
    let records = records::load_records(&source.input)?;
    if records.is_empty() {
        println!("No records in {:?}.", source.input);
        return Ok(());
    }

    println!(
        "{:>4} | {:<28} | {:<36} | {:<10} | {:<11}",
        "#", "Test", "Repo", "Commit", "Status"
    );
    println!("{}", "-".repeat(101));

    let mut summary = CheckSummary::default();
    for (i, record) in records.iter().enumerate() {
        let status = check::status_of(&source.repos_dir, record);
        summary.add(status);
        if limit.is_some_and(|n| i >= n) {
            continue;
        }
        println!(
            "{:>4} | {:<28} | {:<36} | {:<10} | {:<11}",
            i + 1,
            truncate(&record.id, 28),
            truncate(&record.repo, 36),
            truncate(&record.commit, 10),
            status
        );
    }

    println!(
        "\n{} records | {} ok, {} missing commit, {} missing checkout, {} other",
        records.len(),
        summary.ok,
        summary.no_commit,
        summary.no_checkout,
        summary.other
    );
    Ok(())
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
