//! CLI entry point for `mailsift`.

use std::path::Path;
use std::time::{Duration, Instant};

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use mailsift::config::{self, Config};
use mailsift::feed;
use mailsift::index::snapshot;
use mailsift::model::contact::ContactSummary;
use mailsift::model::message::MessageSummary;
use mailsift::{has_unsupported_operators, parse_search_query, SearchEngine, SearchOptions};

#[derive(Parser)]
#[command(
    name = "mailsift",
    version,
    about = "Instant local search over a mailbox change feed"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Ignore any existing snapshot and rebuild from the feed
    #[arg(short, long, global = true)]
    force: bool,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index for a feed and write a snapshot
    Index { feed: std::path::PathBuf },
    /// Show index statistics
    Stats {
        feed: std::path::PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Search messages
    Search {
        feed: std::path::PathBuf,
        query: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Search contacts by name or address
    Contacts {
        feed: std::path::PathBuf,
        query: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List the most frequent senders
    TopContacts {
        feed: std::path::PathBuf,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show how a query is parsed
    Parse {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let force = cli.force;

    match cli.command {
        Commands::Index { feed } => cmd_index(&feed, &config),
        Commands::Stats { feed, json } => cmd_stats(&feed, &config, json, force),
        Commands::Search {
            feed,
            query,
            limit,
            json,
        } => cmd_search(&feed, &query, limit, json, &config, force),
        Commands::Contacts {
            feed,
            query,
            limit,
            json,
        } => {
            let limit = limit.unwrap_or(config.search.contact_limit);
            let (engine, _) = open_engine(&feed, &config, force)?;
            print_contacts(&engine.search_contacts(&query, limit), json)
        }
        Commands::TopContacts { feed, limit, json } => {
            let limit = limit.unwrap_or(config.search.contact_limit);
            let (engine, _) = open_engine(&feed, &config, force)?;
            print_contacts(&engine.top_contacts(limit), json)
        }
        Commands::Parse { query, json } => cmd_parse(&query, json),
        Commands::Config { write } => cmd_config(&config, write),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().unwrap_or(Path::new("."));
    if std::fs::create_dir_all(log_dir).is_ok() {
        let file_name = log_path.file_name().unwrap_or_default();
        let file_appender = tracing_appender::rolling::never(log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Bring an engine to `Ready` for `feed`, from a snapshot when one is valid.
///
/// Returns the engine and the time spent loading or building.
fn open_engine(feed: &Path, config: &Config, force: bool) -> anyhow::Result<(SearchEngine, Duration)> {
    if !feed.exists() {
        anyhow::bail!("Feed not found: {}", feed.display());
    }

    let engine = SearchEngine::new(config);
    let cache_dir = config::cache_dir(config);
    let start = Instant::now();

    if config.persistence.snapshot_enabled && !force {
        if let Some(index) = snapshot::load_for_feed(feed, &cache_dir)? {
            engine.restore(index)?;
            return Ok((engine, start.elapsed()));
        }
    }

    let changes = feed::load_feed(feed)?;
    let pb = ProgressBar::new(changes.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} Indexing [{bar:40.cyan/blue}] {pos}/{len} changes ({eta})",
        )?
        .progress_chars("#>-"),
    );
    let index = feed::replay(
        changes,
        Some(&|current: usize, total: usize| {
            pb.set_length(total as u64);
            pb.set_position(current as u64);
        }),
    );
    pb.finish_and_clear();

    if config.persistence.snapshot_enabled {
        if let Err(e) = snapshot::save_for_feed(feed, &index, &cache_dir) {
            warn!(error = %e, "Could not write snapshot");
        }
    }
    engine.restore(index)?;
    Ok((engine, start.elapsed()))
}

/// Index a feed and print statistics.
fn cmd_index(feed: &Path, config: &Config) -> anyhow::Result<()> {
    let (engine, elapsed) = open_engine(feed, config, true)?;
    print_stats_table(feed, &engine, elapsed, config);
    Ok(())
}

fn cmd_stats(feed: &Path, config: &Config, json: bool, force: bool) -> anyhow::Result<()> {
    let (engine, elapsed) = open_engine(feed, config, force)?;
    if json {
        print_stats_json(feed, &engine, elapsed, config)
    } else {
        print_stats_table(feed, &engine, elapsed, config);
        Ok(())
    }
}

fn cmd_search(
    feed: &Path,
    query: &str,
    limit: Option<usize>,
    json: bool,
    config: &Config,
    force: bool,
) -> anyhow::Result<()> {
    let parsed = parse_search_query(query);
    if has_unsupported_operators(&parsed) {
        eprintln!("  Query uses operators only the server can evaluate; no local results.");
        return Ok(());
    }

    let (engine, _) = open_engine(feed, config, force)?;
    let results = engine.search(query, SearchOptions { limit });

    if json {
        print_search_results_json(&results)
    } else {
        print_search_results_table(&results);
        Ok(())
    }
}

fn cmd_parse(query: &str, json: bool) -> anyhow::Result<()> {
    let parsed = parse_search_query(query);
    if json {
        let output = serde_json::json!({
            "query": query,
            "clauses": parsed.clauses,
            "has_unsupported_operators": has_unsupported_operators(&parsed),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    for clause in &parsed.clauses {
        println!("  {clause}");
    }
    if has_unsupported_operators(&parsed) {
        println!();
        println!("  (needs server-side search)");
    }
    println!();
    Ok(())
}

fn cmd_config(config: &Config, write: bool) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    if write {
        config::save_config(config)?;
        if let Some(path) = config::config_file_path() {
            eprintln!("  Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsift", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print search results as a human-readable table.
fn print_search_results_table(results: &[MessageSummary]) {
    println!();
    println!("  {} result(s)", results.len());
    println!();

    if results.is_empty() {
        return;
    }

    println!(
        "  {:<4} {:<17} {:<25} {:<40} {:>7}",
        "#", "Date", "From", "Subject", "Score"
    );
    println!("  {}", "-".repeat(97));

    for (i, row) in results.iter().enumerate() {
        let date = row.received.format("%Y-%m-%d %H:%M").to_string();
        let from = if row.sender_name.is_empty() {
            &row.sender_email
        } else {
            &row.sender_name
        };
        let from_trunc: String = from.chars().take(24).collect();
        let marker = if row.unread { "*" } else { " " };
        let subj_trunc: String = row.subject.chars().take(38).collect();

        println!(
            "  {:<4} {:<17} {:<25} {}{:<39} {:>7.2}",
            i + 1,
            date,
            from_trunc,
            marker,
            subj_trunc,
            row.score
        );
    }
    println!();
}

fn print_search_results_json(results: &[MessageSummary]) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "result_count": results.len(),
        "results": results,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_contacts(contacts: &[ContactSummary], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(contacts)?);
        return Ok(());
    }

    println!();
    for contact in contacts {
        println!("    {}", contact.display());
    }
    if contacts.is_empty() {
        println!("  No contacts found.");
    }
    println!();
    Ok(())
}

/// Print statistics in a human-readable table.
fn print_stats_table(feed: &Path, engine: &SearchEngine, elapsed: Duration, config: &Config) {
    use humansize::{format_size, BINARY};

    let stats = engine.stats();
    let feed_size = std::fs::metadata(feed).map(|m| m.len()).unwrap_or(0);
    let snapshot_size = snapshot::snapshot_file_size(feed, &config::cache_dir(config));

    println!();
    println!("  {:<20} {}", "Feed", feed.display());
    println!("  {:<20} {}", "Feed size", format_size(feed_size, BINARY));
    println!("  {:<20} {}", "Messages", stats.message_count);
    println!("  {:<20} {}", "Contacts", stats.contact_count);
    println!("  {:<20} {}", "Distinct terms", stats.vocabulary_size);

    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!(
            "  {:<20} {} to {}",
            "Date range",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d")
        );
    }

    if snapshot_size > 0 {
        println!(
            "  {:<20} {}",
            "Snapshot size",
            format_size(snapshot_size, BINARY)
        );
    }
    println!("  {:<20} {:.2?}", "Load time", elapsed);
    println!("  {:<20} {}", "Unread", stats.unread);
    println!("  {:<20} {}", "Starred", stats.starred);
    println!(
        "  {:<20} {} ({:.1}%)",
        "With attachments",
        stats.with_attachments,
        stats.attachment_ratio()
    );

    let top = engine.top_contacts(config.search.contact_limit);
    if !top.is_empty() {
        println!();
        println!("  Top contacts:");
        for contact in &top {
            println!("    {}", contact.display());
        }
    }
    println!();
}

fn print_stats_json(
    feed: &Path,
    engine: &SearchEngine,
    elapsed: Duration,
    config: &Config,
) -> anyhow::Result<()> {
    let stats = engine.stats();
    let output = serde_json::json!({
        "feed": feed.to_string_lossy(),
        "feed_size": std::fs::metadata(feed).map(|m| m.len()).unwrap_or(0),
        "snapshot_size": snapshot::snapshot_file_size(feed, &config::cache_dir(config)),
        "load_time_ms": elapsed.as_millis(),
        "stats": stats,
        "top_contacts": engine.top_contacts(config.search.contact_limit),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
