use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use feedcast::latch::{select_headlines, AutoNarrationLatch, ItemFilter};
use feedcast::narration::{compose_speak_text, CommandSpeaker, NarrationHandle, NarrationState};
use feedcast::rss_utils::text;
use feedcast::{AggregationOutput, Aggregator, AppConfig, FeedManager, HttpTransport, JsonFileStore, RefreshPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long a launched speech program gets to report that it started.
const LAUNCH_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "feedcast", version, about = "Aggregate news feeds and read headlines aloud")]
struct Cli {
    /// TOML config file (default: ./feedcast.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the merged item list
    Fetch {
        /// Ignore a fresh cache
        #[arg(long)]
        refresh: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Print per-source status
    Status {
        #[arg(long)]
        refresh: bool,
    },
    /// Delete the cache file
    ClearCache,
    /// Forget every seen item id
    ClearSeen,
    /// Speak arbitrary text
    Speak {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print the top headlines and speak the newest one
    Headline {
        #[arg(long)]
        refresh: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Refresh periodically and speak each new top headline until Ctrl-C
    Watch {
        /// Also speak the headline found on the first pass
        #[arg(long)]
        speak_on_start: bool,
        /// Refresh only, never speak
        #[arg(long)]
        mute: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Restrict to a category (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,
    /// Case-insensitive text filter
    #[arg(long, default_value = "")]
    filter: String,
}

impl FilterArgs {
    fn to_filter(&self) -> ItemFilter {
        ItemFilter::new(self.categories.iter().cloned(), &self.filter)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Fetch { refresh, filter } => {
            let output = build_aggregator(&config)?.aggregate(refresh).await;
            print_items(&output, &filter.to_filter(), &config);
        }
        Command::Status { refresh } => {
            let output = build_aggregator(&config)?.aggregate(refresh).await;
            print_statuses(&output);
        }
        Command::ClearCache => {
            build_aggregator(&config)?.clear_cache().context("clearing cache")?;
            println!("Cache cleared");
        }
        Command::ClearSeen => {
            build_aggregator(&config)?.clear_seen().context("clearing seen ledger")?;
            println!("Seen ledger cleared");
        }
        Command::Speak { text } => {
            let (narrator, worker) = spawn_narrator(&config);
            let result = speak_and_wait(&narrator, &text.join(" ")).await;
            finish_narrator(&narrator, worker).await;
            result?;
        }
        Command::Headline { refresh, filter } => {
            let output = build_aggregator(&config)?.aggregate(refresh).await;
            let headlines = select_headlines(
                &output.items,
                &config.auto.headline_categories,
                &filter.to_filter(),
                config.limits.headline_count,
            );
            let Some(newest) = headlines.first() else {
                bail!("no headlines available");
            };
            for item in &headlines {
                println!(
                    "{} {:<6} {}",
                    item.ts,
                    item.source_code,
                    text::truncate(&item.title, config.limits.headline_title_chars)
                );
            }

            let (narrator, worker) = spawn_narrator(&config);
            let result = speak_and_wait(&narrator, &compose_speak_text(newest, config.auto.include_summary)).await;
            finish_narrator(&narrator, worker).await;
            result?;
        }
        Command::Watch {
            speak_on_start,
            mute,
            filter,
        } => {
            watch(&config, speak_on_start, mute, filter.to_filter()).await?;
        }
    }

    Ok(())
}

fn build_aggregator(config: &AppConfig) -> anyhow::Result<Aggregator> {
    let registry = FeedManager::new(&config.feeds);
    let transport = HttpTransport::new(&config.fetch).context("building HTTP client")?;
    let store = JsonFileStore::new(config.cache.cache_file.clone(), config.cache.seen_file.clone());
    Ok(Aggregator::new(config, registry, Arc::new(transport), Arc::new(store)))
}

fn spawn_narrator(config: &AppConfig) -> (NarrationHandle, JoinHandle<()>) {
    let speaker = CommandSpeaker::new(&config.narration);
    NarrationHandle::spawn(Arc::new(speaker), config.narration.max_chars)
}

async fn finish_narrator(narrator: &NarrationHandle, worker: JoinHandle<()>) {
    narrator.shutdown();
    if let Err(e) = worker.await {
        warn!("Narration worker ended abnormally: {}", e);
    }
}

/// Speak once and wait for the speech to end or for Ctrl-C.
async fn speak_and_wait(narrator: &NarrationHandle, text: &str) -> anyhow::Result<()> {
    let mut state = narrator.subscribe();
    let mut launches = narrator.subscribe_launches();
    let before = *launches.borrow_and_update();
    if !narrator.speak(text) {
        bail!("nothing to speak");
    }

    let started = tokio::time::timeout(LAUNCH_GRACE, launches.wait_for(|n| *n > before))
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);
    if !started {
        bail!("speech program did not start (see log)");
    }

    tokio::select! {
        _ = state.wait_for(|s| *s != NarrationState::Speaking) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping speech");
            narrator.stop();
        }
    }
    Ok(())
}

async fn watch(config: &AppConfig, speak_on_start: bool, mute: bool, filter: ItemFilter) -> anyhow::Result<()> {
    let mut pipeline = RefreshPipeline::new(build_aggregator(config)?);
    let (narrator, worker) = spawn_narrator(config);
    let mut latch = AutoNarrationLatch::new(
        speak_on_start || config.auto.speak_on_start,
        config.auto.include_summary,
    );
    let speak_on_change = config.auto.speak_on_change && !mute;

    pipeline.request_refresh(false);
    let ticker = pipeline.spawn_auto_refresh(Duration::from_secs(config.auto.refresh_seconds));

    loop {
        tokio::select! {
            result = pipeline.next_result() => {
                let Some(output) = result else { break };
                info!(
                    "Pass done [{}]: {} items, {} new, {} ok, {} failed",
                    output.provenance,
                    output.items.len(),
                    output.new_count(),
                    output.ok_count(),
                    output.fail_count()
                );

                if !speak_on_change {
                    continue;
                }
                let headlines = select_headlines(
                    &output.items,
                    &config.auto.headline_categories,
                    &filter,
                    config.limits.headline_count,
                );
                if let Some(text) = latch.observe(&headlines) {
                    println!("{}", text);
                    narrator.speak(&text);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    ticker.abort();
    finish_narrator(&narrator, worker).await;
    Ok(())
}

fn print_items(output: &AggregationOutput, filter: &ItemFilter, config: &AppConfig) {
    let mut shown = 0usize;
    for item in output.items.iter().filter(|it| filter.matches(it)) {
        println!(
            "{} {} {:<10} {:<6} {} ({})",
            item.ts,
            if item.is_new { "NEW" } else { "   " },
            item.category,
            item.source_code,
            text::truncate(&item.title, config.limits.title_chars),
            item.domain
        );
        shown += 1;
    }
    println!(
        "{} of {} items shown, {} new [{}]",
        shown,
        output.items.len(),
        output.new_count(),
        output.provenance
    );
}

fn print_statuses(output: &AggregationOutput) {
    for status in &output.statuses {
        if status.is_ok() {
            println!(
                "{:<4} {:<10} {:<28} {:>4}  {}",
                status.status, status.category, status.name, status.count, status.used_url
            );
        } else {
            println!(
                "{:<4} {:<10} {:<28} {:>4}  {}",
                status.status, status.category, status.name, status.count, status.error
            );
        }
    }
    println!(
        "OK {} / FAIL {} [{}]",
        output.ok_count(),
        output.fail_count(),
        output.provenance
    );
}
