mod analytics;
mod config;
mod data;
mod error;
mod indicators;
mod ml;
mod regime;
mod render;
mod types;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use analytics::RegimeAnalytics;
use crate::config::{default_config_toml, load_config, AppConfig};
use data::{FilePriceSource, PriceSource, YahooClient};
use ml::hmm::FEATURE_NAMES;
use ml::{extract_regime_features, GaussianHMM, RegimeModel};
use regime::{ClassificationStatus, DisplayWindow, HistoricalContextPolicy, RegimeClassifier};
use render::{JsonReportRenderer, RegimeRenderer};
use types::{PricePoint, PriceSeries};

#[derive(Parser)]
#[command(name = "market-regime")]
#[command(version = "0.1.0")]
#[command(
    about = "Classifies equity index history into bull, correction and bear regimes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to regime.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rule-based regimes from the moving average and bear hysteresis
    Classify {
        /// Ticker symbol (e.g. ^GSPC)
        #[arg(short, long)]
        ticker: Option<String>,

        /// Historical origin the classification always starts from (YYYY-MM-DD)
        #[arg(long)]
        history_start: Option<NaiveDate>,

        /// Last date to fetch (YYYY-MM-DD), today when omitted
        #[arg(short, long)]
        end: Option<NaiveDate>,

        /// First date shown in the output (YYYY-MM-DD)
        #[arg(long)]
        display_start: Option<NaiveDate>,

        /// Last date shown in the output (YYYY-MM-DD)
        #[arg(long)]
        display_end: Option<NaiveDate>,

        /// Moving-average window in periods
        #[arg(short, long)]
        window: Option<usize>,

        /// Consecutive periods below the average to enter a bear market
        #[arg(long)]
        entry: Option<u32>,

        /// Consecutive periods above the average to leave a bear market
        #[arg(long)]
        exit: Option<u32>,

        /// Read closes from a JSON file instead of the network
        #[arg(long)]
        price_file: Option<PathBuf>,

        /// Output directory for regime artifacts
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Unsupervised regimes from a Gaussian HMM over returns and volatility
    Hmm {
        /// Asset ticker (e.g. SPY)
        #[arg(short, long)]
        ticker: Option<String>,

        /// Volatility index ticker (e.g. ^VIX)
        #[arg(long)]
        vix: Option<String>,

        /// First date to fetch (YYYY-MM-DD)
        #[arg(short, long)]
        start: Option<NaiveDate>,

        /// Last date to fetch (YYYY-MM-DD), today when omitted
        #[arg(short, long)]
        end: Option<NaiveDate>,

        /// Number of hidden states
        #[arg(long)]
        states: Option<usize>,

        /// Maximum EM iterations
        #[arg(long)]
        n_iter: Option<usize>,

        /// Output directory for regime artifacts
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the default configuration as TOML
    InitConfig {
        /// Destination file
        #[arg(short, long, default_value = "regime.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    if cli.log_json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    match cli.command {
        Commands::InitConfig { output, force } => {
            write_default_config(&output, force)?;
        }
        Commands::Classify {
            ticker,
            history_start,
            end,
            display_start,
            display_end,
            window,
            entry,
            exit,
            price_file,
            output,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(ticker) = ticker {
                config.data.ticker = ticker;
            }
            if let Some(start) = history_start {
                config.data.history_start = start;
            }
            config.data.end = end.or(config.data.end);
            config.data.display_start = display_start.or(config.data.display_start);
            config.data.display_end = display_end.or(config.data.display_end);
            config.data.price_file = price_file.or(config.data.price_file);
            if let Some(window) = window {
                config.regime.sma_window = window;
            }
            if let Some(entry) = entry {
                config.regime.bear_entry_threshold = entry;
            }
            if let Some(exit) = exit {
                config.regime.bear_exit_confirmation = exit;
            }
            if let Some(dir) = output {
                config.output.dir = dir;
            }
            ensure_valid(&config)?;

            run_classify(&config).await?;
        }
        Commands::Hmm {
            ticker,
            vix,
            start,
            end,
            states,
            n_iter,
            output,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(ticker) = ticker {
                config.hmm.ticker = ticker;
            }
            if let Some(vix) = vix {
                config.hmm.vix_ticker = vix;
            }
            if let Some(start) = start {
                config.hmm.start = start;
            }
            config.hmm.end = end.or(config.hmm.end);
            if let Some(states) = states {
                config.hmm.n_states = states;
            }
            if let Some(n_iter) = n_iter {
                config.hmm.n_iter = n_iter;
            }
            if let Some(dir) = output {
                config.output.dir = dir;
            }
            ensure_valid(&config)?;

            run_hmm(&config).await?;
        }
    }

    Ok(())
}

fn ensure_valid(config: &AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|errors| anyhow!("Invalid configuration: {}", errors.join(", ")))
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    std::fs::write(path, default_config_toml()?)?;
    info!("Default configuration written to {}", path.display());
    Ok(())
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("Cannot build end of day for {}", date))
}

async fn run_classify(config: &AppConfig) -> Result<()> {
    let data = &config.data;
    let classifier = RegimeClassifier::new(&config.regime)?;
    let origin = start_of_day(data.history_start);
    let end = data.end.map(end_of_day).transpose()?.unwrap_or_else(Utc::now);
    let window = DisplayWindow::new(
        data.display_start.map(start_of_day),
        data.display_end.map(end_of_day).transpose()?,
    );

    info!("═══════════════════════════════════════════════════");
    info!("Market Regime Classification");
    info!("═══════════════════════════════════════════════════");
    info!("Ticker: {}", data.ticker);
    info!("History: {} to {}", data.history_start, end.date_naive());
    info!(
        "Window: {} periods, bear entry {} / exit {}",
        config.regime.sma_window,
        config.regime.bear_entry_threshold,
        config.regime.bear_exit_confirmation
    );

    let source: Box<dyn PriceSource> = match &data.price_file {
        Some(path) => Box::new(FilePriceSource::new(path)),
        None => Box::new(YahooClient::new(data.interval)?),
    };

    let policy = HistoricalContextPolicy::new(origin, classifier);
    let view = policy.run(source.as_ref(), &data.ticker, end, &window).await?;

    if view.is_empty() {
        if view.status == ClassificationStatus::Complete {
            warn!("No classified periods fall inside the display window");
        }
        return Ok(());
    }

    let names = config.output.label_overrides();
    let codes = view.codes();
    log_analytics(&view.prices, &codes, Some(&names));

    let renderer = JsonReportRenderer::new(config.output.regime_colors.clone());
    let files = renderer.render(&view.prices, &codes, &config.output.dir, Some(&names))?;
    for file in files {
        info!("  {}", file.display());
    }

    Ok(())
}

async fn run_hmm(config: &AppConfig) -> Result<()> {
    let settings = &config.hmm;
    let start = start_of_day(settings.start);
    let end = settings.end.map(end_of_day).transpose()?.unwrap_or_else(Utc::now);

    info!("═══════════════════════════════════════════════════");
    info!("HMM Regime Detection");
    info!("═══════════════════════════════════════════════════");
    info!("Asset: {}, volatility: {}", settings.ticker, settings.vix_ticker);
    info!("Period: {} to {}", settings.start, end.date_naive());
    info!("States: {}, EM iterations: {}", settings.n_states, settings.n_iter);

    info!("━━━ Step 1: Fetching historical data ━━━");
    let client = YahooClient::new(settings.interval)?;
    let (asset, vix) = tokio::try_join!(
        client.fetch_closes(&settings.ticker, start, end),
        client.fetch_closes(&settings.vix_ticker, start, end),
    )?;
    let asset = PriceSeries::new(asset)?;
    let vix = PriceSeries::new(vix)?;

    info!("━━━ Step 2: Extracting regime features ━━━");
    let features = extract_regime_features(&asset, &vix)?;
    info!(
        "✓ Extracted {} observations ({})",
        features.len(),
        FEATURE_NAMES.join(", ")
    );

    info!("━━━ Step 3: Training {}-state Gaussian HMM ━━━", settings.n_states);
    let start_time = std::time::Instant::now();
    let mut model = GaussianHMM::new(settings.n_states, FEATURE_NAMES.len())
        .with_iterations(settings.n_iter, settings.tolerance);
    let states = model.fit_predict(&features.observations)?;
    info!("✓ Training complete in {:.1}s", start_time.elapsed().as_secs_f64());

    log_analytics(&features.prices, &states, None);

    let renderer = JsonReportRenderer::default();
    let out_dir = config.output.dir.join("hmm");
    let files = renderer.render(&features.prices, &states, &out_dir, None)?;
    for file in files {
        info!("  {}", file.display());
    }

    Ok(())
}

fn log_analytics(prices: &[PricePoint], codes: &[usize], names: Option<&BTreeMap<usize, String>>) {
    let name = |code: usize| {
        names
            .and_then(|n| n.get(&code).cloned())
            .unwrap_or_else(|| format!("Regime {}", code))
    };

    let analytics = RegimeAnalytics::calculate(prices, codes);
    info!("━━━ Regime distribution ({} periods) ━━━", analytics.distribution.total);
    for share in &analytics.distribution.shares {
        info!(
            "  {:<12} {:>6} periods ({}%)",
            name(share.code),
            share.count,
            share.share_pct
        );
    }
    for share in &analytics.distribution.shares {
        if let Some(longest) = analytics.longest_episode(share.code) {
            info!(
                "  Longest {}: {} to {} ({} periods)",
                name(share.code),
                longest.start.date_naive(),
                longest.end.date_naive(),
                longest.periods
            );
        }
    }
    if let Some(current) = analytics.current_episode() {
        info!(
            "Current regime: {} since {} ({} periods, {} episodes total)",
            name(current.code),
            current.start.date_naive(),
            current.periods,
            analytics.episodes.len()
        );
    }
}
