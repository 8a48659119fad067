use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use radiosync::catalog::{FILTER_LIMIT, LIST_LIMIT};
use radiosync::{
    AlwaysReplace, Catalog, CategoryCount, DataPaths, KeepLarger, NoopReporter, ProgressEvent,
    ProgressReporter, ReplacePolicy, ReqwestClient, SearchField, SharedProgressReporter, Station,
    StationOrder, SyncOutcome, SyncWorker, WorkerSettings, now_ms,
};

// Emoji with fallback for terminals without Unicode support
static RADIO: Emoji<'_, '_> = Emoji("📻 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "[i] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static PAUSED: Emoji<'_, '_> = Emoji("⏸️  ", "[=] ");
static STAR: Emoji<'_, '_> = Emoji("⭐ ", "* ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");

/// Keep a local catalog of internet radio stations in sync with radio-browser.info
#[derive(Parser, Debug)]
#[command(name = "radiosync")]
#[command(about = "Keep a local catalog of internet radio stations in sync with radio-browser.info")]
#[command(version)]
struct Args {
    /// Directory holding the catalogs and progress record
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the station directory and replace the local catalog
    Sync {
        /// Replace the catalog even when the download is smaller
        #[arg(short, long, conflicts_with = "keep")]
        yes: bool,

        /// Never replace the catalog with a smaller download
        #[arg(short, long)]
        keep: bool,

        /// Directory server to use instead of the built-in list (repeatable)
        #[arg(long = "server")]
        servers: Vec<String>,
    },

    /// Show the state of the current or last update
    Status,

    /// Cancel a running update
    Cancel,

    /// Show catalog and data directory information
    Info,

    /// List stations
    Stations {
        #[arg(short, long, value_enum, default_value_t = OrderArg::Clicks)]
        order: OrderArg,

        #[arg(short, long, default_value_t = LIST_LIMIT)]
        limit: usize,
    },

    /// Search stations
    Search {
        query: String,

        /// Field to search in
        #[arg(short, long, value_enum, default_value_t = FieldArg::All)]
        field: FieldArg,

        /// Use the full-text index (prefix match on every word)
        #[arg(long, conflicts_with = "field")]
        fast: bool,
    },

    /// List countries with their station counts
    Countries,

    /// List languages with their station counts
    Languages,

    /// List the most common tags
    Tags {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Stations from a country
    Country {
        /// Country name, or ISO code with --code
        name: String,

        /// Treat the argument as a country code (e.g. DE)
        #[arg(long)]
        code: bool,

        #[arg(short, long, default_value_t = FILTER_LIMIT)]
        limit: usize,
    },

    /// Stations in a language
    Language {
        name: String,

        /// Only stations from this country code
        #[arg(long)]
        country_code: Option<String>,

        #[arg(short, long, default_value_t = FILTER_LIMIT)]
        limit: usize,
    },

    /// Stations carrying a tag
    Tag {
        tag: String,

        #[arg(short, long, default_value_t = FILTER_LIMIT)]
        limit: usize,
    },

    /// Show every detail of a station
    Show { uuid: String },

    /// Manage favorite stations
    #[command(subcommand)]
    Favorite(FavoriteCommand),

    /// Print a station's stream URL and remember the play
    Play { uuid: String },

    /// Recently played stations
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum FavoriteCommand {
    /// Mark a station as favorite
    Add { uuid: String },
    /// Remove a station from the favorites
    Remove { uuid: String },
    /// List favorite stations
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum OrderArg {
    Name,
    Clicks,
    Votes,
    Changed,
    Clicked,
}

impl From<OrderArg> for StationOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::Name => StationOrder::Name,
            OrderArg::Clicks => StationOrder::ClickCount,
            OrderArg::Votes => StationOrder::Votes,
            OrderArg::Changed => StationOrder::LastChange,
            OrderArg::Clicked => StationOrder::LastClick,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FieldArg {
    All,
    Name,
    Tags,
    Country,
    Language,
}

impl From<FieldArg> for SearchField {
    fn from(field: FieldArg) -> Self {
        match field {
            FieldArg::All => SearchField::All,
            FieldArg::Name => SearchField::Name,
            FieldArg::Tags => SearchField::Tags,
            FieldArg::Country => SearchField::Country,
            FieldArg::Language => SearchField::Language,
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    bar: ProgressBar,
}

impl IndicatifReporter {
    fn new(bar: ProgressBar) -> Self {
        bar.set_style(style("{spinner:.green} {wide_msg}"));
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    fn show_counts(&self, position: usize, total: usize) {
        self.bar.set_style(
            style("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .progress_chars("█▓░"),
        );
        self.bar.set_length(total as u64);
        self.bar.set_position(position as u64);
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::CheckingNetwork => {
                self.bar.set_message(format!("{SEARCH}{}", event.message()));
            }

            ProgressEvent::ServerSelected { server } => {
                self.bar
                    .set_message(format!("{GLOBE}Using server {}", server.cyan()));
            }

            ProgressEvent::FetchingTotal | ProgressEvent::Swapping { .. } => {
                self.bar.set_message(event.message());
            }

            ProgressEvent::TotalKnown { total, main_count } => {
                self.bar.println(format!(
                    "{GLOBE}{} stations available, {} in local catalog",
                    total.to_string().cyan(),
                    main_count.to_string().yellow()
                ));
            }

            ProgressEvent::StagingStarted { total } => {
                self.show_counts(0, *total);
                self.bar.set_message("Downloading");
            }

            ProgressEvent::Resumed { staged, total } => {
                self.show_counts(*staged, *total);
                self.bar.set_message("Resuming");
            }

            ProgressEvent::PageStored {
                downloaded, total, ..
            } => {
                self.show_counts(*downloaded, *total);
            }

            ProgressEvent::PageSkipped {
                estimated,
                total,
                error,
                ..
            } => {
                self.bar.println(format!(
                    "{WARNING}{} - {}",
                    event.message().yellow(),
                    error.dimmed()
                ));
                self.show_counts(*estimated, *total);
            }

            ProgressEvent::Completed { stations } => {
                self.bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} stations in catalog",
                    "Update complete:".bold().green(),
                    stations.to_string().green().bold()
                );
            }

            ProgressEvent::KeptExisting { staged, main } => {
                self.bar.finish_and_clear();
                println!(
                    "\n{SUCCESS}{} kept {} stations, download had only {}",
                    "Catalog unchanged:".bold().yellow(),
                    main.to_string().green(),
                    staged.to_string().yellow()
                );
            }

            ProgressEvent::Interrupted { staged, total } => {
                self.bar.abandon();
                println!(
                    "\n{PAUSED}{} {}/{} stations downloaded, run `radiosync sync` to resume",
                    "Update paused:".bold().yellow(),
                    staged.to_string().cyan(),
                    total.to_string().cyan()
                );
            }

            ProgressEvent::Failed { error } => {
                self.bar
                    .abandon_with_message(format!("{FAILURE}{}", error.red()));
            }
        }
    }
}

/// Ask on the terminal before shrinking the catalog
struct PromptPolicy {
    bar: ProgressBar,
}

impl ReplacePolicy for PromptPolicy {
    fn confirm_replace(&self, staged: usize, main: usize) -> bool {
        if !console::user_attended() {
            return false;
        }

        self.bar.suspend(|| {
            eprint!(
                "{WARNING}Downloaded {} stations but the catalog has {}. Replace it? [y/N] ",
                staged.to_string().yellow(),
                main.to_string().green()
            );
            let mut answer = String::new();
            if std::io::stdin().read_line(&mut answer).is_err() {
                return false;
            }
            matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
        })
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("radiosync={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn format_time(timestamp_ms: i64) -> String {
    if timestamp_ms <= 0 {
        return "never".to_string();
    }
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|time| time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn print_stations(stations: &[Station]) {
    if stations.is_empty() {
        println!("{}", "No stations found".dimmed());
        return;
    }

    for (index, station) in stations.iter().enumerate() {
        let mut details = Vec::new();
        if !station.country_code.is_empty() {
            details.push(station.country_code.clone());
        }
        if !station.codec.is_empty() {
            details.push(if station.bitrate > 0 {
                format!("{} {}k", station.codec, station.bitrate)
            } else {
                station.codec.clone()
            });
        }
        details.push(format!("{} clicks", station.click_count));

        println!(
            "{:>4}. {} {}",
            index + 1,
            station.name.bold(),
            format!("({})", details.join(", ")).dimmed()
        );
        println!("      {}", station.station_uuid.dimmed());
    }
}

fn print_counts(counts: &[CategoryCount]) {
    if counts.is_empty() {
        println!("{}", "Nothing found".dimmed());
        return;
    }

    for count in counts {
        println!(
            "{:>7}  {}",
            count.station_count.to_string().cyan(),
            count.name
        );
    }
}

fn print_station_details(station: &Station, favorite: bool) {
    let star = if favorite { STAR.to_string() } else { String::new() };
    println!("\n{RADIO}{}{}", star, station.name.bold().magenta());

    let fields = [
        ("UUID", station.station_uuid.clone()),
        ("Stream", station.url.clone()),
        ("Homepage", station.homepage.clone()),
        ("Country", format!("{} ({})", station.country, station.country_code)),
        ("State", station.state.clone()),
        ("Language", station.language.clone()),
        ("Tags", station.tag_list().collect::<Vec<_>>().join(", ")),
        ("Codec", format!("{} {} kbps", station.codec, station.bitrate)),
        ("HLS", station.hls.to_string()),
        ("Clicks", format!("{} (trend {})", station.click_count, station.click_trend)),
        ("Votes", station.votes.to_string()),
        ("Check OK", station.last_check_ok.to_string()),
        (
            "Changed",
            station.last_change_time.clone().unwrap_or_default(),
        ),
    ];

    for (label, value) in fields {
        if !value.trim().is_empty() && value.trim() != "()" {
            println!("  {:<10} {}", format!("{label}:").dimmed(), value);
        }
    }
    println!();
}

fn require_station(catalog: &Catalog, uuid: &str) -> Result<Station> {
    match catalog.get(uuid).context("Failed to read catalog")? {
        Some(station) => Ok(station),
        None => bail!("No station with uuid {uuid}"),
    }
}

async fn sync(
    worker: &SyncWorker<ReqwestClient>,
    yes: bool,
    keep: bool,
    quiet: bool,
) -> Result<()> {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };

    let reporter: SharedProgressReporter = if quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new(bar.clone()))
    };

    let policy: Box<dyn ReplacePolicy> = if yes {
        Box::new(AlwaysReplace)
    } else if keep || quiet {
        Box::new(KeepLarger)
    } else {
        Box::new(PromptPolicy { bar })
    };

    // Ctrl-C pauses the update so the next run resumes it
    let pausing = worker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pausing.pause();
        }
    });

    let outcome = worker
        .run(policy.as_ref(), reporter)
        .await
        .context("Failed to update station catalog")?;

    if let SyncOutcome::Replaced { skipped_pages, .. } = outcome
        && skipped_pages > 0
        && !quiet
    {
        println!(
            "{WARNING}{} pages could not be downloaded and were skipped",
            skipped_pages.to_string().yellow()
        );
    }

    Ok(())
}

fn status(worker: &SyncWorker<ReqwestClient>) -> Result<()> {
    let updating = worker
        .is_updating(now_ms())
        .context("Failed to read update state")?;
    let record = worker.progress().context("Failed to read update state")?;
    let catalog = worker.catalog();

    if updating {
        println!(
            "{RADIO}{} {} ({}%)",
            "Updating:".bold().cyan(),
            record.message,
            record.percentage()
        );
        println!(
            "  {}/{} stations, started {}",
            record.current,
            record.total,
            format_time(record.update_start_time)
        );
    } else {
        println!("{SUCCESS}{}", "No update running".bold().green());
        if !record.message.is_empty() {
            println!("  Last update: {}", record.message.dimmed());
        }
    }

    println!(
        "  Catalog: {} stations, last synced {}",
        catalog.count()?.to_string().cyan(),
        format_time(catalog.last_update_time()?)
    );
    Ok(())
}

fn info(worker: &SyncWorker<ReqwestClient>) -> Result<()> {
    let catalog = worker.catalog();
    let paths = worker.paths();

    println!("\n{RADIO}{}", "radiosync".bold().magenta());
    println!(
        "  Stations:  {}",
        catalog.count()?.to_string().cyan()
    );
    println!(
        "  Countries: {}  Languages: {}",
        catalog.countries()?.len().to_string().cyan(),
        catalog.languages()?.len().to_string().cyan()
    );
    println!(
        "  Favorites: {}",
        catalog.favorites()?.len().to_string().cyan()
    );
    println!(
        "  Synced:    {}",
        format_time(catalog.last_update_time()?)
    );
    println!(
        "\n{FOLDER}Data: {}\n",
        paths.root().display().to_string().cyan()
    );
    Ok(())
}

fn browse(worker: &SyncWorker<ReqwestClient>, command: Command) -> Result<()> {
    let catalog = worker.catalog();

    if catalog.count()? == 0 {
        eprintln!(
            "{WARNING}{}",
            "The catalog is empty, run `radiosync sync` first".yellow()
        );
    }

    match command {
        Command::Stations { order, limit } => print_stations(&catalog.stations(order.into(), limit)?),

        Command::Search { query, field, fast } => {
            let stations = if fast {
                catalog.search_fast(&query)?
            } else {
                catalog.search(&query, field.into())?
            };
            print_stations(&stations);
        }

        Command::Countries => print_counts(&catalog.countries_with_count()?),

        Command::Languages => print_counts(&catalog.languages_with_count()?),

        Command::Tags { limit } => {
            let mut tags = catalog.tags_with_count()?;
            tags.truncate(limit);
            print_counts(&tags);
        }

        Command::Country { name, code, limit } => {
            let stations = if code {
                catalog.by_country_code(&name, limit)?
            } else {
                let mut stations = catalog.by_country(&name)?;
                stations.truncate(limit);
                stations
            };
            print_stations(&stations);
        }

        Command::Language {
            name,
            country_code,
            limit,
        } => {
            let stations = match country_code {
                Some(code) => catalog.by_language_and_country(&name, &code, limit)?,
                None => catalog.by_language(&name, limit)?,
            };
            print_stations(&stations);
        }

        Command::Tag { tag, limit } => print_stations(&catalog.by_tag(&tag, limit)?),

        Command::Show { uuid } => {
            let station = require_station(catalog, &uuid)?;
            print_station_details(&station, catalog.is_favorite(&uuid)?);
        }

        Command::Favorite(FavoriteCommand::Add { uuid }) => {
            let station = require_station(catalog, &uuid)?;
            if catalog.add_favorite(&uuid, now_ms())? {
                println!("{STAR}Added {}", station.name.bold());
            } else {
                println!("{} is already a favorite", station.name.bold());
            }
        }

        Command::Favorite(FavoriteCommand::Remove { uuid }) => {
            if catalog.remove_favorite(&uuid)? {
                println!("{SUCCESS}Removed {uuid} from favorites");
            } else {
                println!("{} was not a favorite", uuid.dimmed());
            }
        }

        Command::Favorite(FavoriteCommand::List) => print_stations(&catalog.favorites()?),

        Command::Play { uuid } => {
            let station = require_station(catalog, &uuid)?;
            catalog
                .record_play(&uuid, now_ms())
                .context("Failed to record play")?;
            eprintln!("{RADIO}{}", station.name.bold().magenta());
            println!("{}", station.url);
        }

        Command::Recent { limit } => print_stations(&catalog.recently_played(limit)?),

        Command::Sync { .. } | Command::Status | Command::Cancel | Command::Info => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let paths = match args.data_dir {
        Some(dir) => DataPaths::new(dir),
        None => DataPaths::platform_default().context("Could not determine a data directory")?,
    };

    let mut settings = WorkerSettings::default();
    if let Command::Sync { servers, .. } = &args.command
        && !servers.is_empty()
    {
        settings.hosts = servers.clone();
    }

    let client = ReqwestClient::new().context("Failed to create HTTP client")?;
    let worker = SyncWorker::open(client, paths, settings).context("Failed to open catalog")?;

    match args.command {
        Command::Sync { yes, keep, .. } => {
            if !args.quiet {
                println!(
                    "\n{}{} {}\n",
                    RADIO,
                    "radiosync".bold().magenta(),
                    "- Radio Station Catalog".dimmed()
                );
            }
            sync(&worker, yes, keep, args.quiet).await?;
        }

        Command::Status => status(&worker)?,

        Command::Cancel => {
            worker.cancel().context("Failed to cancel update")?;
            println!("{SUCCESS}Update cancelled");
        }

        Command::Info => info(&worker)?,

        command => {
            browse(&worker, command)?;
            if let Err(e) = worker.touch_foreground() {
                warn!(error = %e, "failed to record foreground activity");
            }
        }
    }

    Ok(())
}
