use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod filter;
mod loader;
mod metrics;
mod models;
mod report;

use filter::{FilterSelection, ALL_SERVICES};
use loader::{Dataset, DatasetCache};

#[derive(Parser)]
#[command(name = "concierge-dashboard")]
#[command(about = "Booking analytics for the Club Concierge product catalogue", long_about = None)]
struct Cli {
    /// Bookings CSV to analyse
    #[arg(
        long,
        global = true,
        env = "CONCIERGE_DATA",
        default_value = "club_concierge_product_performance.csv"
    )]
    data: PathBuf,
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the service selector options
    Services,
    /// Print KPIs and breakdowns for a filter selection
    Summary {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Change filters interactively from stdin
    Explore,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long, default_value = ALL_SERVICES)]
    service: String,
    /// First booking date to include (defaults to the earliest booking)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last booking date to include (defaults to the latest booking)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl FilterArgs {
    fn selection(&self, dataset: &Dataset) -> FilterSelection {
        let mut selection = FilterSelection::default();
        selection.set_service_filter(&self.service);
        if let Some((first, last)) = dataset.date_bounds() {
            if self.from.is_some() || self.to.is_some() {
                selection.set_date_range(self.from.unwrap_or(first), self.to.unwrap_or(last));
            }
        }
        selection
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut cache = DatasetCache::new();

    match cli.command {
        Commands::Services => {
            let dataset = load(&mut cache, &cli.data)?;
            println!("{ALL_SERVICES}");
            for service in dataset.services() {
                println!("{service}");
            }
        }
        Commands::Summary { filters, format } => {
            let dataset = load(&mut cache, &cli.data)?;
            let results = metrics::compute_results(&dataset, &filters.selection(&dataset));
            match format {
                OutputFormat::Text => print!("{}", report::render_summary(&results)),
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&results).context("failed to encode results")?
                ),
            }
        }
        Commands::Report { filters, out } => {
            let dataset = load(&mut cache, &cli.data)?;
            let results = metrics::compute_results(&dataset, &filters.selection(&dataset));
            let report =
                report::build_report(&dataset.source().display().to_string(), &results);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Explore => {
            let stdin = std::io::stdin();
            let interactive = stdin.is_terminal();
            explore(&mut cache, &cli.data, stdin.lock(), interactive)?;
        }
    }

    Ok(())
}

fn load(cache: &mut DatasetCache, path: &Path) -> anyhow::Result<Arc<Dataset>> {
    cache
        .get_or_load(path)
        .with_context(|| format!("could not load bookings from {}", path.display()))
}

enum ExploreCommand {
    Service(String),
    Range(NaiveDate, NaiveDate),
    Reset,
    Show,
    Reload,
    Help,
    Quit,
}

fn parse_command(line: &str) -> anyhow::Result<ExploreCommand> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(ExploreCommand::Show);
    };

    let command = match verb {
        "service" => {
            let name = parts.collect::<Vec<_>>().join(" ");
            ExploreCommand::Service(if name.is_empty() {
                ALL_SERVICES.to_string()
            } else {
                name
            })
        }
        "range" => {
            let (Some(start), Some(end)) = (parts.next(), parts.next()) else {
                bail!("usage: range <YYYY-MM-DD> <YYYY-MM-DD>");
            };
            ExploreCommand::Range(
                start.parse::<NaiveDate>().with_context(|| format!("bad date {start:?}"))?,
                end.parse::<NaiveDate>().with_context(|| format!("bad date {end:?}"))?,
            )
        }
        "reset" => ExploreCommand::Reset,
        "show" => ExploreCommand::Show,
        "reload" => ExploreCommand::Reload,
        "help" | "?" => ExploreCommand::Help,
        "quit" | "exit" => ExploreCommand::Quit,
        other => bail!("unknown command {other:?}, try `help`"),
    };
    Ok(command)
}

const EXPLORE_HELP: &str = "\
commands:
  service <name|All>      filter by service
  range <from> <to>       inclusive booking date range
  reset                   clear filters
  show                    recompute with current filters
  reload                  drop the cached dataset
  quit";

fn render_view(dataset: &Dataset, selection: &FilterSelection) -> String {
    if dataset.is_empty() {
        format!("{} has no bookings.\n", dataset.source().display())
    } else {
        report::render_summary(&metrics::compute_results(dataset, selection))
    }
}

/// Reloads through the cache, keeping `current` when the source has
/// become unreadable.
fn refresh(cache: &mut DatasetCache, path: &Path, current: Arc<Dataset>) -> Arc<Dataset> {
    match load(cache, path) {
        Ok(dataset) => dataset,
        Err(err) => {
            warn!(path = %path.display(), "reload failed, keeping previous bookings");
            eprintln!("{err:#}");
            current
        }
    }
}

/// Reads filter changes line by line and recomputes after each one.
fn explore(
    cache: &mut DatasetCache,
    path: &Path,
    input: impl BufRead,
    interactive: bool,
) -> anyhow::Result<()> {
    let mut selection = FilterSelection::default();

    let mut dataset = load(cache, path)?;
    print!("{}", render_view(&dataset, &selection));

    let mut lines = input.lines();
    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read command")?;

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("{err:#}");
                continue;
            }
        };

        match command {
            ExploreCommand::Service(name) => selection.set_service_filter(&name),
            ExploreCommand::Range(start, end) => selection.set_date_range(start, end),
            ExploreCommand::Reset => selection.reset(),
            ExploreCommand::Show => {}
            ExploreCommand::Reload => {
                cache.invalidate(path);
                debug!(cached = cache.len(), "dropped cached dataset");
            }
            ExploreCommand::Help => {
                println!("{EXPLORE_HELP}");
                continue;
            }
            ExploreCommand::Quit => break,
        }

        dataset = refresh(cache, path, dataset);
        println!();
        print!("{}", render_view(&dataset, &selection));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explore_commands() {
        assert!(matches!(
            parse_command("service Private Chef").unwrap(),
            ExploreCommand::Service(name) if name == "Private Chef"
        ));
        assert!(matches!(
            parse_command("service").unwrap(),
            ExploreCommand::Service(name) if name == ALL_SERVICES
        ));
        assert!(matches!(
            parse_command("range 2024-01-01 2024-02-01").unwrap(),
            ExploreCommand::Range(start, end)
                if start == NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    && end == NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
        ));
        assert!(matches!(parse_command("").unwrap(), ExploreCommand::Show));
        assert!(matches!(parse_command("exit").unwrap(), ExploreCommand::Quit));
    }

    #[test]
    fn rejects_bad_explore_commands() {
        assert!(parse_command("range 2024-01-01").is_err());
        assert!(parse_command("range yesterday today").is_err());
        assert!(parse_command("launch").is_err());
    }

    #[test]
    fn partial_date_flags_fill_from_dataset_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookings.csv");
        std::fs::write(
            &path,
            "BookingID,BookingDate,Service,CustomerType,Revenue,CustomerSatisfaction,HandledByCallCenter\n\
             B1,2024-01-05,Spa,Regular,100,4,Yes\n\
             B2,2024-04-10,Gym,Regular,100,4,No\n",
        )
        .unwrap();
        let dataset = loader::load_bookings(&path).unwrap();

        let args = FilterArgs {
            service: "Spa".to_string(),
            from: NaiveDate::from_ymd_opt(2024, 2, 1),
            to: None,
        };
        let selection = args.selection(&dataset);
        let range = selection.range.unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 4, 10).unwrap());
        assert_eq!(selection.service, filter::ServiceFilter::Named("Spa".to_string()));
    }

    #[test]
    fn explore_session_runs_to_quit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookings.csv");
        std::fs::write(
            &path,
            "BookingID,BookingDate,Service,CustomerType,Revenue,CustomerSatisfaction,HandledByCallCenter\n\
             B1,2024-01-05,Spa,Regular,100,4,Yes\n",
        )
        .unwrap();

        let mut cache = DatasetCache::new();
        let input = std::io::Cursor::new("service Spa\nrange 2024-01-01 2024-01-31\nbogus\nreload\nquit\n");
        explore(&mut cache, &path, input, false).unwrap();
        assert_eq!(cache.len(), 1);
    }

    const HEADER: &str =
        "BookingID,BookingDate,Service,CustomerType,Revenue,CustomerSatisfaction,HandledByCallCenter";

    #[test]
    fn refresh_keeps_last_good_dataset_when_source_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookings.csv");
        std::fs::write(&path, format!("{HEADER}\nB1,2024-01-05,Spa,Regular,100,4,Yes\n")).unwrap();

        let mut cache = DatasetCache::new();
        let good = load(&mut cache, &path).unwrap();

        std::fs::write(&path, format!("{HEADER}\nB1,someday,Spa,Regular,100,4,Yes\n")).unwrap();
        cache.invalidate(&path);
        let kept = refresh(&mut cache, &path, Arc::clone(&good));
        assert!(Arc::ptr_eq(&good, &kept));

        std::fs::write(&path, format!("{HEADER}\nB2,2024-02-01,Gym,Regular,50,3,No\n")).unwrap();
        let fresh = refresh(&mut cache, &path, kept);
        assert!(!Arc::ptr_eq(&good, &fresh));
        assert_eq!(fresh.records()[0].booking_id, "B2");
    }

    #[test]
    fn empty_dataset_renders_the_same_message_every_pass() {
        let dataset = Dataset::new(PathBuf::from("empty.csv"), Vec::new());
        let mut selection = FilterSelection::default();
        let first = render_view(&dataset, &selection);
        selection.set_service_filter("Spa");
        assert_eq!(first, "empty.csv has no bookings.\n");
        assert_eq!(render_view(&dataset, &selection), first);
    }

    #[test]
    fn explore_survives_a_missing_source_after_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookings.csv");
        std::fs::write(&path, format!("{HEADER}\nB1,2024-01-05,Spa,Regular,100,4,Yes\n")).unwrap();

        let mut cache = DatasetCache::new();
        let good = load(&mut cache, &path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let kept = refresh(&mut cache, &path, Arc::clone(&good));
        assert!(Arc::ptr_eq(&good, &kept));
    }
}
