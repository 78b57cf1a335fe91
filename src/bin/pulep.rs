use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use pulep_eventos::{DataTable, FilterSet, WebScraper};

#[derive(Parser)]
#[command(name = "pulep")]
#[command(about = "Scraper for the public events module of the PULEP portal", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, ValueEnum)]
enum ExportFormat {
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the filter fields offered by the events listing form
    Filters {
        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Scrape events, optionally enriching each row with its detail page
    Scrape {
        #[arg(
            short = 'f',
            long = "filter",
            value_name = "CLAVE=VALOR",
            value_parser = parse_filter,
            help = "Filter to apply, repeatable"
        )]
        filters: Vec<(String, String)>,

        #[arg(long, help = "Also fetch and parse each event's detail page")]
        details: bool,

        #[arg(
            long,
            value_name = "N",
            help = "Maximum number of detail pages to fetch (0 = no cap)"
        )]
        max_details: Option<usize>,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: ExportFormat,

        #[arg(
            long,
            value_name = "DIR",
            default_value = ".",
            help = "Directory the CSV files are written to"
        )]
        out: PathBuf,
    },
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected CLAVE=VALOR, got '{s}'"))
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    let scraper = WebScraper::new().unwrap_or_else(|e| {
        log::error!("Error creating scraper: {}", e);
        process::exit(1);
    });

    match cli.command {
        Commands::Filters { format } => {
            log::info!("Fetching filter options from the events listing...");

            let fields = scraper.fetch_filter_options().unwrap_or_else(|e| {
                log::error!("Error fetching filter options: {}", e);
                process::exit(1);
            });

            match format {
                OutputFormat::Json => serialize_json(&fields),
                OutputFormat::Text => {
                    if fields.is_empty() {
                        println!("No filter fields detected.");
                    } else {
                        for field in &fields {
                            print!("{}", field);
                        }
                    }
                }
            }
        }

        Commands::Scrape {
            filters,
            details,
            max_details,
            format,
            out,
        } => {
            let filters = FilterSet::from_raw(filters);
            log::info!(
                "Scraping events with {} filter(s), details: {}",
                filters.len(),
                details
            );

            let result = scraper
                .scrape_events(&filters, details, max_details)
                .unwrap_or_else(|e| {
                    log::error!("Error scraping events: {}", e);
                    process::exit(1);
                });

            log::info!(
                "Done: {} summary row(s), {} detail record(s)",
                result.summary.len(),
                result.details.len()
            );

            match format {
                ExportFormat::Json => serialize_json(&result),
                ExportFormat::Text => {
                    let summary = DataTable::from_records(&result.summary);
                    if summary.is_empty() {
                        println!("No events found.");
                    } else {
                        println!("Summary ({} row(s)):", summary.len());
                        print!("{}", summary);
                    }
                    if details {
                        let detail = DataTable::from_records(&result.details);
                        println!("\nDetails ({} record(s)):", detail.len());
                        print!("{}", detail);
                    }
                }
                ExportFormat::Csv => {
                    let summary_path = out.join("pulep_eventos_resumen.csv");
                    let summary = DataTable::from_records(&result.summary);
                    fs::write(&summary_path, summary.to_csv()).unwrap_or_else(|e| {
                        log::error!("Error writing {}: {}", summary_path.display(), e);
                        process::exit(1);
                    });
                    println!("Wrote {}", summary_path.display());

                    if details {
                        let detail_path = out.join("pulep_eventos_detalle.csv");
                        let detail = DataTable::from_records(&result.details);
                        fs::write(&detail_path, detail.to_csv()).unwrap_or_else(|e| {
                            log::error!("Error writing {}: {}", detail_path.display(), e);
                            process::exit(1);
                        });
                        println!("Wrote {}", detail_path.display());
                    }
                }
            }
        }
    }
}
