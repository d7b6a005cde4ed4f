//! Binary entry point for the clinicdb administrative CLI.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clinicdb::{
    admin::{checkpoint, open_store, stats, verify, VerifyLevel},
    backup,
    cli::import_export::{import_counts, run_export, run_import, ExportConfig, ImportConfig},
    storage::{CollectionName, Record, StoreHandle, Synchronous},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::ui::Ui;

#[derive(Parser, Debug)]
#[command(
    name = "clinicdb",
    version,
    about = "Administrative CLI for the clinic record store",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "CLINICDB_CONFIG",
        help = "CLI config file (defaults to <config dir>/clinicdb/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(flatten)]
    open: OpenArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct OpenArgs {
    #[arg(long, global = true, value_enum, help = "Journal synchronous mode override")]
    synchronous: Option<SynchronousArg>,

    #[arg(
        long,
        global = true,
        value_name = "FRAMES",
        help = "Journal frames that trigger an automatic checkpoint (0 disables)"
    )]
    checkpoint_threshold: Option<u64>,
}

#[derive(Args, Debug)]
struct DbArg {
    #[arg(value_name = "DB", help = "Data directory (defaults to database.default)")]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Print record, index and journal statistics")]
    Stats {
        #[command(flatten)]
        db: DbArg,
    },

    #[command(about = "Fold the journal into a fresh image")]
    Checkpoint {
        #[command(flatten)]
        db: DbArg,
    },

    #[command(about = "Verify the image, journal and secondary indexes")]
    Verify {
        #[command(flatten)]
        db: DbArg,

        #[arg(
            long,
            value_enum,
            default_value_t = VerifyLevelArg::Full,
            help = "Verification level"
        )]
        level: VerifyLevelArg,
    },

    #[command(about = "Print one record by primary key")]
    Get {
        #[arg(value_enum)]
        collection: CollectionArg,

        key: String,

        #[command(flatten)]
        db: DbArg,
    },

    #[command(about = "List a collection, optionally through a secondary index")]
    Scan {
        #[arg(value_enum)]
        collection: CollectionArg,

        #[command(flatten)]
        db: DbArg,

        #[arg(long, requires = "value", help = "Secondary index name (e.g. by_phone)")]
        index: Option<String>,

        #[arg(long, requires = "index", help = "Indexed value to match")]
        value: Option<String>,

        #[arg(long, requires = "value", help = "Match --value as a number")]
        number: bool,
    },

    #[command(about = "Write a JSON backup of every collection")]
    Export {
        #[command(flatten)]
        db: DbArg,

        #[arg(
            long,
            short,
            value_name = "FILE",
            help = "Output file (defaults to clinic-backup-YYYY-MM-DD.json)"
        )]
        output: Option<PathBuf>,

        #[arg(long, help = "Write compact JSON instead of indented")]
        compact: bool,
    },

    #[command(about = "Load a JSON backup into the store")]
    Import {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        db: DbArg,

        #[arg(long, help = "Create the store if it does not exist")]
        create: bool,

        #[arg(long, help = "Wipe every collection before importing")]
        replace: bool,
    },

    #[command(about = "Remove every record from every collection")]
    Wipe {
        #[command(flatten)]
        db: DbArg,

        #[arg(long, help = "Confirm the wipe")]
        yes: bool,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SynchronousArg {
    Full,
    Normal,
    Off,
}

impl From<SynchronousArg> for Synchronous {
    fn from(mode: SynchronousArg) -> Self {
        match mode {
            SynchronousArg::Full => Synchronous::Full,
            SynchronousArg::Normal => Synchronous::Normal,
            SynchronousArg::Off => Synchronous::Off,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum VerifyLevelArg {
    Fast,
    Full,
}

impl From<VerifyLevelArg> for VerifyLevel {
    fn from(level: VerifyLevelArg) -> Self {
        match level {
            VerifyLevelArg::Fast => VerifyLevel::Fast,
            VerifyLevelArg::Full => VerifyLevel::Full,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CollectionArg {
    Settings,
    Patients,
    Appointments,
    Encounters,
    Drafts,
}

impl From<CollectionArg> for CollectionName {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Settings => CollectionName::Settings,
            CollectionArg::Patients => CollectionName::Patients,
            CollectionArg::Appointments => CollectionName::Appointments,
            CollectionArg::Encounters => CollectionName::Encounters,
            CollectionArg::Drafts => CollectionName::Drafts,
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clinicdb=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.clone())?;
    if let Some(path) = config.source() {
        debug!(config = %path.display(), "cli config loaded");
    }
    let open_opts = config.open_options(cli.open.synchronous, cli.open.checkpoint_threshold);
    let ui = Ui::new();

    match cli.command {
        Command::Stats { db } => {
            let report = stats(resolve_db(db, &config)?, &open_opts)?;
            emit(cli.format, &report, || print_stats_text(&ui, &report))?;
        }
        Command::Checkpoint { db } => {
            let report = checkpoint(resolve_db(db, &config)?, &open_opts)?;
            emit(cli.format, &report, || {
                ui.done(&format!(
                    "checkpoint folded {} frames into a {} byte image ({} records, {:.2} ms)",
                    report.frames_folded, report.image_bytes, report.records, report.duration_ms
                ))
            })?;
        }
        Command::Verify { db, level } => {
            let report = verify(resolve_db(db, &config)?, &open_opts, level.into())?;
            emit(cli.format, &report, || {
                ui.report(
                    &format!("verify ({:?})", report.level),
                    &[
                        ("success", report.success.to_string()),
                        ("records", report.counts.records.to_string()),
                        ("index entries", report.counts.index_entries.to_string()),
                        ("replayed frames", report.counts.replayed_frames.to_string()),
                    ],
                );
                ui.findings(&report.findings);
            })?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Get { collection, key, db } => {
            let handle = StoreHandle::new(open_store(&resolve_db(db, &config)?, &open_opts)?);
            let collection = CollectionName::from(collection);
            match handle.get(collection, key.clone()).await? {
                Some(record) => print_records(&ui, cli.format, collection, &[record])?,
                None => {
                    ui.warn(&format!("no record '{key}' in {collection}"));
                    std::process::exit(3);
                }
            }
        }
        Command::Scan {
            collection,
            db,
            index,
            value,
            number,
        } => {
            let collection = CollectionName::from(collection);
            let handle = StoreHandle::new(open_store(&resolve_db(db, &config)?, &open_opts)?);
            let records = match (index, value) {
                (Some(index), Some(value)) => {
                    let value = parse_index_value(&value, number)?;
                    handle.scan_by_index(collection, index, value).await?
                }
                _ => handle.scan_all(collection).await?,
            };
            print_records(&ui, cli.format, collection, &records)?;
        }
        Command::Export { db, output, compact } => {
            let cfg = ExportConfig {
                db_path: resolve_db(db, &config)?,
                output,
                pretty: !compact,
            };
            let summary = run_export(&cfg, &open_opts)?;
            ui.done(&format!(
                "exported {} records to {} (exportedAt {})",
                summary.records,
                summary.path.display(),
                summary.exported_at
            ));
        }
        Command::Import {
            input,
            db,
            create,
            replace,
        } => {
            let cfg = ImportConfig {
                db_path: resolve_db(db, &config)?,
                create_if_missing: create,
                input,
                replace,
            };
            let summary = run_import(&cfg, &open_opts)?;
            if cli.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&summary.report)?);
            } else {
                let rows: Vec<_> = import_counts(&summary)
                    .into_iter()
                    .map(|(name, count)| (name.as_str(), count.to_string()))
                    .collect();
                ui.report("imported", &rows);
                ui.done(&format!("{} records imported", summary.report.total()));
            }
        }
        Command::Wipe { db, yes } => {
            if !yes {
                return Err("wipe deletes every record; pass --yes to confirm".into());
            }
            let store = open_store(&resolve_db(db, &config)?, &open_opts)?;
            let cleared = backup::wipe(&store).into_result()?;
            store.checkpoint()?;
            ui.done(&format!("cleared {} collections", cleared.len()));
        }
    }

    Ok(())
}

fn resolve_db(arg: DbArg, config: &CliConfig) -> Result<PathBuf, Box<dyn Error>> {
    arg.db_path
        .or_else(|| config.default_db().map(PathBuf::from))
        .ok_or_else(|| "no database given; pass DB or set database.default in the CLI config".into())
}

fn parse_index_value(raw: &str, number: bool) -> Result<Value, Box<dyn Error>> {
    if !number {
        return Ok(Value::from(raw));
    }
    let parsed: f64 = raw
        .parse()
        .map_err(|_| format!("--value '{raw}' is not a number"))?;
    Ok(Value::from(parsed))
}

fn print_records(
    ui: &Ui,
    format: OutputFormat,
    collection: CollectionName,
    records: &[Record],
) -> Result<(), Box<dyn Error>> {
    emit(format, &records, || ui.records(collection, records))
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: FnOnce(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_stats_text(ui: &Ui, report: &clinicdb::admin::StatsReport) {
    for collection in &report.store.collections {
        let mut rows = vec![
            ("records", collection.records.to_string()),
            ("primary key", collection.primary_key.to_string()),
        ];
        for index in &collection.indexes {
            rows.push((
                index.name,
                format!(
                    "{} ({} values, {} entries)",
                    index.field, index.values, index.entries
                ),
            ));
        }
        ui.report(collection.name.as_str(), &rows);
    }
    if let Some(journal) = &report.store.journal {
        ui.report(
            "journal",
            &[
                ("path", journal.path.clone()),
                ("size bytes", journal.size_bytes.to_string()),
                ("pending frames", journal.frames_since_checkpoint.to_string()),
                ("replayed frames", journal.replayed_frames.to_string()),
                ("torn tail", journal.torn_tail.to_string()),
            ],
        );
    }
    let image = if report.filesystem.image_exists {
        format!("{} bytes", report.filesystem.image_size_bytes)
    } else {
        "none".to_string()
    };
    ui.report(
        "files",
        &[
            ("dir", report.filesystem.dir.clone()),
            (
                "journal bytes",
                report.filesystem.journal_size_bytes.to_string(),
            ),
            ("image", image),
        ],
    );
}
