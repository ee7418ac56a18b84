//! neimscan - cash-gift envelope scanner
//!
//! Captures an envelope photo, recognizes the handwriting through the Clova
//! OCR service, extracts the donor name and amount, and keeps the confirmed
//! records in a hosted datastore with spreadsheet export.

mod app;
mod capture;
mod config;
mod export;
mod extract;
mod ocr;
mod session;
mod storage;

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::app::{EditOutcome, ScannerApp};
use crate::config::AppConfig;
use crate::export::{ExportFormat, ExportOptions};
use crate::storage::{ContributionRecord, RecordPatch, RecordStore};

/// neimscan - scan cash-gift envelopes into a ledger
#[derive(Parser, Debug)]
#[command(name = "neimscan")]
#[command(about = "Scan cash-gift envelopes: OCR, confirm, persist, export")]
struct Args {
    /// Path to the configuration file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan an envelope image and save the confirmed record
    Scan {
        /// Envelope image file (jpg/png)
        #[arg(short, long)]
        image: PathBuf,
        /// Event date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Override the extracted name
        #[arg(long)]
        name: Option<String>,
        /// Override the extracted amount (won)
        #[arg(long)]
        amount: Option<i64>,
        /// Override the extracted memo
        #[arg(long)]
        memo: Option<String>,
        /// Save without the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// List all stored records
    List,
    /// Search records by name or memo
    Search {
        query: String,
    },
    /// List records in a date range
    Range {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Export records to a spreadsheet or CSV file
    Export {
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Output file name
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Edit a stored record
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        amount: Option<i64>,
        #[arg(long)]
        memo: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete a stored record
    Delete {
        id: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Xlsx,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Xlsx => ExportFormat::Xlsx,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = load_or_create_config(args.config.as_deref());

    match args.command {
        Command::Scan {
            image,
            date,
            name,
            amount,
            memo,
            yes,
        } => run_scan(&config, image, date, name, amount, memo, yes).await,
        Command::List => {
            let app = ScannerApp::new(&config)?;
            app.refresh().await?;
            print_records(&app.cache().snapshot());
            Ok(())
        }
        Command::Search { query } => {
            let app = ScannerApp::new(&config)?;
            let records = app.store().search_records(&query).await?;
            print_records(&records);
            Ok(())
        }
        Command::Range { from, to } => {
            let app = ScannerApp::new(&config)?;
            let records = app.store().fetch_records_by_date_range(from, to).await?;
            print_records(&records);
            Ok(())
        }
        Command::Export {
            format,
            from,
            to,
            output,
        } => {
            let app = ScannerApp::new(&config)?;
            let records = app.refresh().await?;
            let date_range = match (from, to) {
                (Some(from), Some(to)) => Some((from, to)),
                (None, None) => None,
                _ => anyhow::bail!("--from and --to must be given together"),
            };
            let options = ExportOptions {
                format: format.map(Into::into).unwrap_or(config.export.format),
                file_name: output,
                date_range,
            };
            let out_dir = config
                .export
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("."));
            let (path, summary) = export::export_records(&records, &options, &out_dir)?;
            println!(
                "{}건 내보내기 완료 (총 {}원, 평균 {}원): {}",
                summary.count,
                summary.total,
                summary.average,
                path.display()
            );
            Ok(())
        }
        Command::Edit {
            id,
            name,
            amount,
            memo,
            date,
        } => {
            let patch = RecordPatch {
                name,
                amount,
                memo: memo.map(|m| if m.is_empty() { None } else { Some(m) }),
                date,
                image_data: None,
            };
            anyhow::ensure!(!patch.is_empty(), "nothing to change");
            let app = ScannerApp::new(&config)?;
            let updated = app.store().update_record(&id, patch).await?;
            println!("수정 완료:");
            print_records(std::slice::from_ref(&updated));
            Ok(())
        }
        Command::Delete { id } => {
            let app = ScannerApp::new(&config)?;
            app.store().delete_record(&id).await?;
            println!("삭제 완료: {id}");
            Ok(())
        }
    }
}

/// Load configuration from file or fall back to defaults, then resolve
/// environment overrides
fn load_or_create_config(path: Option<&std::path::Path>) -> AppConfig {
    let mut config = match path {
        Some(path) => config::load_config(path).unwrap_or_else(|e| {
            tracing::warn!("failed to load {:?}: {}; using defaults", path, e);
            AppConfig::default()
        }),
        None => match config::default_config_path() {
            Ok(path) if path.exists() => config::load_config(&path).unwrap_or_default(),
            _ => AppConfig::default(),
        },
    };
    config.apply_env_overrides();
    config
}

async fn run_scan(
    config: &AppConfig,
    image: PathBuf,
    date: Option<NaiveDate>,
    name: Option<String>,
    amount: Option<i64>,
    memo: Option<String>,
    yes: bool,
) -> Result<()> {
    let app = ScannerApp::new(config)?;
    let recognizer = ScannerApp::recognizer(config)?;

    info!("scanning {}", image.display());

    let saved = app
        .run_scan(&recognizer, image, &config.camera, |mut draft, extracted| {
            println!("인식 결과 (신뢰도 {}점):", extracted.confidence);
            println!("  이름: {}", blank_or(&draft.name));
            println!("  금액: {}원", draft.amount);
            println!("  메모: {}", blank_or(draft.memo.as_deref().unwrap_or("")));

            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(amount) = amount {
                draft.amount = amount;
            }
            if let Some(memo) = memo {
                draft.memo = Some(memo);
            }
            draft.date = Some(date.unwrap_or_else(|| Local::now().date_naive()));

            if yes || confirm("저장할까요?") {
                EditOutcome::Save(draft)
            } else {
                EditOutcome::Discard
            }
        })
        .await?;

    match saved {
        Some(record) => println!(
            "저장 완료: {} {}원 ({})",
            record.name, record.amount, record.date
        ),
        None => println!("저장하지 않았습니다."),
    }
    Ok(())
}

fn blank_or(value: &str) -> &str {
    if value.trim().is_empty() {
        "(없음)"
    } else {
        value
    }
}

/// Yes/no prompt on stdin, defaulting to no
fn confirm(question: &str) -> bool {
    print!("{question} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn print_records(records: &[ContributionRecord]) {
    if records.is_empty() {
        println!("기록이 없습니다.");
        return;
    }
    println!(
        "{:<38} {:<10} {:>10}  {:<10} {}",
        "ID", "이름", "금액", "날짜", "메모"
    );
    for record in records {
        println!(
            "{:<38} {:<10} {:>10}  {:<10} {}",
            record.id,
            record.name,
            record.amount,
            record.date,
            record.memo.as_deref().unwrap_or("")
        );
    }
    println!("총 {}건", records.len());
}
