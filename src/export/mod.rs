//! Ledger Export
//!
//! Writes stored records to a spreadsheet (XLSX) or CSV file: one row per
//! record plus a trailing summary block with count, total and average.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_xlsxwriter::{Format, Workbook};
use thiserror::Error;
use tracing::info;

use crate::storage::ContributionRecord;

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Export parameters
#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Output file name; defaults to a date-stamped pattern
    pub file_name: Option<String>,
    /// Inclusive filter on the event date
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

/// Totals written into the trailing summary block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub count: usize,
    pub total: i64,
    /// Average amount rounded to the nearest integer; 0 for an empty list
    pub average: i64,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write spreadsheet: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const HEADERS: [&str; 6] = ["번호", "이름", "금액", "메모", "날짜", "등록일"];
const COLUMN_WIDTHS: [f64; 6] = [8.0, 15.0, 15.0, 20.0, 12.0, 12.0];
const SHEET_NAME: &str = "축의금 목록";

/// Compute the summary block values
pub fn summarize(records: &[&ContributionRecord]) -> ExportSummary {
    let total: i64 = records.iter().map(|r| r.amount).sum();
    let average = if records.is_empty() {
        0
    } else {
        (total as f64 / records.len() as f64).round() as i64
    };
    ExportSummary {
        count: records.len(),
        total,
        average,
    }
}

/// Keep the records whose event date falls inside the inclusive range
pub fn filter_by_range<'a>(
    records: &'a [ContributionRecord],
    range: Option<(NaiveDate, NaiveDate)>,
) -> Vec<&'a ContributionRecord> {
    records
        .iter()
        .filter(|r| match range {
            Some((start, end)) => r.date >= start && r.date <= end,
            None => true,
        })
        .collect()
}

/// Write the filtered records to `out_dir`, returning the path and summary
pub fn export_records(
    records: &[ContributionRecord],
    options: &ExportOptions,
    out_dir: &Path,
) -> Result<(PathBuf, ExportSummary), ExportError> {
    let filtered = filter_by_range(records, options.date_range);
    let summary = summarize(&filtered);

    let file_name = options
        .file_name
        .clone()
        .unwrap_or_else(|| default_file_name(options.format));
    let path = out_dir.join(file_name);

    match options.format {
        ExportFormat::Xlsx => write_xlsx(&filtered, summary, &path)?,
        ExportFormat::Csv => write_csv(&filtered, summary, &path)?,
    }

    info!(
        "exported {} records ({}원 total) to {}",
        summary.count,
        summary.total,
        path.display()
    );
    Ok((path, summary))
}

fn default_file_name(format: ExportFormat) -> String {
    format!(
        "축의금목록_{}.{}",
        Local::now().format("%Y-%m-%d"),
        format.extension()
    )
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y. %m. %d.").to_string()
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    format_date(at.date_naive())
}

fn write_xlsx(
    records: &[&ContributionRecord],
    summary: ExportSummary,
    path: &Path,
) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet.set_column_width(col as u16, *width)?;
    }

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet.write_string(0, col as u16, *header)?;
    }

    let amount_format = Format::new().set_num_format("#,##0");
    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        worksheet.write_number(row, 0, (i + 1) as f64)?;
        worksheet.write_string(row, 1, &record.name)?;
        worksheet.write_number_with_format(row, 2, record.amount as f64, &amount_format)?;
        worksheet.write_string(row, 3, record.memo.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 4, format_date(record.date))?;
        worksheet.write_string(row, 5, format_timestamp(record.created_at))?;
    }

    // Blank spacer row, then the summary block
    let total_row = (records.len() + 2) as u32;
    worksheet.write_string(total_row, 0, "총계")?;
    worksheet.write_string(total_row, 1, format!("{}건", summary.count))?;
    worksheet.write_number_with_format(total_row, 2, summary.total as f64, &amount_format)?;
    worksheet.write_string(total_row + 1, 0, "평균")?;
    worksheet.write_number_with_format(total_row + 1, 2, summary.average as f64, &amount_format)?;

    workbook.save(path)?;
    Ok(())
}

fn write_csv(
    records: &[&ContributionRecord],
    summary: ExportSummary,
    path: &Path,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(HEADERS)?;

    for (i, record) in records.iter().enumerate() {
        writer.write_record([
            (i + 1).to_string(),
            record.name.clone(),
            record.amount.to_string(),
            record.memo.clone().unwrap_or_default(),
            format_date(record.date),
            format_timestamp(record.created_at),
        ])?;
    }

    writer.write_record(["", "", "", "", "", ""])?;
    writer.write_record([
        "총계".to_string(),
        format!("{}건", summary.count),
        summary.total.to_string(),
        String::new(),
        String::new(),
        String::new(),
    ])?;
    writer.write_record([
        "평균".to_string(),
        String::new(),
        summary.average.to_string(),
        String::new(),
        String::new(),
        String::new(),
    ])?;

    writer.flush()?;
    Ok(())
}
