//! testdata-sheets: CLI entry point.
//!
//! Inspects and edits spreadsheet test data from the command line.

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use testdata_sheets::datasource::DataSourceConfig;
use testdata_sheets::excel;
use testdata_sheets::google::SheetsClient;
use testdata_sheets::types::{Record, RecordSet};

#[derive(Parser)]
#[command(name = "testdata-sheets")]
#[command(about = "Header-keyed test data from Excel workbooks and Google Sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the records of a local sheet.
    Read {
        /// Path to the .xlsx or .xls workbook.
        #[arg(short, long)]
        file: PathBuf,

        /// Sheet name.
        #[arg(short, long)]
        sheet: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Set columns on an existing row (0 is the header row).
    Update {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        sheet: String,

        #[arg(short, long)]
        row: u32,

        /// Column assignment as `header=value`, repeatable.
        #[arg(long = "set", value_parser = parse_field, required = true)]
        fields: Vec<(String, String)>,
    },

    /// Append a row after the last populated row.
    Insert {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        sheet: String,

        /// Column assignment as `header=value`, repeatable.
        #[arg(long = "set", value_parser = parse_field, required = true)]
        fields: Vec<(String, String)>,
    },

    /// Print the records of a Google Sheets range.
    Remote {
        /// Service-account JSON key file.
        #[arg(short, long)]
        credentials: PathBuf,

        #[arg(long)]
        spreadsheet_id: String,

        /// Range such as `Sheet1!A1:D`.
        #[arg(short, long)]
        range: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Print the records of a named source from a config file.
    Source {
        name: String,

        /// YAML file with a `sources:` map.
        #[arg(short, long, default_value = "testdata.yaml")]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn parse_field(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected header=value, got {s:?}"))?;
    if key.trim().is_empty() {
        return Err(format!("empty header in {s:?}"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Read {
            file,
            sheet,
            format,
        } => {
            let set = excel::read_table(&file, &sheet)?;
            print_records(&set, format)?;
        }
        Command::Update {
            file,
            sheet,
            row,
            fields,
        } => {
            let fields: Record = fields.into_iter().collect();
            excel::update_row(&file, &sheet, row, &fields)?;
            println!("  {} updated row {row} in {sheet}", "✓".green());
        }
        Command::Insert {
            file,
            sheet,
            fields,
        } => {
            let fields: Record = fields.into_iter().collect();
            excel::insert_row(&file, &sheet, &fields)?;
            println!("  {} inserted row into {sheet}", "✓".green());
        }
        Command::Remote {
            credentials,
            spreadsheet_id,
            range,
            format,
        } => {
            let set = SheetsClient::new()?.read_table(&credentials, &spreadsheet_id, &range)?;
            print_records(&set, format)?;
        }
        Command::Source {
            name,
            config,
            format,
        } => {
            let config = DataSourceConfig::load(&config)?;
            let set = config.source(&name)?.read_table()?;
            print_records(&set, format)?;
        }
    }

    Ok(())
}

fn print_records(set: &RecordSet, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Table => print_table(set),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&set.records)?);
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout().lock());
            writer.write_record(&set.headers)?;
            for record in &set.records {
                writer.write_record(set.ordered_values(record))?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

fn print_table(set: &RecordSet) {
    if set.headers.is_empty() {
        println!("{}", "(no header row)".dimmed());
        return;
    }

    let widths: Vec<usize> = set
        .headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            set.records
                .iter()
                .map(|r| set.ordered_values(r)[i].chars().count())
                .chain(std::iter::once(header.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header_line: Vec<String> = set
        .headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{h:<w$}"))
        .collect();
    println!("{}", header_line.join("  ").bold());
    println!("{}", "─".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));

    for record in &set.records {
        let line: Vec<String> = set
            .ordered_values(record)
            .iter()
            .zip(&widths)
            .map(|(v, &w)| format!("{v:<w$}"))
            .collect();
        println!("{}", line.join("  "));
    }

    println!();
    println!("  {} {} records", "✓".green(), set.records.len().to_string().green());
}
