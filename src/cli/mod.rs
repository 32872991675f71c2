use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{Read, stdin, stdout};
use tracing_subscriber::EnvFilter;

use crate::application::{LedgerService, MovementFilter, StatementReport};
use crate::domain::{
    BalancedMovement, GroupBy, LedgerSummary, ReconcileOptions, format_amount, parse_date_only,
    parse_date_text,
};
use crate::io::{
    Exporter, ImportOptions, ImportResult, Importer, chronological, display_fecha,
    read_bank_lines_csv, read_column_mapping, write_grouped_csv,
};

/// Saldos - running balances and reconciliation for cash accounts
#[derive(Parser)]
#[command(name = "saldos")]
#[command(about = "Account statements with running balances, imports and bank reconciliation")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "SALDOS_DATABASE", default_value = "saldos.db")]
    pub database: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Filters shared by the query commands
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Account or counterparty
    #[arg(long)]
    pub cuenta: Option<String>,

    /// Project / construction site
    #[arg(long)]
    pub proyecto: Option<String>,

    /// Currency
    #[arg(long)]
    pub moneda: Option<String>,

    /// From date inclusive (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long)]
    pub from_date: Option<String>,

    /// To date inclusive (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long)]
    pub to_date: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self, limit: Option<usize>) -> Result<MovementFilter> {
        let from_date = self
            .from_date
            .as_deref()
            .map(|s| parse_date_arg(s, false))
            .transpose()
            .context("Invalid from-date")?;
        let to_date = self
            .to_date
            .as_deref()
            .map(|s| parse_date_arg(s, true))
            .transpose()
            .context("Invalid to-date")?;

        Ok(MovementFilter {
            cuenta: self.cuenta.clone(),
            proyecto: self.proyecto.clone(),
            moneda: self.moneda.clone(),
            from_date,
            to_date,
            limit,
        })
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Import movements from CSV or JSON (reads stdin when no file is given)
    Import {
        /// Input file
        input: Option<String>,

        /// Input format: csv, json (defaults to the file extension, else csv)
        #[arg(long)]
        format: Option<String>,

        /// Validate without storing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip movements whose id already exists instead of reporting them
        #[arg(long)]
        skip_duplicates: bool,

        /// Column override, e.g. --map monto=Importe (repeatable)
        #[arg(long = "map", value_name = "FIELD=HEADER")]
        map: Vec<String>,
    },

    /// List stored movements in chronological order
    Movements {
        #[command(flatten)]
        filter: FilterArgs,

        /// Show only the most recent N movements
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Account statement with running balance
    Statement {
        #[command(flatten)]
        filter: FilterArgs,

        /// Split into independent balances: cuenta, proyecto, moneda
        #[arg(long)]
        group_by: Option<String>,

        /// Output format: table, csv, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Reconcile stored movements against a bank statement CSV
    Reconcile {
        /// Bank statement CSV
        bank: String,

        #[command(flatten)]
        filter: FilterArgs,

        /// Maximum days between a movement and its bank line
        #[arg(long, default_value_t = 3)]
        tolerance_days: i64,

        /// Column override for the bank file, e.g. --map monto=Importe
        #[arg(long = "map", value_name = "FIELD=HEADER")]
        map: Vec<String>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Delete a movement from the local snapshot
    Delete {
        /// Movement id
        id: String,
    },

    /// Show how the columns of a CSV file would be mapped
    Mapping {
        /// CSV file
        input: String,

        /// Column override, e.g. --map monto=Importe (repeatable)
        #[arg(long = "map", value_name = "FIELD=HEADER")]
        map: Vec<String>,
    },
}

impl Cli {
    /// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
    pub fn init_logging(&self) {
        let default_level = if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "warn"
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("saldos={}", default_level)));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .try_init();
    }

    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Import {
                input,
                format,
                dry_run,
                skip_duplicates,
                map,
            } => {
                let service = LedgerService::connect(&self.database).await?;
                let options = ImportOptions {
                    dry_run,
                    skip_duplicates,
                    mapping_overrides: map,
                };
                run_import_command(&service, input.as_deref(), format.as_deref(), options).await?;
            }

            Commands::Movements { filter, limit } => {
                let service = LedgerService::connect(&self.database).await?;
                run_movements_command(&service, filter.to_filter(limit)?).await?;
            }

            Commands::Statement {
                filter,
                group_by,
                format,
            } => {
                check_format(&format, STATEMENT_FORMATS)?;
                let service = LedgerService::connect(&self.database).await?;
                let group_by = group_by
                    .map(|g| {
                        GroupBy::from_str(&g).with_context(|| {
                            format!("Invalid group-by '{}'. Use cuenta, proyecto or moneda", g)
                        })
                    })
                    .transpose()?;
                run_statement_command(&service, filter.to_filter(None)?, group_by, &format)
                    .await?;
            }

            Commands::Reconcile {
                bank,
                filter,
                tolerance_days,
                map,
                format,
            } => {
                check_format(&format, RECONCILE_FORMATS)?;
                let service = LedgerService::connect(&self.database).await?;
                let options = ReconcileOptions { tolerance_days };
                run_reconcile_command(
                    &service,
                    &bank,
                    filter.to_filter(None)?,
                    options,
                    &map,
                    &format,
                )
                .await?;
            }

            Commands::Delete { id } => {
                let service = LedgerService::connect(&self.database).await?;
                let movement = service.delete_movement(&id).await?;
                println!(
                    "Deleted movement {} ({})",
                    movement.id,
                    format_amount(movement.signed_amount())
                );
            }

            Commands::Mapping { input, map } => {
                run_mapping_command(&input, &map)?;
            }
        }

        Ok(())
    }
}

const IMPORT_FORMATS: &[&str] = &["csv", "json"];
const STATEMENT_FORMATS: &[&str] = &["table", "csv", "json"];
const RECONCILE_FORMATS: &[&str] = &["table", "json"];

fn check_format(format: &str, valid: &[&str]) -> Result<()> {
    if !valid.contains(&format) {
        anyhow::bail!(
            "Invalid format '{}'. Valid formats: {}",
            format,
            valid.join(", ")
        );
    }
    Ok(())
}

fn open_input(input: Option<&str>) -> Result<Box<dyn Read>> {
    Ok(match input {
        Some(path) if path != "-" => {
            let file =
                File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
            Box::new(file)
        }
        _ => Box::new(stdin()),
    })
}

async fn run_import_command(
    service: &LedgerService,
    input: Option<&str>,
    format: Option<&str>,
    options: ImportOptions,
) -> Result<()> {
    let format = match format {
        Some(f) => f.to_lowercase(),
        None if input.is_some_and(|p| p.to_lowercase().ends_with(".json")) => "json".to_string(),
        None => "csv".to_string(),
    };
    let dry_run = options.dry_run;

    check_format(&format, IMPORT_FORMATS)?;

    let importer = Importer::new(service);
    let reader = open_input(input)?;

    let result = match format.as_str() {
        "json" => importer.import_movements_json(reader, options).await?,
        _ => importer.import_movements_csv(reader, options).await?,
    };

    print_import_result(&result, dry_run);
    Ok(())
}

fn print_import_result(result: &ImportResult, dry_run: bool) {
    if let Some(mapping) = &result.mapping {
        println!("Column mapping:");
        for (field, index) in &mapping.columns {
            println!("  {:<12} <- {}", field.as_str(), mapping.headers[*index]);
        }
        println!();
    }

    if dry_run {
        println!("Validation complete (nothing stored)");
    } else {
        println!("Import complete");
    }
    println!("  Imported: {}", result.imported);
    println!("  Skipped:  {}", result.skipped);
    println!("  Errors:   {}", result.errors.len());

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for error in result.errors.iter().take(10) {
            println!(
                "  Line {}: {}",
                error.line,
                error
                    .field
                    .as_ref()
                    .map(|f| format!("{}: ", f))
                    .unwrap_or_default()
                    + &error.error
            );
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more errors", result.errors.len() - 10);
        }
    }
}

async fn run_movements_command(service: &LedgerService, filter: MovementFilter) -> Result<()> {
    let movements = service.list_movements(&filter).await?;

    if movements.is_empty() {
        println!("No movements found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<26} {:>12} {:<15} DESCRIPTION",
        "DATE", "ID", "AMOUNT", "ACCOUNT"
    );
    println!("{}", "-".repeat(85));

    for movement in &movements {
        let date = movement
            .fecha_utc()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:<26} {:>12} {:<15} {}",
            date,
            truncate(&movement.id, 26),
            format_amount(movement.signed_amount()),
            truncate(movement.cuenta.as_deref().unwrap_or(""), 15),
            truncate(movement.descripcion.as_deref().unwrap_or(""), 30)
        );
    }
    Ok(())
}

async fn run_statement_command(
    service: &LedgerService,
    filter: MovementFilter,
    group_by: Option<GroupBy>,
    format: &str,
) -> Result<()> {
    let exporter = Exporter::new(service);

    match (group_by, format) {
        (None, "json") => {
            exporter.export_statement_json(&filter, stdout()).await?;
        }
        (None, "csv") => {
            exporter.export_statement_csv(&filter, stdout()).await?;
        }
        (Some(group_by), "json") => {
            let report = service.grouped_statement(&filter, group_by).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        (Some(group_by), "csv") => {
            let report = service.grouped_statement(&filter, group_by).await?;
            write_grouped_csv(&report, stdout())?;
        }
        (None, _) => {
            let report = service.statement(&filter).await?;
            print_statement_table(&report);
        }
        (Some(group_by), _) => {
            let report = service.grouped_statement(&filter, group_by).await?;
            if report.groups.is_empty() {
                println!("No movements found.");
            }
            for group in &report.groups {
                println!("== {}: {}", report.group_by, group.key);
                print_movement_rows(group.opening, &group.movements, &group.summary);
                println!();
            }
        }
    }
    Ok(())
}

fn print_statement_table(report: &StatementReport) {
    println!("Account Statement");
    match (report.from_date, report.to_date) {
        (Some(from), Some(to)) => println!(
            "Period: {} to {}",
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        ),
        (Some(from), None) => println!("Period: from {}", from.format("%Y-%m-%d")),
        (None, Some(to)) => println!("Period: until {}", to.format("%Y-%m-%d")),
        (None, None) => {}
    }
    println!();

    if report.movements.is_empty() {
        println!("No movements found.");
        println!("Balance: {}", format_amount(report.saldo_inicial));
        return;
    }

    print_movement_rows(report.saldo_inicial, &report.movements, &report.summary);
}

fn print_movement_rows(opening: f64, movements: &[BalancedMovement], summary: &LedgerSummary) {
    println!(
        "{:<12} {:<20} {:<28} {:>12} {:>12} {:>14}",
        "DATE", "ID", "DESCRIPTION", "DEBE", "HABER", "SALDO"
    );
    println!("{}", "-".repeat(103));

    if opening != 0.0 {
        println!(
            "{:<12} {:<20} {:<28} {:>12} {:>12} {:>14}",
            "",
            "",
            "Saldo inicial",
            "",
            "",
            format_amount(opening)
        );
    }

    for balanced in chronological(movements) {
        let date = display_fecha(balanced);
        println!(
            "{:<12} {:<20} {:<28} {:>12} {:>12} {:>14}",
            if date.is_empty() { "-".to_string() } else { date },
            truncate(balanced.id(), 20),
            truncate(balanced.movement.descripcion.as_deref().unwrap_or(""), 28),
            format_amount(balanced.debe()),
            format_amount(balanced.haber()),
            format_amount(balanced.saldo_acumulado)
        );
    }

    println!("{}", "-".repeat(103));
    println!(
        "{:<12} {:<20} {:<28} {:>12} {:>12} {:>14}",
        "TOTAL",
        format!("{} movements", summary.count),
        "",
        format_amount(summary.total_debe),
        format_amount(summary.total_haber),
        format_amount(summary.saldo_final)
    );
}

async fn run_reconcile_command(
    service: &LedgerService,
    bank_path: &str,
    filter: MovementFilter,
    options: ReconcileOptions,
    overrides: &[String],
    format: &str,
) -> Result<()> {
    let reader = open_input(Some(bank_path))?;
    let (bank_lines, errors) = read_bank_lines_csv(reader, overrides)?;
    for error in &errors {
        eprintln!("Skipping bank line {}: {}", error.line, error.error);
    }

    let report = service.reconcile(&filter, &bank_lines, options).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Reconciliation (tolerance: {} days)\n", options.tolerance_days);
        println!("Matched:              {}", report.matched.len());
        println!("Unmatched movements:  {}", report.unmatched_movements.len());
        println!("Unmatched bank lines: {}", report.unmatched_bank_lines.len());
        println!();
        println!("Ledger total: {:>14}", format_amount(report.ledger_total));
        println!("Bank total:   {:>14}", format_amount(report.bank_total));
        println!("Difference:   {:>14}", format_amount(report.difference));

        if !report.unmatched_movements.is_empty() {
            println!("\nMovements without a bank line:");
            for id in &report.unmatched_movements {
                println!("  - {}", id);
            }
        }
        if !report.unmatched_bank_lines.is_empty() {
            println!("\nBank lines without a movement:");
            for index in &report.unmatched_bank_lines {
                let line = &bank_lines[*index];
                println!(
                    "  - {} {:>12} {}",
                    line.fecha_utc()
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    format_amount(line.monto),
                    line.descripcion.as_deref().unwrap_or("")
                );
            }
        }
    }

    if !report.is_reconciled() {
        anyhow::bail!("Reconciliation found differences");
    }
    if format != "json" {
        println!("\nLedger and bank statement agree.");
    }
    Ok(())
}

fn run_mapping_command(input: &str, overrides: &[String]) -> Result<()> {
    let reader = open_input(Some(input))?;
    let mapping = read_column_mapping(reader, overrides)?;

    for (field, index) in &mapping.columns {
        println!("{:<12} <- {}", field.as_str(), mapping.headers[*index]);
    }
    for header in &mapping.unmapped {
        println!("{:<12} <- {}", "(ignored)", header);
    }
    if !mapping.has_amount() {
        println!("\nWarning: no amount column recognized; use --map monto=<header>");
    }
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

/// Parse a CLI date. Date-only values become midnight, or the last
/// millisecond of the day for inclusive upper bounds.
fn parse_date_arg(date_str: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let parsed = parse_date_text(date_str)
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD or DD/MM/YYYY", date_str))?;

    if end_of_day && parse_date_only(date_str).is_some() {
        Ok(parsed + chrono::Duration::days(1) - chrono::Duration::milliseconds(1))
    } else {
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_check_format() {
        assert!(check_format("table", STATEMENT_FORMATS).is_ok());
        assert!(check_format("csv", STATEMENT_FORMATS).is_ok());
        assert!(check_format("xml", STATEMENT_FORMATS).is_err());
        assert!(check_format("csv", RECONCILE_FORMATS).is_err());
        assert!(check_format("table", IMPORT_FORMATS).is_err());
    }

    #[test]
    fn test_statement_rejects_unknown_format() {
        let cli = Cli::try_parse_from(["saldos", "statement", "--format", "xml"]).unwrap();
        let Commands::Statement { format, .. } = cli.command else {
            panic!("expected statement command");
        };
        let err = check_format(&format, STATEMENT_FORMATS).unwrap_err();
        assert!(err.to_string().contains("Invalid format 'xml'"));
    }

    #[test]
    fn test_parse_date_arg_end_of_day() {
        assert_eq!(
            parse_date_arg("2024-01-15", true).unwrap(),
            utc("2024-01-15T23:59:59.999Z")
        );
        assert_eq!(
            parse_date_arg("15/01/2024", false).unwrap(),
            utc("2024-01-15T00:00:00Z")
        );
        assert_eq!(
            parse_date_arg("2024-01-15 10:30", true).unwrap(),
            utc("2024-01-15T10:30:00Z")
        );
    }

    #[test]
    fn test_parse_date_arg_epoch_is_exact() {
        // 2024-01-02T00:00:00Z in milliseconds
        assert_eq!(
            parse_date_arg("1704153600000", true).unwrap(),
            utc("2024-01-02T00:00:00Z")
        );
    }

    #[test]
    fn test_parse_date_arg_invalid() {
        assert!(parse_date_arg("mañana", false).is_err());
    }
}
