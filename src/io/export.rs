use anyhow::Result;
use std::io::Write;

use crate::application::{GroupedStatementReport, LedgerService, MovementFilter, StatementReport};
use crate::domain::{BalancedMovement, GroupBy, format_amount};

const STATEMENT_HEADER: [&str; 10] = [
    "id",
    "fecha",
    "cuenta",
    "proyecto",
    "moneda",
    "descripcion",
    "categoria",
    "debe",
    "haber",
    "saldo_acumulado",
];

/// Exporter for writing statements in machine-readable formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export an account statement as CSV, in chronological order.
    pub async fn export_statement_csv<W: Write>(
        &self,
        filter: &MovementFilter,
        writer: W,
    ) -> Result<usize> {
        let report = self.service.statement(filter).await?;
        write_statement_csv(&report, writer)
    }

    /// Export an account statement as pretty-printed JSON.
    pub async fn export_statement_json<W: Write>(
        &self,
        filter: &MovementFilter,
        mut writer: W,
    ) -> Result<StatementReport> {
        let report = self.service.statement(filter).await?;
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writeln!(writer)?;
        writer.flush()?;
        Ok(report)
    }

    /// Export a grouped statement as CSV with a leading group column.
    pub async fn export_grouped_csv<W: Write>(
        &self,
        filter: &MovementFilter,
        group_by: GroupBy,
        writer: W,
    ) -> Result<usize> {
        let report = self.service.grouped_statement(filter, group_by).await?;
        write_grouped_csv(&report, writer)
    }
}

/// Write a statement as CSV rows sorted chronologically.
pub fn write_statement_csv<W: Write>(report: &StatementReport, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(STATEMENT_HEADER)?;

    let mut count = 0;
    for balanced in chronological(&report.movements) {
        csv_writer.write_record(statement_row(balanced))?;
        count += 1;
    }

    csv_writer.flush()?;
    Ok(count)
}

/// Write a grouped statement as CSV; the first column is the group key.
pub fn write_grouped_csv<W: Write>(report: &GroupedStatementReport, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec![report.group_by.as_str()];
    header.extend(STATEMENT_HEADER);
    csv_writer.write_record(&header)?;

    let mut count = 0;
    for group in &report.groups {
        for balanced in chronological(&group.movements) {
            let mut row = vec![group.key.clone()];
            row.extend(statement_row(balanced));
            csv_writer.write_record(&row)?;
            count += 1;
        }
    }

    csv_writer.flush()?;
    Ok(count)
}

/// Statement rows keep the caller's order; files read better sorted.
pub fn chronological(movements: &[BalancedMovement]) -> Vec<&BalancedMovement> {
    let mut sorted: Vec<&BalancedMovement> = movements.iter().collect();
    sorted.sort_by_key(|b| b.movement.chrono_key());
    sorted
}

/// Date column: `YYYY-MM-DD` when parseable, empty otherwise.
pub fn display_fecha(balanced: &BalancedMovement) -> String {
    balanced
        .movement
        .fecha_utc()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

fn statement_row(balanced: &BalancedMovement) -> Vec<String> {
    let movement = &balanced.movement;
    vec![
        movement.id.clone(),
        display_fecha(balanced),
        movement.cuenta.clone().unwrap_or_default(),
        movement.proyecto.clone().unwrap_or_default(),
        movement.moneda.clone().unwrap_or_default(),
        movement.descripcion.clone().unwrap_or_default(),
        movement.categoria.clone().unwrap_or_default(),
        format_amount(balanced.debe()),
        format_amount(balanced.haber()),
        format_amount(balanced.saldo_acumulado),
    ]
}
