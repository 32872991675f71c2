use anyhow::{Context, Result};
use std::io::Read;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::{AppError, LedgerService};
use crate::domain::{Amount, BankLine, Movement, RawDate, parse_amount, parse_date_text};
use crate::io::mapping::{ColumnMapping, MovementField, guess_column_mapping};

/// Result of an import operation
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportError>,
    pub mapping: Option<ColumnMapping>,
}

/// Error that occurred during import
#[derive(Debug, Clone, PartialEq)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

impl ImportError {
    fn new(line: usize, field: Option<MovementField>, error: impl Into<String>) -> Self {
        Self {
            line,
            field: field.map(|f| f.as_str().to_string()),
            error: error.into(),
        }
    }
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub skip_duplicates: bool,
    /// `field=header` overrides applied on top of the guessed mapping
    pub mapping_overrides: Vec<String>,
}

/// Importer for loading movements into the snapshot store
pub struct Importer<'a> {
    service: &'a LedgerService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Import movements from CSV, guessing the column mapping from the header.
    pub async fn import_movements_csv<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let MappedCsv {
            mapping,
            scope,
            rows,
        } = read_mapped_csv(reader, &options.mapping_overrides)?;
        if !mapping.has_amount() {
            anyhow::bail!(
                "No amount column found (headers: {})",
                mapping.headers.join(", ")
            );
        }
        if !mapping.unmapped.is_empty() {
            debug!(columns = ?mapping.unmapped, "ignoring unmapped columns");
        }

        let mut result = ImportResult::default();
        for (line, row) in rows {
            let row = match row {
                Ok(row) => row,
                Err(error) => {
                    result.errors.push(error);
                    continue;
                }
            };
            match row_to_movement(&row, &mapping, &scope, line) {
                Ok(movement) => self.store(movement, line, &options, &mut result).await,
                Err(error) => result.errors.push(error),
            }
        }

        info!(
            imported = result.imported,
            skipped = result.skipped,
            errors = result.errors.len(),
            dry_run = options.dry_run,
            "CSV import finished"
        );
        result.mapping = Some(mapping);
        Ok(result)
    }

    /// Import a JSON array of movements in backend shape.
    pub async fn import_movements_json<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let movements: Vec<Movement> =
            serde_json::from_reader(reader).context("Expected a JSON array of movements")?;

        let mut result = ImportResult::default();
        for (index, movement) in movements.into_iter().enumerate() {
            let line = index + 1;
            if movement.id.is_empty() {
                result
                    .errors
                    .push(ImportError::new(line, Some(MovementField::Id), "missing id"));
                continue;
            }
            self.store(movement, line, &options, &mut result).await;
        }

        info!(
            imported = result.imported,
            skipped = result.skipped,
            errors = result.errors.len(),
            dry_run = options.dry_run,
            "JSON import finished"
        );
        Ok(result)
    }

    async fn store(
        &self,
        movement: Movement,
        line: usize,
        options: &ImportOptions,
        result: &mut ImportResult,
    ) {
        if options.dry_run {
            result.imported += 1;
            return;
        }

        match self.service.record_movement(&movement).await {
            Ok(()) => result.imported += 1,
            Err(AppError::DuplicateMovement(id)) if options.skip_duplicates => {
                debug!(%id, line, "skipping duplicate movement");
                result.skipped += 1;
            }
            Err(e) => {
                warn!(line, error = %e, "movement not imported");
                result.errors.push(ImportError::new(line, None, e.to_string()));
            }
        }
    }
}

/// Read bank statement lines for reconciliation. Rows that cannot be
/// parsed are returned as errors alongside the good lines.
pub fn read_bank_lines_csv<R: Read>(
    reader: R,
    mapping_overrides: &[String],
) -> Result<(Vec<BankLine>, Vec<ImportError>)> {
    let MappedCsv {
        mapping,
        scope,
        rows,
    } = read_mapped_csv(reader, mapping_overrides)?;
    if !mapping.has_amount() {
        anyhow::bail!(
            "No amount column found in bank statement (headers: {})",
            mapping.headers.join(", ")
        );
    }

    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for (line, row) in rows {
        let parsed = row.and_then(|row| {
            let movement = row_to_movement(&row, &mapping, &scope, line)?;
            Ok(BankLine {
                fecha: movement.fecha.clone(),
                monto: movement.signed_amount(),
                descripcion: movement.descripcion.clone(),
                referencia: cell(&row, &mapping, MovementField::Referencia).map(str::to_string),
            })
        });
        match parsed {
            Ok(bank_line) => lines.push(bank_line),
            Err(error) => errors.push(error),
        }
    }

    debug!(lines = lines.len(), errors = errors.len(), "read bank statement");
    Ok((lines, errors))
}

/// Column mapping a CSV file would be imported with, overrides applied.
pub fn read_column_mapping<R: Read>(
    reader: R,
    mapping_overrides: &[String],
) -> Result<ColumnMapping> {
    Ok(read_mapped_csv(reader, mapping_overrides)?.mapping)
}

type Row = Vec<String>;

/// A parsed CSV file. Line numbers are 1-based and count the header.
struct MappedCsv {
    mapping: ColumnMapping,
    /// Prefix for ids generated for rows of this file
    scope: String,
    rows: Vec<(usize, Result<Row, ImportError>)>,
}

fn read_mapped_csv<R: Read>(mut reader: R, overrides: &[String]) -> Result<MappedCsv> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .context("Failed to read CSV input")?;

    let delimiter = sniff_delimiter(&text);
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(str::to_string)
        .collect();

    let mut mapping = guess_column_mapping(&headers);
    for spec in overrides {
        mapping.apply_override(spec)?;
    }

    let rows = csv_reader
        .records()
        .enumerate()
        .map(|(index, record)| {
            let line = index + 2; // +2 for header and 0-indexing
            let row = record
                .map(|r| r.iter().map(str::to_string).collect::<Row>())
                .map_err(|e| ImportError::new(line, None, format!("CSV parse error: {}", e)));
            (line, row)
        })
        .filter(|(_, row)| !matches!(row, Ok(cells) if cells.iter().all(|c: &String| c.is_empty())))
        .collect();

    Ok(MappedCsv {
        mapping,
        scope: import_scope(&text),
        rows,
    })
}

/// Content-derived prefix for generated row ids: different files never
/// collide, while re-importing the same file yields the same ids.
fn import_scope(text: &str) -> String {
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes()).simple().to_string();
    format!("csv-{}", &digest[..12])
}

/// Pick `;`, tab or `,` by counting occurrences in the header line.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    [b';', b'\t', b',']
        .into_iter()
        .max_by_key(|d| (header.matches(*d as char).count(), *d == b','))
        .filter(|d| header.contains(*d as char))
        .unwrap_or(b',')
}

fn cell<'r>(row: &'r Row, mapping: &ColumnMapping, field: MovementField) -> Option<&'r str> {
    mapping
        .get(field)
        .and_then(|index| row.get(index))
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn amount_cell(
    row: &Row,
    mapping: &ColumnMapping,
    field: MovementField,
    line: usize,
) -> Result<Option<Amount>, ImportError> {
    cell(row, mapping, field)
        .map(|value| {
            parse_amount(value).map_err(|e| {
                ImportError::new(line, Some(field), format!("Invalid amount '{}': {}", value, e))
            })
        })
        .transpose()
}

fn date_cell(
    row: &Row,
    mapping: &ColumnMapping,
    field: MovementField,
    line: usize,
) -> Result<Option<RawDate>, ImportError> {
    match cell(row, mapping, field) {
        Some(value) if parse_date_text(value).is_none() => Err(ImportError::new(
            line,
            Some(field),
            format!("Invalid date '{}'", value),
        )),
        Some(value) => Ok(Some(RawDate::Text(value.to_string()))),
        None => Ok(None),
    }
}

/// Build a movement from one CSV row. Rows without an id column value get
/// `<scope>-<line>`.
fn row_to_movement(
    row: &Row,
    mapping: &ColumnMapping,
    scope: &str,
    line: usize,
) -> Result<Movement, ImportError> {
    let id = cell(row, mapping, MovementField::Id)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", scope, line));

    let mut movement = Movement::new(id);
    movement.monto = amount_cell(row, mapping, MovementField::Monto, line)?;
    movement.monto_cc = amount_cell(row, mapping, MovementField::MontoCc, line)?;
    movement.debe = amount_cell(row, mapping, MovementField::Debe, line)?;
    movement.haber = amount_cell(row, mapping, MovementField::Haber, line)?;
    movement.fecha = date_cell(row, mapping, MovementField::Fecha, line)?;

    if let Some(created_at) = date_cell(row, mapping, MovementField::CreatedAt, line)? {
        movement = movement.with_created_at(created_at);
    }

    if !movement.has_amount() {
        return Err(ImportError::new(line, None, "row has no amount"));
    }

    let text = |field: MovementField| cell(row, mapping, field).map(str::to_string);
    movement.descripcion = text(MovementField::Descripcion);
    movement.cuenta = text(MovementField::Cuenta);
    movement.proyecto = text(MovementField::Proyecto);
    movement.moneda = text(MovementField::Moneda);
    movement.categoria = text(MovementField::Categoria);

    Ok(movement)
}
