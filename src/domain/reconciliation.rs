use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Amount, Movement, MovementId, RawDate, round_amount, to_cents};
use super::ledger::chronological_order;

/// One line of a bank statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankLine {
    pub fecha: Option<RawDate>,
    /// Signed: credits positive, debits negative
    pub monto: Amount,
    pub descripcion: Option<String>,
    pub referencia: Option<String>,
}

impl BankLine {
    pub fn new(fecha: impl Into<RawDate>, monto: Amount) -> Self {
        Self {
            fecha: Some(fecha.into()),
            monto,
            descripcion: None,
            referencia: None,
        }
    }

    pub fn with_descripcion(mut self, descripcion: impl Into<String>) -> Self {
        self.descripcion = Some(descripcion.into());
        self
    }

    pub fn with_referencia(mut self, referencia: impl Into<String>) -> Self {
        self.referencia = Some(referencia.into());
        self
    }

    pub fn fecha_utc(&self) -> Option<DateTime<Utc>> {
        self.fecha.as_ref().and_then(RawDate::to_utc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Maximum distance in days between a movement and its bank line
    pub tolerance_days: i64,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self { tolerance_days: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPair {
    pub movement_id: MovementId,
    /// Index into the bank lines passed to [`reconcile`]
    pub bank_line: usize,
    pub monto: Amount,
    pub day_difference: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub matched: Vec<MatchedPair>,
    pub unmatched_movements: Vec<MovementId>,
    pub unmatched_bank_lines: Vec<usize>,
    pub ledger_total: Amount,
    pub bank_total: Amount,
    pub difference: Amount,
}

impl ReconciliationReport {
    pub fn is_reconciled(&self) -> bool {
        self.unmatched_movements.is_empty()
            && self.unmatched_bank_lines.is_empty()
            && self.difference == 0.0
    }
}

/// Match ledger movements one-to-one against bank statement lines.
///
/// A pair needs the same signed amount to the cent and dates at most
/// `tolerance_days` apart. Movements are visited in chronological order and
/// each takes the closest free line (earliest line index on ties). Undated
/// movements or lines never match.
pub fn reconcile(
    movements: &[Movement],
    bank_lines: &[BankLine],
    options: ReconcileOptions,
) -> ReconciliationReport {
    let mut lines_by_cents: HashMap<i64, Vec<usize>> = HashMap::new();
    for (index, line) in bank_lines.iter().enumerate() {
        lines_by_cents
            .entry(to_cents(line.monto))
            .or_default()
            .push(index);
    }
    let line_dates: Vec<Option<DateTime<Utc>>> = bank_lines.iter().map(BankLine::fecha_utc).collect();

    let mut used = vec![false; bank_lines.len()];
    let mut matched = Vec::new();
    let mut unmatched_movements = Vec::new();

    for index in chronological_order(movements) {
        let movement = &movements[index];
        let signed = movement.signed_amount();

        let best = movement.fecha_utc().and_then(|fecha| {
            lines_by_cents
                .get(&to_cents(signed))
                .into_iter()
                .flatten()
                .filter(|&&line| !used[line])
                .filter_map(|&line| {
                    let line_date = line_dates[line]?;
                    let days = (fecha.date_naive() - line_date.date_naive())
                        .num_days()
                        .abs();
                    (days <= options.tolerance_days).then_some((days, line))
                })
                .min()
        });

        match best {
            Some((days, line)) => {
                used[line] = true;
                matched.push(MatchedPair {
                    movement_id: movement.id.clone(),
                    bank_line: line,
                    monto: signed,
                    day_difference: days,
                });
            }
            None => unmatched_movements.push(movement.id.clone()),
        }
    }

    let unmatched_bank_lines = used
        .iter()
        .enumerate()
        .filter(|(_, used)| !**used)
        .map(|(index, _)| index)
        .collect();

    let ledger_total = round_amount(movements.iter().map(Movement::signed_amount).sum());
    let bank_total = round_amount(bank_lines.iter().map(|l| round_amount(l.monto)).sum());

    ReconciliationReport {
        matched,
        unmatched_movements,
        unmatched_bank_lines,
        ledger_total,
        bank_total,
        difference: round_amount(ledger_total - bank_total),
    }
}
