use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Amount, Movement, round_amount};

/// Group label for movements without a value for the grouping field.
pub const UNASSIGNED_GROUP: &str = "(sin asignar)";

/// A movement annotated with its resolved debit/credit and the running
/// balance after it. `movement.debe` and `movement.haber` always hold the
/// resolved values, so the record serializes flat in backend shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancedMovement {
    #[serde(flatten)]
    pub movement: Movement,
    pub saldo_acumulado: Amount,
}

impl BalancedMovement {
    pub fn debe(&self) -> Amount {
        self.movement.debe.unwrap_or(0.0)
    }

    pub fn haber(&self) -> Amount {
        self.movement.haber.unwrap_or(0.0)
    }

    pub fn id(&self) -> &str {
        &self.movement.id
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Annotation {
    debe: Amount,
    haber: Amount,
    saldo: Amount,
}

/// Indices of `movements` in chronological order.
/// The sort is stable, so fully identical keys keep their input order.
pub fn chronological_order(movements: &[Movement]) -> Vec<usize> {
    let mut keyed: Vec<_> = movements
        .iter()
        .enumerate()
        .map(|(index, movement)| (movement.chrono_key(), index))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, index)| index).collect()
}

/// Annotate every movement with `debe`, `haber` and `saldoAcumulado`.
///
/// The running balance is accumulated in chronological order, rounded to
/// cents after every step, but the output keeps the caller's order.
pub fn annotate_running_balance(movements: &[Movement]) -> Vec<BalancedMovement> {
    annotate_running_balance_from(movements, 0.0)
}

/// Same as [`annotate_running_balance`], starting from an opening balance.
pub fn annotate_running_balance_from(
    movements: &[Movement],
    opening: Amount,
) -> Vec<BalancedMovement> {
    let mut annotations: Vec<Option<Annotation>> = vec![None; movements.len()];
    let mut saldo = round_amount(opening);

    for index in chronological_order(movements) {
        let (debe, haber) = movements[index].debe_haber();
        saldo = round_amount(saldo + haber - debe);
        annotations[index] = Some(Annotation { debe, haber, saldo });
    }

    movements
        .iter()
        .zip(annotations)
        .map(|(movement, annotation)| {
            let annotation = annotation.unwrap_or_default();
            let mut movement = movement.clone();
            movement.debe = Some(annotation.debe);
            movement.haber = Some(annotation.haber);
            BalancedMovement {
                movement,
                saldo_acumulado: annotation.saldo,
            }
        })
        .collect()
}

/// Final balance of a set of movements, using the same rounding walk as
/// [`annotate_running_balance`].
pub fn compute_balance(movements: &[Movement]) -> Amount {
    chronological_order(movements)
        .into_iter()
        .fold(0.0, |saldo, index| {
            let (debe, haber) = movements[index].debe_haber();
            round_amount(saldo + haber - debe)
        })
}

/// Totals over an annotated statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub count: usize,
    pub total_debe: Amount,
    pub total_haber: Amount,
    pub saldo_final: Amount,
    pub desde: Option<DateTime<Utc>>,
    pub hasta: Option<DateTime<Utc>>,
}

/// Summarize an annotated statement. `saldo_final` is the balance after the
/// chronologically last movement, or `opening` when there are none.
pub fn summarize(balanced: &[BalancedMovement], opening: Amount) -> LedgerSummary {
    let total_debe = round_amount(balanced.iter().map(BalancedMovement::debe).sum());
    let total_haber = round_amount(balanced.iter().map(BalancedMovement::haber).sum());

    let saldo_final = balanced
        .iter()
        .max_by(|a, b| a.movement.chrono_key().cmp(&b.movement.chrono_key()))
        .map(|last| last.saldo_acumulado)
        .unwrap_or_else(|| round_amount(opening));

    let dates: Vec<DateTime<Utc>> = balanced
        .iter()
        .filter_map(|b| b.movement.fecha_utc())
        .collect();

    LedgerSummary {
        count: balanced.len(),
        total_debe,
        total_haber,
        saldo_final,
        desde: dates.iter().min().copied(),
        hasta: dates.iter().max().copied(),
    }
}

/// Field used to split a ledger into independent statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Cuenta,
    Proyecto,
    Moneda,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Cuenta => "cuenta",
            GroupBy::Proyecto => "proyecto",
            GroupBy::Moneda => "moneda",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cuenta" | "account" => Some(GroupBy::Cuenta),
            "proyecto" | "obra" | "project" => Some(GroupBy::Proyecto),
            "moneda" | "currency" => Some(GroupBy::Moneda),
            _ => None,
        }
    }

    pub fn key<'a>(&self, movement: &'a Movement) -> Option<&'a str> {
        match self {
            GroupBy::Cuenta => movement.cuenta.as_deref(),
            GroupBy::Proyecto => movement.proyecto.as_deref(),
            GroupBy::Moneda => movement.moneda.as_deref(),
        }
    }
}

impl std::fmt::Display for GroupBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One independent statement within a grouped ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerGroup {
    pub key: String,
    pub opening: Amount,
    pub movements: Vec<BalancedMovement>,
    pub summary: LedgerSummary,
}

/// Run the running-balance aggregation independently per group.
/// Groups come back sorted by key; within a group the input order is kept.
pub fn annotate_by_group(movements: &[Movement], group_by: GroupBy) -> Vec<LedgerGroup> {
    annotate_by_group_from(movements, group_by, &BTreeMap::new())
}

/// Closing balance per group, used as the opening of a later statement.
pub fn group_openings(movements: &[Movement], group_by: GroupBy) -> BTreeMap<String, Amount> {
    split_by_group(movements, group_by)
        .into_iter()
        .map(|(key, members)| (key, compute_balance(&members)))
        .collect()
}

/// Grouped aggregation where each group starts from its entry in
/// `openings` (0 when absent). A key with an opening but no movements
/// still yields a group, closing at its opening balance.
pub fn annotate_by_group_from(
    movements: &[Movement],
    group_by: GroupBy,
    openings: &BTreeMap<String, Amount>,
) -> Vec<LedgerGroup> {
    let mut groups = split_by_group(movements, group_by);
    for key in openings.keys() {
        groups.entry(key.clone()).or_default();
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let opening = openings.get(&key).copied().unwrap_or(0.0);
            let balanced = annotate_running_balance_from(&members, opening);
            let summary = summarize(&balanced, opening);
            LedgerGroup {
                key,
                opening,
                movements: balanced,
                summary,
            }
        })
        .collect()
}

fn split_by_group(movements: &[Movement], group_by: GroupBy) -> BTreeMap<String, Vec<Movement>> {
    let mut groups: BTreeMap<String, Vec<Movement>> = BTreeMap::new();
    for movement in movements {
        let key = group_by
            .key(movement)
            .unwrap_or(UNASSIGNED_GROUP)
            .to_string();
        groups.entry(key).or_default().push(movement.clone());
    }
    groups
}
