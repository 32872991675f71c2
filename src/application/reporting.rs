use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Amount, BalancedMovement, GroupBy, LedgerGroup, LedgerSummary};

/// Account statement: annotated movements in caller order plus totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementReport {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    /// Balance carried from movements before `from_date`
    pub saldo_inicial: Amount,
    pub movements: Vec<BalancedMovement>,
    pub summary: LedgerSummary,
}

/// Statement split into independent running balances.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedStatementReport {
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub group_by: GroupBy,
    pub groups: Vec<LedgerGroup>,
}

impl GroupedStatementReport {
    pub fn movement_count(&self) -> usize {
        self.groups.iter().map(|g| g.movements.len()).sum()
    }
}
