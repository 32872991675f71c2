use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::domain::{
    BankLine, GroupBy, Movement, ReconcileOptions, ReconciliationReport, annotate_by_group_from,
    annotate_running_balance_from, chronological_order, compute_balance, group_openings,
    reconcile, summarize, LedgerSummary,
};
use crate::storage::{MovementQuery, Repository};

use super::{AppError, GroupedStatementReport, StatementReport};

/// Application service providing high-level operations over the movement
/// snapshot. This is the primary interface for any client (CLI, API, etc.).
pub struct LedgerService {
    repo: Repository,
}

/// Filter for querying movements.
///
/// Date bounds apply to the parsed `fecha`; undated movements count as
/// epoch 0, so they precede any `from_date`.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub cuenta: Option<String>,
    pub proyecto: Option<String>,
    pub moneda: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MovementFilter {
    fn query(&self) -> MovementQuery<'_> {
        MovementQuery {
            cuenta: self.cuenta.as_deref(),
            proyecto: self.proyecto.as_deref(),
            moneda: self.moneda.as_deref(),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from > to {
                return Err(AppError::InvalidDateRange { from, to });
            }
        }
        Ok(())
    }

    fn before_range(&self, movement: &Movement) -> bool {
        self.from_date
            .is_some_and(|from| movement.chrono_key().fecha < from.timestamp_millis())
    }

    fn after_range(&self, movement: &Movement) -> bool {
        self.to_date
            .is_some_and(|to| movement.chrono_key().fecha > to.timestamp_millis())
    }
}

/// Movements matching the column filters, split by the date range.
struct Partition {
    before: Vec<Movement>,
    within: Vec<Movement>,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Movement operations
    // ========================

    /// Store a movement in the snapshot.
    pub async fn record_movement(&self, movement: &Movement) -> Result<(), AppError> {
        if movement.id.is_empty() {
            return Err(AppError::MissingMovementId);
        }
        if self.repo.movement_exists(&movement.id).await? {
            return Err(AppError::DuplicateMovement(movement.id.clone()));
        }

        self.repo.save_movement(movement).await?;
        debug!(id = %movement.id, "recorded movement");
        Ok(())
    }

    /// Get a movement by id.
    pub async fn get_movement(&self, id: &str) -> Result<Movement, AppError> {
        self.repo
            .get_movement(id)
            .await?
            .ok_or_else(|| AppError::MovementNotFound(id.to_string()))
    }

    /// Remove a movement from the snapshot, returning it.
    pub async fn delete_movement(&self, id: &str) -> Result<Movement, AppError> {
        let movement = self.get_movement(id).await?;
        self.repo.delete_movement(id).await?;
        info!(id, "deleted movement");
        Ok(movement)
    }

    /// List movements in chronological order. `limit` keeps the most recent.
    pub async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, AppError> {
        let Partition { within, .. } = self.partition(filter).await?;

        let mut ordered: Vec<Movement> = chronological_order(&within)
            .into_iter()
            .map(|index| within[index].clone())
            .collect();

        if let Some(limit) = filter.limit {
            let skip = ordered.len().saturating_sub(limit);
            ordered.drain(..skip);
        }
        Ok(ordered)
    }

    pub async fn count_movements(&self) -> Result<i64, AppError> {
        Ok(self.repo.count_movements().await?)
    }

    // ========================
    // Statement operations
    // ========================

    /// Running-balance statement for the filtered movements. Movements before
    /// `from_date` are folded into the opening balance.
    pub async fn statement(&self, filter: &MovementFilter) -> Result<StatementReport, AppError> {
        let Partition { before, within } = self.partition(filter).await?;

        let saldo_inicial = compute_balance(&before);
        let movements = annotate_running_balance_from(&within, saldo_inicial);
        let summary = summarize(&movements, saldo_inicial);

        debug!(
            count = summary.count,
            saldo_inicial,
            saldo_final = summary.saldo_final,
            "built statement"
        );

        Ok(StatementReport {
            from_date: filter.from_date,
            to_date: filter.to_date,
            saldo_inicial,
            movements,
            summary,
        })
    }

    /// Statement split per account, project or currency.
    pub async fn grouped_statement(
        &self,
        filter: &MovementFilter,
        group_by: GroupBy,
    ) -> Result<GroupedStatementReport, AppError> {
        let Partition { before, within } = self.partition(filter).await?;

        let openings = group_openings(&before, group_by);
        let groups = annotate_by_group_from(&within, group_by, &openings);

        debug!(groups = groups.len(), %group_by, "built grouped statement");

        Ok(GroupedStatementReport {
            from_date: filter.from_date,
            to_date: filter.to_date,
            group_by,
            groups,
        })
    }

    /// Totals only.
    pub async fn summary(&self, filter: &MovementFilter) -> Result<LedgerSummary, AppError> {
        Ok(self.statement(filter).await?.summary)
    }

    // ========================
    // Reconciliation
    // ========================

    /// Match the filtered movements against bank statement lines.
    pub async fn reconcile(
        &self,
        filter: &MovementFilter,
        bank_lines: &[BankLine],
        options: ReconcileOptions,
    ) -> Result<ReconciliationReport, AppError> {
        let Partition { within, .. } = self.partition(filter).await?;
        let report = reconcile(&within, bank_lines, options);

        info!(
            matched = report.matched.len(),
            unmatched_movements = report.unmatched_movements.len(),
            unmatched_bank_lines = report.unmatched_bank_lines.len(),
            difference = report.difference,
            "reconciliation finished"
        );

        Ok(report)
    }

    async fn partition(&self, filter: &MovementFilter) -> Result<Partition, AppError> {
        filter.validate()?;
        let movements = self.repo.list_movements(&filter.query()).await?;

        let mut before = Vec::new();
        let mut within = Vec::new();
        for movement in movements {
            if filter.before_range(&movement) {
                before.push(movement);
            } else if !filter.after_range(&movement) {
                within.push(movement);
            }
        }

        Ok(Partition { before, within })
    }
}
