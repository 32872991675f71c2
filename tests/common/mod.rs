// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use saldos::application::LedgerService;
use saldos::domain::Movement;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: one site's cash movements for January 2024
pub struct ObraMovements;

impl ObraMovements {
    pub fn all() -> Vec<Movement> {
        vec![
            Movement::new("anticipo")
                .with_monto(10000.0)
                .with_fecha("2024-01-02")
                .with_cuenta("Cliente")
                .with_proyecto("Obra Norte")
                .with_moneda("ARS")
                .with_descripcion("Anticipo de obra"),
            Movement::new("cemento")
                .with_monto(-2500.5)
                .with_fecha("2024-01-05")
                .with_cuenta("Corralón")
                .with_proyecto("Obra Norte")
                .with_moneda("ARS")
                .with_descripcion("Cemento"),
            Movement::new("jornales")
                .with_debe(3000.0)
                .with_fecha("2024-01-12")
                .with_cuenta("Personal")
                .with_proyecto("Obra Sur")
                .with_moneda("ARS")
                .with_descripcion("Jornales semana 2"),
            Movement::new("dolares")
                .with_haber(500.0)
                .with_fecha("2024-01-15")
                .with_cuenta("Cliente")
                .with_proyecto("Obra Norte")
                .with_moneda("USD")
                .with_descripcion("Pago en dólares"),
            Movement::new("hierro")
                .with_monto_cc(-1200.0)
                .with_fecha("2024-01-20")
                .with_cuenta("Corralón")
                .with_proyecto("Obra Sur")
                .with_moneda("ARS")
                .with_descripcion("Hierro del 8"),
        ]
    }

    pub async fn record(service: &LedgerService) -> Result<()> {
        for movement in Self::all() {
            service.record_movement(&movement).await?;
        }
        Ok(())
    }
}
