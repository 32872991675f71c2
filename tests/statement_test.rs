mod common;

use anyhow::Result;
use chrono::Duration;
use common::{ObraMovements, parse_date, test_service};
use saldos::application::{AppError, MovementFilter};
use saldos::domain::{GroupBy, Movement, UNASSIGNED_GROUP};
use saldos::io::{Exporter, write_grouped_csv};

#[tokio::test]
async fn test_full_statement() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let report = service.statement(&MovementFilter::default()).await?;

    assert_eq!(report.saldo_inicial, 0.0);
    assert_eq!(report.movements.len(), 5);

    let saldos: Vec<(&str, f64)> = report
        .movements
        .iter()
        .map(|b| (b.id(), b.saldo_acumulado))
        .collect();
    assert_eq!(
        saldos,
        vec![
            ("anticipo", 10000.0),
            ("cemento", 7499.5),
            ("jornales", 4499.5),
            ("dolares", 4999.5),
            ("hierro", 3799.5),
        ]
    );

    assert_eq!(report.summary.count, 5);
    assert_eq!(report.summary.total_debe, 6700.5);
    assert_eq!(report.summary.total_haber, 10500.0);
    assert_eq!(report.summary.saldo_final, 3799.5);
    assert_eq!(report.summary.desde, Some(parse_date("2024-01-02")));
    assert_eq!(report.summary.hasta, Some(parse_date("2024-01-20")));

    Ok(())
}

#[tokio::test]
async fn test_statement_opening_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let filter = MovementFilter {
        from_date: Some(parse_date("2024-01-10")),
        to_date: Some(parse_date("2024-01-15") + Duration::days(1) - Duration::milliseconds(1)),
        ..Default::default()
    };
    let report = service.statement(&filter).await?;

    // anticipo and cemento are folded into the opening balance, hierro is after the range
    assert_eq!(report.saldo_inicial, 7499.5);
    let ids: Vec<&str> = report.movements.iter().map(|b| b.id()).collect();
    assert_eq!(ids, vec!["jornales", "dolares"]);
    assert_eq!(report.movements[0].saldo_acumulado, 4499.5);
    assert_eq!(report.summary.saldo_final, 4999.5);

    Ok(())
}

#[tokio::test]
async fn test_statement_empty_range_keeps_opening() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let filter = MovementFilter {
        from_date: Some(parse_date("2024-02-01")),
        ..Default::default()
    };
    let report = service.statement(&filter).await?;

    assert!(report.movements.is_empty());
    assert_eq!(report.saldo_inicial, 3799.5);
    assert_eq!(report.summary.saldo_final, 3799.5);

    Ok(())
}

#[tokio::test]
async fn test_statement_column_filters() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let filter = MovementFilter {
        cuenta: Some("Corralón".into()),
        ..Default::default()
    };
    let report = service.statement(&filter).await?;

    assert_eq!(report.movements.len(), 2);
    assert_eq!(report.summary.total_debe, 3700.5);
    assert_eq!(report.summary.saldo_final, -3700.5);

    Ok(())
}

#[tokio::test]
async fn test_invalid_date_range() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let filter = MovementFilter {
        from_date: Some(parse_date("2024-02-01")),
        to_date: Some(parse_date("2024-01-01")),
        ..Default::default()
    };
    let result = service.statement(&filter).await;
    assert!(matches!(result, Err(AppError::InvalidDateRange { .. })));

    Ok(())
}

#[tokio::test]
async fn test_undated_movement_counts_as_earliest() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;
    service
        .record_movement(&Movement::new("sin-fecha").with_monto(100.0))
        .await?;

    let report = service.statement(&MovementFilter::default()).await?;
    let first = report
        .movements
        .iter()
        .find(|b| b.id() == "sin-fecha")
        .unwrap();
    assert_eq!(first.saldo_acumulado, 100.0);
    assert_eq!(report.summary.saldo_final, 3899.5);

    // With a lower bound it lands in the opening balance
    let filter = MovementFilter {
        from_date: Some(parse_date("2024-01-01")),
        ..Default::default()
    };
    let report = service.statement(&filter).await?;
    assert_eq!(report.saldo_inicial, 100.0);
    assert_eq!(report.movements.len(), 5);

    Ok(())
}

#[tokio::test]
async fn test_grouped_statement_by_proyecto() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;
    service
        .record_movement(
            &Movement::new("caja")
                .with_monto(50.0)
                .with_fecha("2024-01-03"),
        )
        .await?;

    let report = service
        .grouped_statement(&MovementFilter::default(), GroupBy::Proyecto)
        .await?;

    let keys: Vec<&str> = report.groups.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec![UNASSIGNED_GROUP, "Obra Norte", "Obra Sur"]);
    assert_eq!(report.movement_count(), 6);

    let norte = &report.groups[1];
    assert_eq!(norte.summary.saldo_final, 7999.5);
    let sur = &report.groups[2];
    assert_eq!(sur.summary.total_debe, 4200.0);
    assert_eq!(sur.summary.saldo_final, -4200.0);

    Ok(())
}

#[tokio::test]
async fn test_grouped_statement_openings() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let filter = MovementFilter {
        from_date: Some(parse_date("2024-01-10")),
        ..Default::default()
    };
    let report = service.grouped_statement(&filter, GroupBy::Moneda).await?;

    let ars = report.groups.iter().find(|g| g.key == "ARS").unwrap();
    assert_eq!(ars.opening, 7499.5);
    assert_eq!(ars.summary.saldo_final, 3299.5);

    let usd = report.groups.iter().find(|g| g.key == "USD").unwrap();
    assert_eq!(usd.opening, 0.0);
    assert_eq!(usd.summary.saldo_final, 500.0);

    Ok(())
}

#[tokio::test]
async fn test_grouped_statement_keeps_accounts_without_range_movements() -> Result<()> {
    let (service, _temp) = test_service().await?;
    service
        .record_movement(
            &Movement::new("deuda")
                .with_monto(-800.0)
                .with_fecha("2023-12-10")
                .with_cuenta("Corralón"),
        )
        .await?;
    service
        .record_movement(
            &Movement::new("cobro")
                .with_monto(50.0)
                .with_fecha("2024-01-10")
                .with_cuenta("Cliente"),
        )
        .await?;

    let filter = MovementFilter {
        from_date: Some(parse_date("2024-01-01")),
        ..Default::default()
    };
    let flat = service.statement(&filter).await?;
    assert_eq!(flat.saldo_inicial, -800.0);
    assert_eq!(flat.summary.saldo_final, -750.0);

    let report = service.grouped_statement(&filter, GroupBy::Cuenta).await?;
    let closing: Vec<(&str, f64, f64)> = report
        .groups
        .iter()
        .map(|g| (g.key.as_str(), g.opening, g.summary.saldo_final))
        .collect();
    assert_eq!(
        closing,
        vec![("Cliente", 0.0, 50.0), ("Corralón", -800.0, -800.0)]
    );
    assert_eq!(report.movement_count(), 1);

    // Group closings add up to the flat statement
    let total: f64 = report.groups.iter().map(|g| g.summary.saldo_final).sum();
    assert_eq!(total, flat.summary.saldo_final);

    Ok(())
}

#[tokio::test]
async fn test_list_movements_limit() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let filter = MovementFilter {
        limit: Some(2),
        ..Default::default()
    };
    let movements = service.list_movements(&filter).await?;
    let ids: Vec<&str> = movements.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["dolares", "hierro"]);

    Ok(())
}

#[tokio::test]
async fn test_delete_movement() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let deleted = service.delete_movement("cemento").await?;
    assert_eq!(deleted.monto, Some(-2500.5));
    assert_eq!(service.count_movements().await?, 4);

    let result = service.delete_movement("cemento").await;
    assert!(matches!(result, Err(AppError::MovementNotFound(_))));

    let summary = service.summary(&MovementFilter::default()).await?;
    assert_eq!(summary.saldo_final, 6300.0);

    Ok(())
}

#[tokio::test]
async fn test_export_statement_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let mut out = Vec::new();
    let count = Exporter::new(&service)
        .export_statement_csv(&MovementFilter::default(), &mut out)
        .await?;
    assert_eq!(count, 5);

    let text = String::from_utf8(out)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(
        lines[2],
        "cemento,2024-01-05,Corralón,Obra Norte,ARS,Cemento,,2500.50,0.00,7499.50"
    );

    Ok(())
}

#[tokio::test]
async fn test_export_statement_json_shape() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let mut out = Vec::new();
    Exporter::new(&service)
        .export_statement_json(&MovementFilter::default(), &mut out)
        .await?;

    let value: serde_json::Value = serde_json::from_slice(&out)?;
    let first = &value["movements"][0];
    assert_eq!(first["id"], "anticipo");
    assert_eq!(first["debe"], 0.0);
    assert_eq!(first["haber"], 10000.0);
    assert_eq!(first["saldoAcumulado"], 10000.0);
    assert_eq!(value["summary"]["saldoFinal"], 3799.5);

    Ok(())
}

#[tokio::test]
async fn test_grouped_csv_has_group_column() -> Result<()> {
    let (service, _temp) = test_service().await?;
    ObraMovements::record(&service).await?;

    let report = service
        .grouped_statement(&MovementFilter::default(), GroupBy::Cuenta)
        .await?;
    let mut out = Vec::new();
    let count = write_grouped_csv(&report, &mut out)?;
    assert_eq!(count, 5);

    let text = String::from_utf8(out)?;
    assert!(text.starts_with("cuenta,id,fecha,"));
    assert!(text.contains("Personal,jornales,2024-01-12"));

    Ok(())
}
