mod common;

use anyhow::Result;
use common::test_service;
use saldos::application::MovementFilter;
use saldos::io::{ImportOptions, Importer, MovementField, read_column_mapping};

const OBRA_CSV: &str = "Nro;Fecha;Concepto;Proveedor;Obra;Importe\n\
                        1;02/01/2024;Anticipo;Cliente;Obra Norte;10.000,00\n\
                        2;05/01/2024;Cemento;Corralón;Obra Norte;-2.500,50\n\
                        3;ayer;Arena;Corralón;Obra Norte;-100\n\
                        ;;;;;\n\
                        4;06/01/2024;Flete;Transporte;Obra Norte;(300)\n";

#[tokio::test]
async fn test_import_spanish_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = Importer::new(&service)
        .import_movements_csv(OBRA_CSV.as_bytes(), ImportOptions::default())
        .await?;

    assert_eq!(result.imported, 3);
    assert_eq!(result.skipped, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].line, 4);
    assert_eq!(result.errors[0].field.as_deref(), Some("fecha"));

    let mapping = result.mapping.unwrap();
    assert_eq!(mapping.get(MovementField::Id), Some(0));
    assert_eq!(mapping.get(MovementField::Monto), Some(5));
    assert_eq!(mapping.get(MovementField::Proyecto), Some(4));

    let report = service.statement(&MovementFilter::default()).await?;
    assert_eq!(report.summary.count, 3);
    assert_eq!(report.summary.saldo_final, 7199.5);

    let flete = service.get_movement("4").await?;
    assert_eq!(flete.monto, Some(-300.0));
    assert_eq!(flete.cuenta.as_deref(), Some("Transporte"));

    Ok(())
}

#[tokio::test]
async fn test_import_duplicates() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let importer = Importer::new(&service);

    importer
        .import_movements_csv(OBRA_CSV.as_bytes(), ImportOptions::default())
        .await?;

    // Same file again: every stored id is a duplicate
    let result = importer
        .import_movements_csv(OBRA_CSV.as_bytes(), ImportOptions::default())
        .await?;
    assert_eq!(result.imported, 0);
    assert_eq!(result.errors.len(), 4);

    let options = ImportOptions {
        skip_duplicates: true,
        ..Default::default()
    };
    let result = importer
        .import_movements_csv(OBRA_CSV.as_bytes(), options)
        .await?;
    assert_eq!(result.imported, 0);
    assert_eq!(result.skipped, 3);
    assert_eq!(result.errors.len(), 1);

    assert_eq!(service.count_movements().await?, 3);
    Ok(())
}

#[tokio::test]
async fn test_import_dry_run() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let options = ImportOptions {
        dry_run: true,
        ..Default::default()
    };
    let result = Importer::new(&service)
        .import_movements_csv(OBRA_CSV.as_bytes(), options)
        .await?;

    assert_eq!(result.imported, 3);
    assert_eq!(service.count_movements().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_import_mapping_override() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let csv = "fecha,detalle,pesos\n2024-01-01,Caja chica,150\n";

    // Without an override there is no amount column
    let result = Importer::new(&service)
        .import_movements_csv(csv.as_bytes(), ImportOptions::default())
        .await;
    assert!(result.is_err());

    let options = ImportOptions {
        mapping_overrides: vec!["monto=pesos".into()],
        ..Default::default()
    };
    let result = Importer::new(&service)
        .import_movements_csv(csv.as_bytes(), options)
        .await?;
    assert_eq!(result.imported, 1);

    let movements = service.list_movements(&MovementFilter::default()).await?;
    assert_eq!(movements.len(), 1);
    let movement = &movements[0];
    assert!(movement.id.starts_with("csv-"));
    assert_eq!(movement.monto, Some(150.0));
    assert_eq!(movement.descripcion.as_deref(), Some("Caja chica"));
    Ok(())
}

#[tokio::test]
async fn test_import_files_without_ids() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let importer = Importer::new(&service);
    let options = ImportOptions {
        skip_duplicates: true,
        ..Default::default()
    };

    let january = "fecha,concepto,importe\n\
                   2024-01-05,Arena,-100\n\
                   2024-01-10,Cal,-50\n";
    let february = "fecha,concepto,importe\n\
                    2024-02-01,Anticipo,1500\n\
                    2024-02-03,Ladrillos,-200\n";

    let result = importer
        .import_movements_csv(january.as_bytes(), options.clone())
        .await?;
    assert_eq!(result.imported, 2);

    // Same line numbers, different file: nothing is a duplicate
    let result = importer
        .import_movements_csv(february.as_bytes(), options.clone())
        .await?;
    assert_eq!(result.imported, 2);
    assert_eq!(result.skipped, 0);

    // Re-importing January is recognized as a duplicate
    let result = importer
        .import_movements_csv(january.as_bytes(), options)
        .await?;
    assert_eq!(result.imported, 0);
    assert_eq!(result.skipped, 2);

    assert_eq!(service.count_movements().await?, 4);
    let summary = service.summary(&MovementFilter::default()).await?;
    assert_eq!(summary.saldo_final, 1150.0);

    Ok(())
}

#[tokio::test]
async fn test_import_backend_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let json = r#"[
        {
            "id": "65920080a1b2c3d4e5f60718",
            "montoCC": -1500.25,
            "monto": -99,
            "fecha": {"_seconds": 1704153600, "_nanoseconds": 0},
            "cuenta": "Corralón",
            "proyecto": "Obra Sur"
        },
        {
            "id": "b",
            "monto": "2.000,00",
            "fecha": "2024-01-01",
            "originalData": {"createdAt": "2024-01-01T10:00:00Z", "user": "ana"}
        },
        {
            "id": "c",
            "monto": "not a number",
            "debe": 10,
            "fecha": 1704240000000
        },
        {
            "monto": 5
        }
    ]"#;

    let result = Importer::new(&service)
        .import_movements_json(json.as_bytes(), ImportOptions::default())
        .await?;
    assert_eq!(result.imported, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].line, 4);

    let report = service.statement(&MovementFilter::default()).await?;
    let saldos: Vec<(&str, f64)> = report
        .movements
        .iter()
        .map(|b| (b.id(), b.saldo_acumulado))
        .collect();
    assert!(saldos.contains(&("b", 2000.0)));
    assert!(saldos.contains(&("65920080a1b2c3d4e5f60718", 499.75)));
    assert!(saldos.contains(&("c", 489.75)));

    // Extra audit metadata survives storage
    let stored = service.get_movement("b").await?;
    let extra = &stored.original_data.unwrap().extra;
    assert_eq!(extra["user"], "ana");

    Ok(())
}

#[test]
fn test_read_column_mapping() -> Result<()> {
    let csv = "Fecha;Detalle;Débito;Crédito;Saldo\n01/01/2024;x;1;;1\n";
    let mapping = read_column_mapping(csv.as_bytes(), &[])?;

    assert_eq!(mapping.get(MovementField::Fecha), Some(0));
    assert_eq!(mapping.get(MovementField::Descripcion), Some(1));
    assert_eq!(mapping.get(MovementField::Debe), Some(2));
    assert_eq!(mapping.get(MovementField::Haber), Some(3));
    assert!(mapping.unmapped.contains(&"Saldo".to_string()));
    Ok(())
}
