//! Importer runs against the DuckDB backends

#![cfg(feature = "duckdb-backend")]

mod common;

use std::sync::Arc;

use geo_import::{
    Catalog, DuckDbCatalog, DuckDbDatabase, ImportJob, Importer, ImporterConfig, JobStatus,
    OverviewConfig, TableStore, Tenant, VisualizationExportService,
};
use tempfile::TempDir;

use common::{ORIGIN, ScriptedRunner, staged_result};

fn open(dir: &TempDir) -> (Arc<DuckDbDatabase>, Arc<DuckDbCatalog>, Tenant) {
    let data_path = dir.path().join("data.duckdb");
    let catalog_path = dir.path().join("catalog.duckdb");
    let db = Arc::new(DuckDbDatabase::open(data_path.to_str().unwrap()).unwrap());
    let catalog = Arc::new(DuckDbCatalog::open(catalog_path.to_str().unwrap()).unwrap());

    let user = match catalog.find_user_by_username("alice").unwrap() {
        Some(user) => user,
        None => {
            let user = Tenant::new("alice");
            catalog.insert_user(&user).unwrap();
            user
        }
    };
    (db, catalog, user)
}

fn stage(db: &DuckDbDatabase) {
    db.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS cdb_importer;
         CREATE TABLE cdb_importer.import_1 (name VARCHAR, the_geom VARCHAR);
         INSERT INTO cdb_importer.import_1 VALUES
             ('Madrid', 'POINT(-3.70 40.42)'),
             ('Lisbon', 'POINT(-9.14 38.72)'),
             ('Paris', 'POINT(2.35 48.86)');
         CREATE TABLE cdb_importer.import_1_lines (id INTEGER, lon DOUBLE, lat DOUBLE);",
    )
    .unwrap();
}

#[test]
fn test_full_import_on_duckdb() {
    let dir = TempDir::new().unwrap();
    let (db, catalog, user) = open(&dir);
    stage(&db);

    let result = staged_result("import_1", "Capital Cities")
        .with_support_tables(vec!["import_1_lines".to_string()]);
    let job = ImportJob::new(user.clone(), "public").with_create_visualization(true);
    let mut importer = Importer::new(
        ImporterConfig::default(),
        job,
        ScriptedRunner::new(vec![result]).boxed(),
        db.clone(),
        catalog.clone(),
    );
    importer.run(&mut |_| {}).unwrap();

    assert_eq!(importer.job().status, JobStatus::Completed);
    assert!(db.table_exists("public", "capital_cities").unwrap());
    assert!(db.table_exists("public", "capital_cities_lines").unwrap());
    assert!(!db.table_exists(ORIGIN, "import_1").unwrap());
    assert_eq!(db.support_links("public", "capital_cities").unwrap(), vec!["capital_cities_lines"]);

    let table = catalog
        .find_table(user.id, "capital_cities")
        .unwrap()
        .unwrap();
    assert_eq!(table.geometry_type.as_deref(), Some("Point"));
    let bounds = table.bounds.unwrap();
    assert_eq!((bounds.min_x, bounds.max_y), (-9.14, 48.86));

    let vis_id = importer.job().visualization_id.unwrap();
    let vis = catalog.find_visualization(vis_id).unwrap().unwrap();
    assert_eq!(vis.name, "capital_cities map");
    assert_eq!(vis.data_layer_count(), 1);
}

#[test]
fn test_catalog_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let vis_id = {
        let (db, catalog, user) = open(&dir);
        stage(&db);
        let job = ImportJob::new(user, "public").with_create_visualization(true);
        let mut importer = Importer::new(
            ImporterConfig::default(),
            job,
            ScriptedRunner::new(vec![staged_result("import_1", "cities")]).boxed(),
            db.clone(),
            catalog.clone(),
        );
        importer.run(&mut |_| {}).unwrap();
        let vis_id = importer.job().visualization_id.unwrap();

        VisualizationExportService::new(catalog.clone(), db.clone())
            .export(vis_id)
            .unwrap();
        catalog.delete_visualization(vis_id).unwrap();
        vis_id
    };

    let (db, catalog, user) = open(&dir);
    assert_eq!(catalog.count_tables(user.id).unwrap(), 1);
    let restored = VisualizationExportService::new(catalog.clone(), db)
        .import(vis_id)
        .unwrap();
    assert_eq!(restored.id, vis_id);
    assert_eq!(restored.data_layer_count(), 1);
}

#[test]
fn test_overviews_on_duckdb() {
    let dir = TempDir::new().unwrap();
    let (db, catalog, user) = open(&dir);
    stage(&db);

    let config = ImporterConfig::default().with_overviews(
        OverviewConfig::default()
            .with_min_rows(1)
            .with_zoom_levels(vec![2, 4]),
    );
    let mut importer = Importer::new(
        config,
        ImportJob::new(user, "public"),
        ScriptedRunner::new(vec![staged_result("import_1", "cities")]).boxed(),
        db.clone(),
        catalog,
    );
    importer.run(&mut |_| {}).unwrap();

    let overviews = db.overview_tables("public", "cities").unwrap();
    assert_eq!(overviews, vec!["_vovw_2_cities", "_vovw_4_cities"]);
    assert_eq!(db.row_count("public", "_vovw_4_cities").unwrap(), 3);
}
