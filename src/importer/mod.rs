//! Import orchestration
//!
//! Drives one import job end-to-end: extraction, quota check, registration of
//! every successful result (rename, schema move, catalog metadata), overview
//! generation, remote metadata copy for shared datasets and visualization
//! assembly.
//!
//! Registration is a chain of separate, non-idempotent statements. When a step
//! fails, the staged table is dropped wherever it currently is, together with
//! its support tables and overviews, and the error is re-raised. Best-effort
//! steps report `RecoverableError`s, which are logged and otherwise ignored.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::ImporterConfig;
use crate::database::{DatabaseError, TableStore};
use crate::error::{ImportError, ImportResult, OVER_TABLE_QUOTA_ERROR_CODE, RecoverableError};
use crate::models::{
    ImportJob, JobStatus, Privacy, ProvenanceKind, RegisteredTable, TableResult, VisualizationType,
};
use crate::naming::{propose_valid_table_name, sanitize_identifier};
use crate::overviews::{DatasetOverviews, OverviewBuilder};
use crate::quota::{QuotaChecker, TableQuota};
use crate::registrar::{CatalogRegistrar, TableRegistrar};
use crate::support_tables::{SupportTable, SupportTables};
use crate::visualization::{
    DerivedCreator, RejectedLayer, RestoreOptions, VisualizationExportService,
};

pub mod remote;
pub mod runner;

pub use remote::{MetadataClient, RemoteError, RemoteMetadataCopier};
#[cfg(feature = "api-backend")]
pub use remote::HttpMetadataClient;
pub use runner::{ImportLog, LogEntry, Runner};

/// Drives one import job
pub struct Importer {
    config: ImporterConfig,
    job: ImportJob,
    runner: Box<dyn Runner>,
    registrar: Box<dyn TableRegistrar>,
    quota: Box<dyn QuotaChecker>,
    overviews: Box<dyn OverviewBuilder>,
    store: Arc<dyn TableStore>,
    catalog: Arc<dyn Catalog>,
    metadata_client: Option<Arc<dyn MetadataClient>>,
    imported_table_visualization_ids: Vec<Uuid>,
    rejected_layers: Vec<RejectedLayer>,
    table: Option<RegisteredTable>,
}

impl fmt::Debug for Importer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Importer")
            .field("job_id", &self.job.id)
            .field("status", &self.job.status)
            .field("results", &self.runner.results().len())
            .field("imported_table_visualization_ids", &self.imported_table_visualization_ids)
            .field("table", &self.table.as_ref().map(|t| &t.name))
            .finish_non_exhaustive()
    }
}

impl Importer {
    /// Create an importer with the default collaborators for `job`
    pub fn new(
        config: ImporterConfig,
        job: ImportJob,
        runner: Box<dyn Runner>,
        store: Arc<dyn TableStore>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        let registrar = CatalogRegistrar::new(
            catalog.clone(),
            store.clone(),
            job.user.clone(),
            config.basemap.clone(),
        );
        let quota = TableQuota::new(catalog.clone(), job.user.id, config.table_quota);
        let overviews = DatasetOverviews::new(store.clone(), config.overviews.clone());

        Self {
            config,
            job,
            runner,
            registrar: Box::new(registrar),
            quota: Box::new(quota),
            overviews: Box::new(overviews),
            store,
            catalog,
            metadata_client: None,
            imported_table_visualization_ids: Vec::new(),
            rejected_layers: Vec::new(),
            table: None,
        }
    }

    pub fn with_registrar(mut self, registrar: Box<dyn TableRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    pub fn with_quota_checker(mut self, quota: Box<dyn QuotaChecker>) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_overview_builder(mut self, overviews: Box<dyn OverviewBuilder>) -> Self {
        self.overviews = overviews;
        self
    }

    /// Use `client` for the common-data metadata copy
    pub fn with_metadata_client(mut self, client: Arc<dyn MetadataClient>) -> Self {
        self.metadata_client = Some(client);
        self
    }

    /// Run the job
    pub fn run(&mut self, progress: &mut dyn FnMut(&str)) -> ImportResult<&mut Self> {
        let _span = info_span!(
            "import_job",
            job_id = %self.job.id,
            user = %self.job.user.username,
            provenance = ?self.job.provenance
        )
        .entered();

        self.job.set_status(JobStatus::Running);
        info!(job_id = %self.job.id, "Starting import");

        if let Err(e) = self.runner.run(progress) {
            error!(job_id = %self.job.id, error = %e, "Extraction failed");
            self.job.set_status(JobStatus::Failed);
            return Err(e);
        }

        let result_count = self.runner.results().len();
        match self.quota.would_exceed_table_quota(result_count) {
            Ok(true) => {
                self.abort_over_quota();
                return Ok(self);
            }
            Ok(false) => {}
            Err(e) => {
                error!(job_id = %self.job.id, error = %e, "Quota check failed");
                self.job.set_status(JobStatus::Failed);
                return Err(e);
            }
        }

        self.append_log("Proceeding to register");
        for index in self.successful_results() {
            let mut result = self.runner.results()[index].clone();
            let outcome = self.register(&mut result);
            self.runner.results_mut()[index] = result;
            if let Err(e) = outcome {
                error!(job_id = %self.job.id, error = %e, "Registration failed");
                self.job.set_status(JobStatus::Failed);
                return Err(e);
            }
        }

        for index in self.successful_results() {
            let result = self.runner.results()[index].clone();
            if let Err(e) = self.create_overviews(&result) {
                self.log_recoverable(&e);
            }
        }

        if self.job.provenance == ProvenanceKind::CatalogShare {
            if let Err(e) = self.update_table_vis_with_remote_config() {
                self.log_recoverable(&e);
            }
        }

        if self.job.create_visualization {
            if let Err(e) = self.create_visualization() {
                error!(job_id = %self.job.id, error = %e, "Visualization assembly failed");
                self.job.set_status(JobStatus::Failed);
                return Err(e);
            }
        }

        self.job.set_status(JobStatus::Completed);
        info!(
            job_id = %self.job.id,
            registered = self.imported_table_visualization_ids.len(),
            "Import completed"
        );
        Ok(self)
    }

    fn abort_over_quota(&mut self) {
        warn!(job_id = %self.job.id, "Results would exceed the table quota, aborting");
        self.append_log("Results would set overquota");
        self.job.aborted = true;
        self.job.set_status(JobStatus::Aborted);

        for index in 0..self.runner.results().len() {
            let mut result = self.runner.results()[index].clone();
            if !self.owns_relation(&result) {
                continue;
            }
            let mut support = SupportTables::new(self.store.clone());
            support.track(&result.schema, &result.support_tables);
            self.drop_staged(&mut result, &support);
            self.runner.results_mut()[index] = result;
        }
    }

    fn successful_results(&self) -> Vec<usize> {
        self.runner
            .results()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.success)
            .map(|(index, _)| index)
            .collect()
    }

    /// Register one extraction result
    ///
    /// Statement timeouts raised anywhere inside surface as
    /// `ImportError::StatementTimeout` after the staged table is dropped.
    pub fn register(&mut self, result: &mut TableResult) -> ImportResult<()> {
        let _span = info_span!("register_table", table = %result.table_name).entered();

        let mut support = SupportTables::new(self.store.clone());
        support.track(&result.schema, &result.support_tables);
        let owned = self.owns_relation(result);

        match self.register_result(result, &mut support) {
            Ok(()) => Ok(()),
            Err(e) if e.is_statement_timeout() => {
                warn!(table = %result.qualified_name(), error = %e, "Statement timeout during registration");
                if owned && !result.dropped {
                    self.drop_staged(result, &support);
                }
                Err(ImportError::statement_timeout(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn keeps_location(&self, result: &TableResult) -> bool {
        self.job.provenance == ProvenanceKind::CatalogShare
            || (result.schema != self.config.origin_schema && self.job.is_map_bundle_upload())
    }

    /// Whether the result's relation was created by this import and may be dropped
    ///
    /// Tables a map bundle references outside the origin schema belong to the
    /// tenant already.
    fn owns_relation(&self, result: &TableResult) -> bool {
        self.job.provenance == ProvenanceKind::CatalogShare || !self.keeps_location(result)
    }

    fn register_result(
        &mut self,
        result: &mut TableResult,
        support: &mut SupportTables,
    ) -> ImportResult<()> {
        let keep_location = self.keeps_location(result);
        let name = if keep_location {
            result.name = result.current_name.clone();
            result.name.clone()
        } else {
            result.name = sanitize_identifier(&result.name);

            self.append_log(format!(
                "Before renaming from {} to {}",
                result.table_name, result.name
            ));
            let name = self.rename(result, support)?;

            self.append_log(format!(
                "Before moving schema '{}' from {} to {}",
                name, result.schema, self.job.destination_schema
            ));
            self.move_to_schema(result, support)?;
            name
        };

        self.append_log(format!(
            "Before persisting metadata '{}' data_import_id: {}",
            name, self.job.id
        ));
        self.persist_metadata(result, &name, keep_location)?;
        result.registered = true;

        self.append_log(format!("Table '{}' registered", name));
        Ok(())
    }

    /// Give the staged table a unique final name
    ///
    /// On failure the staged table is dropped and the error re-raised.
    fn rename(&mut self, result: &mut TableResult, support: &mut SupportTables) -> ImportResult<String> {
        let current_name = result.current_name.clone();
        let outcome = self.rename_staged(result, support);
        if let Err(e) = &outcome {
            debug!(
                table = %current_name,
                new_name = %result.name,
                error = %e,
                "Error in table rename: dropping importer table"
            );
            self.drop_staged(result, support);
        }
        outcome
    }

    fn rename_staged(
        &mut self,
        result: &mut TableResult,
        support: &mut SupportTables,
    ) -> ImportResult<String> {
        let schema = result.schema.clone();
        let current_name = result.current_name.clone();

        let taken = self.taken_names()?;
        let new_name = propose_valid_table_name(&result.name, &taken)?;

        if new_name != current_name {
            self.store.rename_table(&schema, &current_name, &new_name)?;
        }
        result.mark_renamed(&new_name);

        if let Err(e) = self.rename_geometry_index(&schema, &current_name) {
            self.log_recoverable(&e);
        }

        // Constraints are rebuilt once the final schema is reached
        let outcome = support.rename(&current_name, &new_name, false);
        result.update_support_tables(&outcome.names);
        if !outcome.success {
            return Err(ImportError::SupportTableRename { table: new_name });
        }

        Ok(new_name)
    }

    /// Names unavailable to a new table of the tenant
    fn taken_names(&self) -> ImportResult<HashSet<String>> {
        let mut taken: HashSet<String> = self
            .store
            .table_names(&self.job.destination_schema)?
            .into_iter()
            .collect();

        if let Some(common_data_user) = self
            .catalog
            .find_user_by_username(&self.config.common_data.username)?
        {
            let shared = self
                .catalog
                .list_visualizations(common_data_user.id, Some(VisualizationType::Table))?;
            taken.extend(
                shared
                    .into_iter()
                    .filter(|v| v.privacy == Privacy::Public)
                    .map(|v| v.name),
            );
        }
        Ok(taken)
    }

    fn rename_geometry_index(&self, schema: &str, table: &str) -> Result<(), RecoverableError> {
        let index = format!("{}_geom_idx", table);
        let renamed = format!("the_geom_{}", Uuid::new_v4().to_string().replace('-', "_"));
        self.store
            .rename_index_if_exists(schema, &index, &renamed)
            .map_err(|e| RecoverableError::IndexRename {
                table: table.to_string(),
                message: e.to_string(),
            })
    }

    /// Move the table and its support tables to the job's destination schema
    ///
    /// On failure the table is dropped at its current location and the error
    /// re-raised.
    fn move_to_schema(&mut self, result: &mut TableResult, support: &mut SupportTables) -> ImportResult<()> {
        let outcome = self.move_staged(result, support);
        if outcome.is_err() {
            self.drop_staged(result, support);
        }
        outcome
    }

    fn move_staged(&mut self, result: &mut TableResult, support: &mut SupportTables) -> ImportResult<()> {
        let origin = result.schema.clone();
        let destination = self.job.destination_schema.clone();
        let name = result.current_name.clone();

        if origin != destination {
            self.store.set_schema(&origin, &name, &destination)?;
            result.mark_moved(&destination);
            support.change_schema(&destination, &name)?;
        } else {
            support.rebuild_pending_constraints(&name)?;
        }
        Ok(())
    }

    fn persist_metadata(
        &mut self,
        result: &TableResult,
        name: &str,
        keep_location: bool,
    ) -> ImportResult<()> {
        if keep_location && self.catalog.find_table(self.job.user.id, name)?.is_some() {
            info!(table = name, "Table already registered, skipping registration");
            self.append_log(format!("Table '{}' already registered", name));
            return Ok(());
        }

        let table = self.registrar.register(&result.schema, name, self.job.id)?;
        self.imported_table_visualization_ids
            .push(table.visualization_id);
        self.table = Some(table);
        Ok(())
    }

    /// Drop a result's table, support tables and overviews where they currently are
    fn drop_staged(&mut self, result: &mut TableResult, support: &SupportTables) {
        let schema = result.schema.clone();
        let name = result.current_name.clone();
        match self.drop_relations(&schema, &name, support.tables()) {
            Ok(()) => {
                debug!(table = %result.qualified_name(), "Dropped staged table");
                result.dropped = true;
            }
            Err(e) => self.log_recoverable(&RecoverableError::Drop {
                table: format!("{}.{}", schema, name),
                message: e.to_string(),
            }),
        }
    }

    fn drop_relations(
        &self,
        schema: &str,
        name: &str,
        support: &[SupportTable],
    ) -> Result<(), DatabaseError> {
        self.store.drop_overviews(schema, name)?;
        if self.job.provenance == ProvenanceKind::CatalogShare {
            self.store.drop_view(schema, name)?;
        } else {
            self.store.drop_table(schema, name)?;
        }
        for table in support {
            self.store.drop_table(&table.schema, &table.name)?;
        }
        Ok(())
    }

    fn create_overviews(&self, result: &TableResult) -> Result<(), RecoverableError> {
        let schema = &result.schema;
        let name = &result.current_name;
        let build = || -> Result<(), DatabaseError> {
            if self.overviews.should_create_overviews(schema, name)? {
                self.overviews.create_overviews(schema, name)?;
            }
            Ok(())
        };
        build().map_err(|e| RecoverableError::Overviews {
            table: name.clone(),
            message: e.to_string(),
        })
    }

    fn update_table_vis_with_remote_config(&self) -> Result<(), RecoverableError> {
        let tables = self
            .imported_tables()
            .map_err(|e| RecoverableError::RemoteCopy(e.to_string()))?;
        let client = self.metadata_client()?;
        RemoteMetadataCopier::new(client, self.catalog.clone(), self.config.common_data.clone())
            .copy(&tables, self.runner.foreign_table_name())
    }

    fn metadata_client(&self) -> Result<Arc<dyn MetadataClient>, RecoverableError> {
        match &self.metadata_client {
            Some(client) => Ok(client.clone()),
            None => default_metadata_client(&self.config),
        }
    }

    fn create_visualization(&mut self) -> ImportResult<()> {
        if self.runner.visualizations().is_empty() {
            return self.create_default_visualization();
        }

        let renamed_tables: HashMap<String, String> = self
            .runner
            .results()
            .iter()
            .map(|r| (r.original_name.clone(), r.name.clone()))
            .collect();
        let options = RestoreOptions {
            id: None,
            owner_id: Some(self.job.user.id),
            owner_name: Some(self.job.user.username.clone()),
            renamed_tables,
        };
        let service = VisualizationExportService::new(self.catalog.clone(), self.store.clone());
        let documents = self.runner.visualizations().to_vec();
        for document in &documents {
            let visualization = service.restore(document, &options)?;
            info!(visualization_id = %visualization.id, "Restored visualization from bundle");
            self.bind_visualization(visualization.id);
        }
        Ok(())
    }

    fn create_default_visualization(&mut self) -> ImportResult<()> {
        let tables = self.imported_tables()?;
        if tables.is_empty() {
            debug!(job_id = %self.job.id, "No imported tables, skipping visualization");
            return Ok(());
        }
        let creator = DerivedCreator::new(
            self.catalog.clone(),
            self.store.clone(),
            self.config.basemap.clone(),
        );
        let (visualization, rejected) = creator.create(&self.job.user, &tables)?;
        self.rejected_layers = rejected;
        self.bind_visualization(visualization.id);
        Ok(())
    }

    fn bind_visualization(&mut self, visualization_id: Uuid) {
        self.job.visualization_id = Some(visualization_id);
        self.job.updated_at = chrono::Utc::now();
    }

    /// Registered tables of this job, resolved through their table visualizations
    pub fn imported_tables(&self) -> ImportResult<Vec<RegisteredTable>> {
        let mut tables = Vec::with_capacity(self.imported_table_visualization_ids.len());
        for id in &self.imported_table_visualization_ids {
            if let Some(table) = self.catalog.table_by_visualization(*id)? {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    fn append_log(&mut self, message: impl Into<String>) {
        self.runner.log_mut().append(message);
    }

    fn log_recoverable(&mut self, error: &RecoverableError) {
        warn!(job_id = %self.job.id, error = %error, "Recoverable import error");
        let line = match error {
            RecoverableError::RemoteCopySkipped(_) | RecoverableError::RemoteCopy(_) => {
                format!("WARNING: {}", error)
            }
            _ => error.to_string(),
        };
        self.append_log(line);
    }

    /// Whether the job was aborted or the tenant is past the table quota
    pub fn over_table_quota(&self) -> bool {
        if self.job.aborted {
            return true;
        }
        self.quota.is_over_table_quota().unwrap_or_else(|e| {
            warn!(job_id = %self.job.id, error = %e, "Could not check table quota");
            false
        })
    }

    /// Not over quota and extraction succeeded
    pub fn success(&self) -> bool {
        !self.over_table_quota() && self.runner.success()
    }

    /// `8002` when over quota, else the first error code among the results
    pub fn error_code(&self) -> Option<u32> {
        if self.over_table_quota() {
            return Some(OVER_TABLE_QUOTA_ERROR_CODE);
        }
        self.runner.results().iter().find_map(|r| r.error_code)
    }

    pub fn job(&self) -> &ImportJob {
        &self.job
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    pub fn results(&self) -> &[TableResult] {
        self.runner.results()
    }

    pub fn log(&self) -> &ImportLog {
        self.runner.log()
    }

    pub fn imported_table_visualization_ids(&self) -> &[Uuid] {
        &self.imported_table_visualization_ids
    }

    pub fn rejected_layers(&self) -> &[RejectedLayer] {
        &self.rejected_layers
    }

    /// Last table registered by this job
    pub fn table(&self) -> Option<&RegisteredTable> {
        self.table.as_ref()
    }
}

#[cfg(feature = "api-backend")]
fn default_metadata_client(
    config: &ImporterConfig,
) -> Result<Arc<dyn MetadataClient>, RecoverableError> {
    let timeout = std::time::Duration::from_secs(config.http_timeout_secs);
    let client: Arc<dyn MetadataClient> = Arc::new(
        HttpMetadataClient::new(timeout).map_err(|e| RecoverableError::RemoteCopy(e.to_string()))?,
    );
    Ok(client)
}

#[cfg(not(feature = "api-backend"))]
fn default_metadata_client(
    _config: &ImporterConfig,
) -> Result<Arc<dyn MetadataClient>, RecoverableError> {
    Err(RecoverableError::RemoteCopySkipped(
        "remote metadata copy requires the 'api-backend' feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::database::{MemoryDatabase, MemoryTable, Operation};
    use crate::models::{BoundingBox, Tenant, Visualization};

    struct StaticRunner {
        results: Vec<TableResult>,
        log: ImportLog,
    }

    impl StaticRunner {
        fn new(results: Vec<TableResult>) -> Box<Self> {
            Box::new(Self {
                results,
                log: ImportLog::new(),
            })
        }
    }

    impl Runner for StaticRunner {
        fn run(&mut self, progress: &mut dyn FnMut(&str)) -> ImportResult<()> {
            progress("extracted");
            Ok(())
        }

        fn results(&self) -> &[TableResult] {
            &self.results
        }

        fn results_mut(&mut self) -> &mut Vec<TableResult> {
            &mut self.results
        }

        fn log(&self) -> &ImportLog {
            &self.log
        }

        fn log_mut(&mut self) -> &mut ImportLog {
            &mut self.log
        }
    }

    fn staged(db: &MemoryDatabase, name: &str) {
        db.insert_table(
            "cdb_importer",
            name,
            MemoryTable::new()
                .with_rows(10)
                .with_geometry("Point", BoundingBox::new(0.0, 0.0, 1.0, 1.0))
                .with_index(format!("{}_geom_idx", name)),
        );
    }

    fn importer(
        db: Arc<MemoryDatabase>,
        catalog: Arc<MemoryCatalog>,
        user: &Tenant,
        results: Vec<TableResult>,
    ) -> Importer {
        let job = ImportJob::new(user.clone(), "public");
        Importer::new(ImporterConfig::default(), job, StaticRunner::new(results), db, catalog)
    }

    #[test]
    fn test_register_renames_and_moves() {
        let user = Tenant::new("alice");
        let db = Arc::new(MemoryDatabase::new().with_schema("public"));
        staged(&db, "import_1");
        let catalog = Arc::new(MemoryCatalog::new().with_user(&user));
        let mut importer = importer(
            db.clone(),
            catalog.clone(),
            &user,
            vec![TableResult::new("cdb_importer", "import_1", "Bike Routes")],
        );

        importer.run(&mut |_| {}).unwrap();

        let result = &importer.results()[0];
        assert!(result.registered);
        assert_eq!(result.name, "bike_routes");
        assert_eq!(result.qualified_name(), "public.bike_routes");
        assert!(db.contains("public", "bike_routes"));
        assert!(!db.contains("cdb_importer", "import_1"));

        let indexes = db.table("public", "bike_routes").unwrap().indexes;
        assert!(indexes[0].starts_with("the_geom_"));

        assert_eq!(importer.imported_table_visualization_ids().len(), 1);
        assert_eq!(importer.table().unwrap().name, "bike_routes");
        assert_eq!(importer.job().status, JobStatus::Completed);
        assert!(importer.success());
        assert!(importer.log().contains("Table 'bike_routes' registered"));
    }

    #[test]
    fn test_common_data_names_are_taken() {
        let user = Tenant::new("alice");
        let common = Tenant::new("common-data");
        let db = Arc::new(MemoryDatabase::new().with_schema("public"));
        staged(&db, "import_1");
        let catalog = Arc::new(MemoryCatalog::new().with_user(&user).with_user(&common));
        catalog
            .save_visualization(
                &Visualization::new("routes", VisualizationType::Table, common.id)
                    .with_privacy(Privacy::Public),
            )
            .unwrap();
        let mut importer = importer(
            db,
            catalog,
            &user,
            vec![TableResult::new("cdb_importer", "import_1", "routes")],
        );

        importer.run(&mut |_| {}).unwrap();
        assert_eq!(importer.results()[0].name, "routes_1");
    }

    #[test]
    fn test_index_rename_failure_is_recoverable() {
        let user = Tenant::new("alice");
        let db = Arc::new(
            MemoryDatabase::new()
                .with_schema("public")
                .with_failure(Operation::RenameIndex, "import_1_geom_idx", "index locked"),
        );
        staged(&db, "import_1");
        let catalog = Arc::new(MemoryCatalog::new().with_user(&user));
        let mut importer = importer(
            db.clone(),
            catalog,
            &user,
            vec![TableResult::new("cdb_importer", "import_1", "routes")],
        );

        importer.run(&mut |_| {}).unwrap();
        assert!(importer.results()[0].registered);
        assert!(importer.log().contains("Could not rename geometry index"));
    }

    #[test]
    fn test_move_failure_drops_table_at_current_location() {
        let user = Tenant::new("alice");
        let db = Arc::new(
            MemoryDatabase::new()
                .with_schema("public")
                .with_failure(Operation::SetSchema, "routes", "permission denied"),
        );
        staged(&db, "import_1");
        let catalog = Arc::new(MemoryCatalog::new().with_user(&user));
        let mut importer = importer(
            db.clone(),
            catalog.clone(),
            &user,
            vec![TableResult::new("cdb_importer", "import_1", "routes")],
        );

        let err = importer.run(&mut |_| {}).unwrap_err();
        assert!(matches!(err, ImportError::Database(_)));
        assert!(!db.contains("cdb_importer", "routes"));
        assert!(!db.contains("cdb_importer", "import_1"));
        assert!(importer.results()[0].dropped);
        assert_eq!(importer.job().status, JobStatus::Failed);
        assert_eq!(catalog.count_tables(user.id).unwrap(), 0);
    }

    #[test]
    fn test_statement_timeout_maps_to_error_code() {
        let user = Tenant::new("alice");
        let db = Arc::new(MemoryDatabase::new().with_schema("public").with_failure(
            Operation::SetSchema,
            "routes",
            "ERROR: canceling statement due to statement timeout",
        ));
        staged(&db, "import_1");
        let catalog = Arc::new(MemoryCatalog::new().with_user(&user));
        let mut importer = importer(
            db.clone(),
            catalog,
            &user,
            vec![TableResult::new("cdb_importer", "import_1", "routes")],
        );

        let err = importer.run(&mut |_| {}).unwrap_err();
        assert!(matches!(err, ImportError::StatementTimeout { code: 6667, .. }));
        assert!(!db.contains("cdb_importer", "routes"));
    }
}
