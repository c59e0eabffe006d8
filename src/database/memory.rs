//! In-memory table store
//!
//! Mirrors the relational behavior the importer depends on (schemas, renames,
//! schema moves, indexes, views, overviews) without a database server. Failures
//! can be injected per operation and target to exercise compensation paths.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{DatabaseError, TableStore, is_overview_of, overview_table_name};
use crate::models::BoundingBox;

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    TableNames,
    RenameTable,
    RenameIndex,
    SetSchema,
    RebuildConstraints,
    DropTable,
    DropView,
    RowCount,
    CreateOverviews,
}

/// A table (or view) held by the memory store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub rows: u64,
    pub geometry_type: Option<String>,
    pub bounds: Option<BoundingBox>,
    pub indexes: Vec<String>,
    pub view: bool,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_geometry(mut self, geometry_type: impl Into<String>, bounds: BoundingBox) -> Self {
        self.geometry_type = Some(geometry_type.into());
        self.bounds = Some(bounds);
        self
    }

    pub fn with_index(mut self, name: impl Into<String>) -> Self {
        self.indexes.push(name.into());
        self
    }

    pub fn as_view(mut self) -> Self {
        self.view = true;
        self
    }
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: Operation,
    target: String,
    message: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    schemas: BTreeMap<String, BTreeMap<String, MemoryTable>>,
    failures: Vec<FailureRule>,
    constraint_rebuilds: Vec<(String, String, String)>,
}

impl MemoryState {
    fn check(&self, operation: Operation, target: &str) -> Result<(), DatabaseError> {
        match self
            .failures
            .iter()
            .find(|rule| rule.operation == operation && rule.target == target)
        {
            Some(rule) => Err(DatabaseError::Statement(rule.message.clone())),
            None => Ok(()),
        }
    }

    fn schema(&self, schema: &str) -> Result<&BTreeMap<String, MemoryTable>, DatabaseError> {
        self.schemas
            .get(schema)
            .ok_or_else(|| DatabaseError::Statement(format!("schema \"{}\" does not exist", schema)))
    }

    fn schema_mut(
        &mut self,
        schema: &str,
    ) -> Result<&mut BTreeMap<String, MemoryTable>, DatabaseError> {
        self.schemas
            .get_mut(schema)
            .ok_or_else(|| DatabaseError::Statement(format!("schema \"{}\" does not exist", schema)))
    }

    fn table(&self, schema: &str, name: &str) -> Result<&MemoryTable, DatabaseError> {
        self.schema(schema)?
            .get(name)
            .ok_or_else(|| DatabaseError::not_found(schema, name))
    }
}

/// Table store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<MemoryState>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty schema
    pub fn with_schema(self, schema: &str) -> Self {
        self.lock().schemas.entry(schema.to_string()).or_default();
        self
    }

    /// Add a table, creating its schema if needed
    pub fn with_table(self, schema: &str, name: &str, table: MemoryTable) -> Self {
        self.insert_table(schema, name, table);
        self
    }

    /// Make `operation` on `target` fail with `message`
    pub fn with_failure(self, operation: Operation, target: &str, message: &str) -> Self {
        self.fail_on(operation, target, message);
        self
    }

    pub fn insert_table(&self, schema: &str, name: &str, table: MemoryTable) {
        self.lock()
            .schemas
            .entry(schema.to_string())
            .or_default()
            .insert(name.to_string(), table);
    }

    pub fn fail_on(&self, operation: Operation, target: &str, message: &str) {
        self.lock().failures.push(FailureRule {
            operation,
            target: target.to_string(),
            message: message.to_string(),
        });
    }

    /// Snapshot of a table
    pub fn table(&self, schema: &str, name: &str) -> Option<MemoryTable> {
        self.lock()
            .schemas
            .get(schema)
            .and_then(|tables| tables.get(name))
            .cloned()
    }

    pub fn contains(&self, schema: &str, name: &str) -> bool {
        self.table(schema, name).is_some()
    }

    /// `(schema, support_table, parent_table)` for every constraint rebuild, in order
    pub fn constraint_rebuilds(&self) -> Vec<(String, String, String)> {
        self.lock().constraint_rebuilds.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TableStore for MemoryDatabase {
    fn create_schema(&self, schema: &str) -> Result<(), DatabaseError> {
        self.lock().schemas.entry(schema.to_string()).or_default();
        Ok(())
    }

    fn table_exists(&self, schema: &str, name: &str) -> Result<bool, DatabaseError> {
        Ok(self.contains(schema, name))
    }

    fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
        let state = self.lock();
        state.check(Operation::TableNames, schema)?;
        Ok(state
            .schemas
            .get(schema)
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn rename_table(&self, schema: &str, from: &str, to: &str) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        state.check(Operation::RenameTable, from)?;
        let tables = state.schema_mut(schema)?;
        if tables.contains_key(to) {
            return Err(DatabaseError::already_exists(schema, to));
        }
        let table = tables
            .remove(from)
            .ok_or_else(|| DatabaseError::not_found(schema, from))?;
        tables.insert(to.to_string(), table);
        Ok(())
    }

    fn rename_index_if_exists(
        &self,
        schema: &str,
        from: &str,
        to: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        state.check(Operation::RenameIndex, from)?;
        let Some(tables) = state.schemas.get_mut(schema) else {
            return Ok(());
        };
        if tables.values().any(|t| t.indexes.iter().any(|i| i == to)) {
            return Err(DatabaseError::already_exists(schema, to));
        }
        for table in tables.values_mut() {
            if let Some(index) = table.indexes.iter_mut().find(|i| i.as_str() == from) {
                *index = to.to_string();
                break;
            }
        }
        Ok(())
    }

    fn set_schema(&self, schema: &str, name: &str, destination: &str) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        state.check(Operation::SetSchema, name)?;
        if state.schema(destination)?.contains_key(name) {
            return Err(DatabaseError::already_exists(destination, name));
        }
        let table = state
            .schema_mut(schema)?
            .remove(name)
            .ok_or_else(|| DatabaseError::not_found(schema, name))?;
        state
            .schema_mut(destination)?
            .insert(name.to_string(), table);
        Ok(())
    }

    fn rebuild_constraints(
        &self,
        schema: &str,
        support_table: &str,
        parent_table: &str,
    ) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        state.check(Operation::RebuildConstraints, support_table)?;
        state.table(schema, support_table)?;
        state.table(schema, parent_table)?;
        state.constraint_rebuilds.push((
            schema.to_string(),
            support_table.to_string(),
            parent_table.to_string(),
        ));
        Ok(())
    }

    fn drop_table(&self, schema: &str, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        state.check(Operation::DropTable, name)?;
        if state.table(schema, name)?.view {
            return Err(DatabaseError::Statement(format!(
                "\"{}\" is not a table",
                name
            )));
        }
        state.schema_mut(schema)?.remove(name);
        Ok(())
    }

    fn drop_view(&self, schema: &str, name: &str) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        state.check(Operation::DropView, name)?;
        if !state.table(schema, name)?.view {
            return Err(DatabaseError::Statement(format!("\"{}\" is not a view", name)));
        }
        state.schema_mut(schema)?.remove(name);
        Ok(())
    }

    fn row_count(&self, schema: &str, name: &str) -> Result<u64, DatabaseError> {
        let state = self.lock();
        state.check(Operation::RowCount, name)?;
        Ok(state.table(schema, name)?.rows)
    }

    fn geometry_type(&self, schema: &str, name: &str) -> Result<Option<String>, DatabaseError> {
        Ok(self.lock().table(schema, name)?.geometry_type.clone())
    }

    fn bounds(&self, schema: &str, name: &str) -> Result<Option<BoundingBox>, DatabaseError> {
        Ok(self.lock().table(schema, name)?.bounds)
    }

    fn create_overviews(
        &self,
        schema: &str,
        name: &str,
        zoom_levels: &[u8],
    ) -> Result<Vec<String>, DatabaseError> {
        let mut state = self.lock();
        state.check(Operation::CreateOverviews, name)?;
        let source = state.table(schema, name)?.clone();
        let max_zoom = zoom_levels.iter().copied().max().unwrap_or(0);

        // Validate everything before inserting so a failure leaves nothing behind
        let mut built = Vec::with_capacity(zoom_levels.len());
        for &zoom in zoom_levels {
            let overview = overview_table_name(name, zoom);
            if state.schema(schema)?.contains_key(&overview) {
                return Err(DatabaseError::already_exists(schema, &overview));
            }
            let depth = u32::from(max_zoom - zoom);
            let rows = source.rows / 4u64.saturating_pow(depth).max(1);
            built.push((
                overview,
                MemoryTable {
                    rows: rows.max(1),
                    indexes: Vec::new(),
                    view: false,
                    ..source.clone()
                },
            ));
        }

        let tables = state.schema_mut(schema)?;
        let names = built.iter().map(|(n, _)| n.clone()).collect();
        tables.extend(built);
        Ok(names)
    }

    fn overview_tables(&self, schema: &str, name: &str) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .lock()
            .schemas
            .get(schema)
            .map(|tables| {
                tables
                    .keys()
                    .filter(|candidate| is_overview_of(candidate, name))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryDatabase {
        MemoryDatabase::new()
            .with_schema("public")
            .with_table(
                "cdb_importer",
                "import_1",
                MemoryTable::new()
                    .with_rows(100)
                    .with_index("import_1_geom_idx"),
            )
    }

    #[test]
    fn test_rename_and_move() {
        let db = store();
        db.rename_table("cdb_importer", "import_1", "routes").unwrap();
        assert!(!db.contains("cdb_importer", "import_1"));
        assert!(db.contains("cdb_importer", "routes"));

        db.set_schema("cdb_importer", "routes", "public").unwrap();
        assert!(db.contains("public", "routes"));
        assert!(db.table_names("cdb_importer").unwrap().is_empty());
    }

    #[test]
    fn test_rename_rejects_existing_target() {
        let db = store().with_table("cdb_importer", "routes", MemoryTable::new());
        let err = db
            .rename_table("cdb_importer", "import_1", "routes")
            .unwrap_err();
        assert!(matches!(err, DatabaseError::AlreadyExists { .. }));
        assert!(db.contains("cdb_importer", "import_1"));
    }

    #[test]
    fn test_set_schema_requires_destination() {
        let db = store();
        let err = db
            .set_schema("cdb_importer", "import_1", "missing")
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(db.contains("cdb_importer", "import_1"));
    }

    #[test]
    fn test_rename_index_if_exists() {
        let db = store();
        db.rename_index_if_exists("cdb_importer", "import_1_geom_idx", "the_geom_x")
            .unwrap();
        assert_eq!(
            db.table("cdb_importer", "import_1").unwrap().indexes,
            vec!["the_geom_x"]
        );
        // Missing index is not an error
        db.rename_index_if_exists("cdb_importer", "nope", "the_geom_y")
            .unwrap();
    }

    #[test]
    fn test_injected_failure() {
        let db = store().with_failure(Operation::RenameTable, "import_1", "boom");
        let err = db
            .rename_table("cdb_importer", "import_1", "routes")
            .unwrap_err();
        assert_eq!(err.to_string(), "Database error: boom");
    }

    #[test]
    fn test_drop_table_and_view() {
        let db = store().with_table("public", "shared", MemoryTable::new().as_view());
        assert!(db.drop_table("public", "shared").is_err());
        db.drop_view("public", "shared").unwrap();
        db.drop_table("cdb_importer", "import_1").unwrap();
        assert!(matches!(
            db.drop_table("cdb_importer", "import_1"),
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[test]
    fn test_overviews_all_or_nothing() {
        let db = store().with_table("cdb_importer", "_vovw_2_import_1", MemoryTable::new());
        assert!(db.create_overviews("cdb_importer", "import_1", &[1, 2, 3]).is_err());
        assert_eq!(
            db.overview_tables("cdb_importer", "import_1").unwrap(),
            vec!["_vovw_2_import_1"]
        );

        db.drop_overviews("cdb_importer", "import_1").unwrap();
        let built = db
            .create_overviews("cdb_importer", "import_1", &[1, 2])
            .unwrap();
        assert_eq!(built, vec!["_vovw_1_import_1", "_vovw_2_import_1"]);
        assert_eq!(db.table("cdb_importer", "_vovw_1_import_1").unwrap().rows, 25);
        assert_eq!(db.table("cdb_importer", "_vovw_2_import_1").unwrap().rows, 100);
    }

    #[test]
    fn test_rebuild_constraints_records_call() {
        let db = store().with_table("cdb_importer", "o_2_import_1", MemoryTable::new());
        db.rebuild_constraints("cdb_importer", "o_2_import_1", "import_1")
            .unwrap();
        assert_eq!(db.constraint_rebuilds().len(), 1);
        assert!(db
            .rebuild_constraints("cdb_importer", "o_2_import_1", "missing")
            .is_err());
    }
}
