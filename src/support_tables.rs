//! Auxiliary tables that follow their parent table through renames and schema moves

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::database::{DatabaseError, TableStore};
use crate::naming::{MAX_IDENTIFIER_LENGTH, truncate};

/// A support table location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportTable {
    pub schema: String,
    pub name: String,
}

impl SupportTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

/// Outcome of renaming the tracked support tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupportRenameOutcome {
    pub success: bool,
    /// Old name -> new name, for every table actually renamed
    pub names: HashMap<String, String>,
}

/// Tracks the support tables of one result while it is registered
///
/// Built fresh for every registration. Constraint rebuilds can be deferred at
/// rename time; they then run once, after the final schema move.
pub struct SupportTables {
    store: Arc<dyn TableStore>,
    tables: Vec<SupportTable>,
    constraints_pending: bool,
}

impl SupportTables {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            tables: Vec::new(),
            constraints_pending: false,
        }
    }

    /// Replace the tracked tables with `names` living in `schema`
    pub fn track(&mut self, schema: &str, names: &[String]) {
        self.tables = names
            .iter()
            .map(|name| SupportTable::new(schema, name.as_str()))
            .collect();
    }

    pub fn tables(&self) -> &[SupportTable] {
        &self.tables
    }

    pub fn constraints_pending(&self) -> bool {
        self.constraints_pending
    }

    /// Rename every tracked table, substituting `old_parent` with `new_parent` in its name
    ///
    /// Stops at the first failing rename and reports `success: false` with the
    /// renames done so far.
    pub fn rename(
        &mut self,
        old_parent: &str,
        new_parent: &str,
        rebuild_constraints_now: bool,
    ) -> SupportRenameOutcome {
        let mut outcome = SupportRenameOutcome {
            success: true,
            names: HashMap::new(),
        };

        for table in self.tables.iter_mut() {
            let renamed = support_table_name(&table.name, old_parent, new_parent);
            if renamed == table.name {
                continue;
            }
            if let Err(e) = self.store.rename_table(&table.schema, &table.name, &renamed) {
                warn!(
                    schema = %table.schema,
                    table = %table.name,
                    error = %e,
                    "Support table rename failed"
                );
                outcome.success = false;
                return outcome;
            }
            debug!(schema = %table.schema, from = %table.name, to = %renamed, "Renamed support table");
            outcome.names.insert(table.name.clone(), renamed.clone());
            table.name = renamed;
        }

        if self.tables.is_empty() {
            return outcome;
        }
        if rebuild_constraints_now {
            if let Err(e) = self.rebuild_constraints(new_parent) {
                warn!(parent = new_parent, error = %e, "Support table constraint rebuild failed");
                outcome.success = false;
            }
        } else {
            self.constraints_pending = true;
        }
        outcome
    }

    /// Move every tracked table to `destination`, then run deferred constraint rebuilds
    pub fn change_schema(&mut self, destination: &str, parent: &str) -> Result<(), DatabaseError> {
        for table in self.tables.iter_mut() {
            if table.schema == destination {
                continue;
            }
            self.store
                .set_schema(&table.schema, &table.name, destination)?;
            debug!(table = %table.name, from = %table.schema, to = destination, "Moved support table");
            table.schema = destination.to_string();
        }
        self.rebuild_pending_constraints(parent)
    }

    /// Run deferred constraint rebuilds where the tables currently are
    pub fn rebuild_pending_constraints(&mut self, parent: &str) -> Result<(), DatabaseError> {
        if !self.constraints_pending {
            return Ok(());
        }
        self.rebuild_constraints(parent)?;
        self.constraints_pending = false;
        Ok(())
    }

    fn rebuild_constraints(&self, parent: &str) -> Result<(), DatabaseError> {
        for table in &self.tables {
            self.store
                .rebuild_constraints(&table.schema, &table.name, parent)?;
        }
        Ok(())
    }
}

/// Name a support table gets when its parent is renamed
pub fn support_table_name(name: &str, old_parent: &str, new_parent: &str) -> String {
    if old_parent.is_empty() || !name.contains(old_parent) {
        return name.to_string();
    }
    let renamed = name.replace(old_parent, new_parent);
    truncate(&renamed, MAX_IDENTIFIER_LENGTH).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryDatabase, MemoryTable, Operation};

    fn store() -> Arc<MemoryDatabase> {
        Arc::new(
            MemoryDatabase::new()
                .with_schema("public")
                .with_table("cdb_importer", "routes", MemoryTable::new())
                .with_table("cdb_importer", "o_2_import_1", MemoryTable::new())
                .with_table("cdb_importer", "o_4_import_1", MemoryTable::new()),
        )
    }

    fn tracker(db: &Arc<MemoryDatabase>) -> SupportTables {
        let mut support = SupportTables::new(db.clone());
        support.track(
            "cdb_importer",
            &["o_2_import_1".to_string(), "o_4_import_1".to_string()],
        );
        support
    }

    #[test]
    fn test_support_table_name() {
        assert_eq!(support_table_name("o_2_import_1", "import_1", "routes"), "o_2_routes");
        assert_eq!(support_table_name("unrelated", "import_1", "routes"), "unrelated");
        let long = "x".repeat(70);
        assert_eq!(
            support_table_name("o_import_1", "import_1", &long).len(),
            MAX_IDENTIFIER_LENGTH
        );
    }

    #[test]
    fn test_support_table_name_keeps_multibyte_chars_whole() {
        // 62 ASCII bytes followed by a two-byte character straddling the limit
        let parent = format!("{}é", "r".repeat(62));
        let renamed = support_table_name("import_1_lines", "import_1", &parent);
        assert_eq!(renamed, "r".repeat(62));
        assert!(renamed.len() <= MAX_IDENTIFIER_LENGTH);

        let parent = format!("{}ü", "a".repeat(60));
        let renamed = support_table_name("o_import_1", "import_1", &parent);
        assert_eq!(renamed, format!("o_{}", "a".repeat(60)));
    }

    #[test]
    fn test_rename_defers_constraints_until_move() {
        let db = store();
        let mut support = tracker(&db);

        let outcome = support.rename("import_1", "routes", false);
        assert!(outcome.success);
        assert_eq!(outcome.names["o_2_import_1"], "o_2_routes");
        assert!(support.constraints_pending());
        assert!(db.constraint_rebuilds().is_empty());

        db.set_schema("cdb_importer", "routes", "public").unwrap();
        support.change_schema("public", "routes").unwrap();
        assert!(db.contains("public", "o_2_routes"));
        assert!(db.contains("public", "o_4_routes"));

        let rebuilds = db.constraint_rebuilds();
        assert_eq!(rebuilds.len(), 2);
        assert!(rebuilds.iter().all(|(schema, _, parent)| schema == "public" && parent == "routes"));
        assert!(!support.constraints_pending());

        // Already rebuilt; a second call does nothing
        support.rebuild_pending_constraints("routes").unwrap();
        assert_eq!(db.constraint_rebuilds().len(), 2);
    }

    #[test]
    fn test_rename_reports_failure() {
        let db = store();
        db.fail_on(Operation::RenameTable, "o_4_import_1", "locked");
        let mut support = tracker(&db);

        let outcome = support.rename("import_1", "routes", false);
        assert!(!outcome.success);
        assert_eq!(outcome.names.len(), 1);
        assert!(db.contains("cdb_importer", "o_4_import_1"));
    }

    #[test]
    fn test_change_schema_propagates_failure() {
        let db = store();
        db.fail_on(Operation::SetSchema, "o_2_import_1", "permission denied");
        let mut support = tracker(&db);
        assert!(support.change_schema("public", "routes").is_err());
    }
}
