//! In-memory catalog

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use super::{Catalog, CatalogError, VisualizationBackup};
use crate::models::{RegisteredTable, Tenant, Visualization, VisualizationType};

/// Catalog operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOperation {
    InsertTable,
    SaveVisualization,
}

#[derive(Debug, Default)]
struct CatalogState {
    users: HashMap<Uuid, Tenant>,
    tables: Vec<RegisteredTable>,
    visualizations: HashMap<Uuid, Visualization>,
    backups: Vec<VisualizationBackup>,
    failures: Vec<(CatalogOperation, String, String)>,
}

impl CatalogState {
    fn check(&self, operation: CatalogOperation, target: &str) -> Result<(), CatalogError> {
        match self
            .failures
            .iter()
            .find(|(op, t, _)| *op == operation && t == target)
        {
            Some((_, _, message)) => Err(CatalogError::Backend(message.clone())),
            None => Ok(()),
        }
    }
}

/// Catalog kept in process memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: &Tenant) -> Self {
        self.lock().users.insert(user.id, user.clone());
        self
    }

    /// Make `operation` on the entity named `target` fail with `message`
    pub fn with_failure(self, operation: CatalogOperation, target: &str, message: &str) -> Self {
        self.lock()
            .failures
            .push((operation, target.to_string(), message.to_string()));
        self
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Catalog for MemoryCatalog {
    fn insert_user(&self, user: &Tenant) -> Result<(), CatalogError> {
        let mut state = self.lock();
        if state.users.values().any(|u| u.username == user.username) {
            return Err(CatalogError::already_exists("User", &user.username));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    fn find_user(&self, id: Uuid) -> Result<Option<Tenant>, CatalogError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<Tenant>, CatalogError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    fn insert_table(&self, table: &RegisteredTable) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.check(CatalogOperation::InsertTable, &table.name)?;
        if state
            .tables
            .iter()
            .any(|t| t.user_id == table.user_id && t.name == table.name)
        {
            return Err(CatalogError::already_exists("Table", &table.name));
        }
        state.tables.push(table.clone());
        Ok(())
    }

    fn update_table(&self, table: &RegisteredTable) -> Result<(), CatalogError> {
        let mut state = self.lock();
        let existing = state
            .tables
            .iter_mut()
            .find(|t| t.id == table.id)
            .ok_or_else(|| CatalogError::not_found("Table", table.id))?;
        *existing = table.clone();
        Ok(())
    }

    fn find_table(&self, user_id: Uuid, name: &str) -> Result<Option<RegisteredTable>, CatalogError> {
        Ok(self
            .lock()
            .tables
            .iter()
            .find(|t| t.user_id == user_id && t.name == name)
            .cloned())
    }

    fn table_by_visualization(
        &self,
        visualization_id: Uuid,
    ) -> Result<Option<RegisteredTable>, CatalogError> {
        Ok(self
            .lock()
            .tables
            .iter()
            .find(|t| t.visualization_id == visualization_id)
            .cloned())
    }

    fn list_tables(&self, user_id: Uuid) -> Result<Vec<RegisteredTable>, CatalogError> {
        Ok(self
            .lock()
            .tables
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    fn save_visualization(&self, visualization: &Visualization) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.check(CatalogOperation::SaveVisualization, &visualization.name)?;
        state
            .visualizations
            .insert(visualization.id, visualization.clone());
        Ok(())
    }

    fn find_visualization(&self, id: Uuid) -> Result<Option<Visualization>, CatalogError> {
        Ok(self.lock().visualizations.get(&id).cloned())
    }

    fn delete_visualization(&self, id: Uuid) -> Result<bool, CatalogError> {
        Ok(self.lock().visualizations.remove(&id).is_some())
    }

    fn list_visualizations(
        &self,
        user_id: Uuid,
        vis_type: Option<VisualizationType>,
    ) -> Result<Vec<Visualization>, CatalogError> {
        let mut visualizations: Vec<Visualization> = self
            .lock()
            .visualizations
            .values()
            .filter(|v| v.user_id == user_id && vis_type.is_none_or(|t| v.vis_type == t))
            .cloned()
            .collect();
        visualizations.sort_by_key(|v| v.created_at);
        Ok(visualizations)
    }

    fn save_backup(&self, backup: &VisualizationBackup) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.backups.retain(|b| {
            !(b.username == backup.username && b.visualization_id == backup.visualization_id)
        });
        state.backups.push(backup.clone());
        Ok(())
    }

    fn find_backup(
        &self,
        visualization_id: Uuid,
    ) -> Result<Option<VisualizationBackup>, CatalogError> {
        Ok(self
            .lock()
            .backups
            .iter()
            .find(|b| b.visualization_id == visualization_id)
            .cloned())
    }

    fn delete_backup(&self, visualization_id: Uuid) -> Result<bool, CatalogError> {
        let mut state = self.lock();
        let before = state.backups.len();
        state
            .backups
            .retain(|b| b.visualization_id != visualization_id);
        Ok(state.backups.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_registration_is_unique_per_user() {
        let user = Tenant::new("alice");
        let catalog = MemoryCatalog::new().with_user(&user);
        let table = RegisteredTable::new(user.id, "public", "routes");
        catalog.insert_table(&table).unwrap();

        let dup = RegisteredTable::new(user.id, "public", "routes");
        assert!(matches!(
            catalog.insert_table(&dup),
            Err(CatalogError::AlreadyExists { .. })
        ));

        let other = Tenant::new("bob");
        catalog
            .insert_table(&RegisteredTable::new(other.id, "public", "routes"))
            .unwrap();
        assert_eq!(catalog.count_tables(user.id).unwrap(), 1);
        assert_eq!(
            catalog
                .table_by_visualization(table.visualization_id)
                .unwrap()
                .unwrap()
                .id,
            table.id
        );
    }

    #[test]
    fn test_backups_replace_and_delete() {
        let id = Uuid::new_v4();
        let catalog = MemoryCatalog::new();
        catalog
            .save_backup(&VisualizationBackup::new("alice", id, "{}"))
            .unwrap();
        catalog
            .save_backup(&VisualizationBackup::new("alice", id, "{\"v\":2}"))
            .unwrap();
        assert_eq!(
            catalog.find_backup(id).unwrap().unwrap().export_document,
            "{\"v\":2}"
        );
        assert!(catalog.delete_backup(id).unwrap());
        assert!(!catalog.delete_backup(id).unwrap());
    }

    #[test]
    fn test_injected_insert_failure() {
        let user = Tenant::new("alice");
        let catalog =
            MemoryCatalog::new().with_failure(CatalogOperation::InsertTable, "routes", "disk full");
        let err = catalog
            .insert_table(&RegisteredTable::new(user.id, "public", "routes"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Catalog error: disk full");
    }
}
