//! DuckDB catalog
//!
//! Entities are stored as JSON payloads next to the columns they are
//! looked up by. Table names are unique per owner, checked on insert.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{Catalog, CatalogError, VisualizationBackup};
use crate::models::{RegisteredTable, Tenant, Visualization, VisualizationType};

const CATALOG_DDL: &str = r#"
CREATE SCHEMA IF NOT EXISTS geo_import_catalog;

CREATE TABLE IF NOT EXISTS geo_import_catalog.users (
    id VARCHAR PRIMARY KEY,
    username VARCHAR NOT NULL UNIQUE,
    payload VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS geo_import_catalog.tables (
    id VARCHAR PRIMARY KEY,
    user_id VARCHAR NOT NULL,
    name VARCHAR NOT NULL,
    visualization_id VARCHAR NOT NULL,
    payload VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS geo_import_catalog.visualizations (
    id VARCHAR PRIMARY KEY,
    user_id VARCHAR NOT NULL,
    created_at VARCHAR NOT NULL,
    payload VARCHAR NOT NULL
);

CREATE TABLE IF NOT EXISTS geo_import_catalog.backups (
    username VARCHAR NOT NULL,
    visualization_id VARCHAR NOT NULL,
    payload VARCHAR NOT NULL,
    PRIMARY KEY (username, visualization_id)
);
"#;

/// Catalog stored in an embedded DuckDB database
pub struct DuckDbCatalog {
    conn: Mutex<::duckdb::Connection>,
}

impl DuckDbCatalog {
    /// Open or create a catalog at the given path
    pub fn open(path: &str) -> Result<Self, CatalogError> {
        let catalog = Self {
            conn: Mutex::new(::duckdb::Connection::open(path)?),
        };
        catalog.init()?;
        Ok(catalog)
    }

    /// Open an in-memory catalog
    pub fn memory() -> Result<Self, CatalogError> {
        let catalog = Self {
            conn: Mutex::new(::duckdb::Connection::open_in_memory()?),
        };
        catalog.init()?;
        Ok(catalog)
    }

    fn init(&self) -> Result<(), CatalogError> {
        self.lock().execute_batch(CATALOG_DDL)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ::duckdb::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decode every payload selected by `sql`
    fn select<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[&str],
    ) -> Result<Vec<T>, CatalogError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(::duckdb::params_from_iter(params.iter()), |row| {
            row.get::<_, String>(0)
        })?;
        let mut items = Vec::new();
        for row in rows {
            items.push(serde_json::from_str(&row?)?);
        }
        Ok(items)
    }

    fn select_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[&str],
    ) -> Result<Option<T>, CatalogError> {
        Ok(self.select(sql, params)?.into_iter().next())
    }
}

fn payload<T: Serialize>(value: &T) -> Result<String, CatalogError> {
    Ok(serde_json::to_string(value)?)
}

impl Catalog for DuckDbCatalog {
    fn insert_user(&self, user: &Tenant) -> Result<(), CatalogError> {
        if self.find_user_by_username(&user.username)?.is_some() {
            return Err(CatalogError::already_exists("User", &user.username));
        }
        self.lock().execute(
            "INSERT INTO geo_import_catalog.users (id, username, payload) VALUES (?1, ?2, ?3)",
            [user.id.to_string(), user.username.clone(), payload(user)?],
        )?;
        Ok(())
    }

    fn find_user(&self, id: Uuid) -> Result<Option<Tenant>, CatalogError> {
        self.select_one(
            "SELECT payload FROM geo_import_catalog.users WHERE id = ?1",
            &[&id.to_string()],
        )
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<Tenant>, CatalogError> {
        self.select_one(
            "SELECT payload FROM geo_import_catalog.users WHERE username = ?1",
            &[username],
        )
    }

    fn insert_table(&self, table: &RegisteredTable) -> Result<(), CatalogError> {
        if self.find_table(table.user_id, &table.name)?.is_some() {
            return Err(CatalogError::already_exists("Table", &table.name));
        }
        self.lock().execute(
            "INSERT INTO geo_import_catalog.tables (id, user_id, name, visualization_id, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            [
                table.id.to_string(),
                table.user_id.to_string(),
                table.name.clone(),
                table.visualization_id.to_string(),
                payload(table)?,
            ],
        )?;
        Ok(())
    }

    fn update_table(&self, table: &RegisteredTable) -> Result<(), CatalogError> {
        let updated = self.lock().execute(
            "UPDATE geo_import_catalog.tables
             SET name = ?2, visualization_id = ?3, payload = ?4
             WHERE id = ?1",
            [
                table.id.to_string(),
                table.name.clone(),
                table.visualization_id.to_string(),
                payload(table)?,
            ],
        )?;
        if updated == 0 {
            return Err(CatalogError::not_found("Table", table.id));
        }
        Ok(())
    }

    fn find_table(&self, user_id: Uuid, name: &str) -> Result<Option<RegisteredTable>, CatalogError> {
        self.select_one(
            "SELECT payload FROM geo_import_catalog.tables WHERE user_id = ?1 AND name = ?2",
            &[&user_id.to_string(), name],
        )
    }

    fn table_by_visualization(
        &self,
        visualization_id: Uuid,
    ) -> Result<Option<RegisteredTable>, CatalogError> {
        self.select_one(
            "SELECT payload FROM geo_import_catalog.tables WHERE visualization_id = ?1",
            &[&visualization_id.to_string()],
        )
    }

    fn list_tables(&self, user_id: Uuid) -> Result<Vec<RegisteredTable>, CatalogError> {
        self.select(
            "SELECT payload FROM geo_import_catalog.tables WHERE user_id = ?1 ORDER BY name",
            &[&user_id.to_string()],
        )
    }

    fn count_tables(&self, user_id: Uuid) -> Result<u64, CatalogError> {
        let count: i64 = self.lock().query_row(
            "SELECT COUNT(*) FROM geo_import_catalog.tables WHERE user_id = ?1",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn save_visualization(&self, visualization: &Visualization) -> Result<(), CatalogError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO geo_import_catalog.visualizations (id, user_id, created_at, payload)
             VALUES (?1, ?2, ?3, ?4)",
            [
                visualization.id.to_string(),
                visualization.user_id.to_string(),
                visualization.created_at.to_rfc3339(),
                payload(visualization)?,
            ],
        )?;
        Ok(())
    }

    fn find_visualization(&self, id: Uuid) -> Result<Option<Visualization>, CatalogError> {
        self.select_one(
            "SELECT payload FROM geo_import_catalog.visualizations WHERE id = ?1",
            &[&id.to_string()],
        )
    }

    fn delete_visualization(&self, id: Uuid) -> Result<bool, CatalogError> {
        let deleted = self.lock().execute(
            "DELETE FROM geo_import_catalog.visualizations WHERE id = ?1",
            [id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn list_visualizations(
        &self,
        user_id: Uuid,
        vis_type: Option<VisualizationType>,
    ) -> Result<Vec<Visualization>, CatalogError> {
        let visualizations: Vec<Visualization> = self.select(
            "SELECT payload FROM geo_import_catalog.visualizations WHERE user_id = ?1 ORDER BY created_at",
            &[&user_id.to_string()],
        )?;
        Ok(visualizations
            .into_iter()
            .filter(|v| vis_type.is_none_or(|t| v.vis_type == t))
            .collect())
    }

    fn save_backup(&self, backup: &VisualizationBackup) -> Result<(), CatalogError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO geo_import_catalog.backups (username, visualization_id, payload)
             VALUES (?1, ?2, ?3)",
            [
                backup.username.clone(),
                backup.visualization_id.to_string(),
                payload(backup)?,
            ],
        )?;
        Ok(())
    }

    fn find_backup(
        &self,
        visualization_id: Uuid,
    ) -> Result<Option<VisualizationBackup>, CatalogError> {
        self.select_one(
            "SELECT payload FROM geo_import_catalog.backups WHERE visualization_id = ?1",
            &[&visualization_id.to_string()],
        )
    }

    fn delete_backup(&self, visualization_id: Uuid) -> Result<bool, CatalogError> {
        let deleted = self.lock().execute(
            "DELETE FROM geo_import_catalog.backups WHERE visualization_id = ?1",
            [visualization_id.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_and_visualizations() {
        let catalog = DuckDbCatalog::memory().unwrap();
        let user = Tenant::new("alice");
        catalog.insert_user(&user).unwrap();
        assert!(catalog.insert_user(&Tenant::new("alice")).is_err());
        assert_eq!(
            catalog.find_user_by_username("alice").unwrap().unwrap().id,
            user.id
        );

        let vis = Visualization::new("routes", VisualizationType::Table, user.id);
        catalog.save_visualization(&vis).unwrap();

        let mut table = RegisteredTable::new(user.id, "public", "routes");
        table.visualization_id = vis.id;
        catalog.insert_table(&table).unwrap();
        assert!(matches!(
            catalog.insert_table(&RegisteredTable::new(user.id, "public", "routes")),
            Err(CatalogError::AlreadyExists { .. })
        ));
        assert_eq!(catalog.count_tables(user.id).unwrap(), 1);

        table.name_alias = Some("Routes".to_string());
        catalog.update_table(&table).unwrap();
        let found = catalog.table_by_visualization(vis.id).unwrap().unwrap();
        assert_eq!(found.name_alias.as_deref(), Some("Routes"));

        assert_eq!(
            catalog
                .list_visualizations(user.id, Some(VisualizationType::Table))
                .unwrap()
                .len(),
            1
        );
        assert!(catalog.delete_visualization(vis.id).unwrap());
        assert!(catalog.find_visualization(vis.id).unwrap().is_none());
    }

    #[test]
    fn test_backups() {
        let catalog = DuckDbCatalog::memory().unwrap();
        let id = Uuid::new_v4();
        catalog
            .save_backup(&VisualizationBackup::new("alice", id, "{}"))
            .unwrap();
        catalog
            .save_backup(&VisualizationBackup::new("alice", id, "{\"version\":1}"))
            .unwrap();
        assert_eq!(
            catalog.find_backup(id).unwrap().unwrap().export_document,
            "{\"version\":1}"
        );
        assert!(catalog.delete_backup(id).unwrap());
        assert!(catalog.find_backup(id).unwrap().is_none());
    }
}
