//! DuckDB table store
//!
//! Geometries are read from a WKT `the_geom` column or from a pair of
//! longitude/latitude columns. DuckDB cannot move tables between schemas or
//! attach foreign keys to existing tables, so schema moves copy the table and
//! support-table links are kept in a bookkeeping table.

use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{DatabaseError, TableStore, is_overview_of, overview_table_name, qualify, quote_ident};
use crate::models::BoundingBox;

/// Schema holding the store's own bookkeeping tables
pub const META_SCHEMA: &str = "geo_import_meta";

const GEOMETRY_COLUMN: &str = "the_geom";

const COORDINATE_COLUMNS: &[(&str, &str)] = &[
    ("longitude", "latitude"),
    ("lon", "lat"),
    ("lng", "lat"),
];

static WKT_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:SRID=\d+;\s*)?([A-Za-z]+)").unwrap());

static WKT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?").unwrap());

/// Where a table keeps its geometries
enum GeometrySource {
    Wkt,
    Coordinates(&'static str, &'static str),
}

/// Table store backed by an embedded DuckDB database
pub struct DuckDbDatabase {
    conn: Mutex<::duckdb::Connection>,
    path: Option<String>,
}

impl DuckDbDatabase {
    /// Open or create a database at the given path
    pub fn open(path: &str) -> Result<Self, DatabaseError> {
        let conn = ::duckdb::Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database
    pub fn memory() -> Result<Self, DatabaseError> {
        let conn = ::duckdb::Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        db.init()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Run raw SQL, used to stage data
    pub fn execute_batch(&self, sql: &str) -> Result<(), DatabaseError> {
        self.lock().execute_batch(sql)?;
        Ok(())
    }

    /// Support tables linked to `parent_table`
    pub fn support_links(&self, schema: &str, parent_table: &str) -> Result<Vec<String>, DatabaseError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT support_table FROM {} WHERE schema_name = ?1 AND parent_table = ?2 ORDER BY support_table",
            qualify(META_SCHEMA, "support_links")
        ))?;
        let rows = stmt.query_map([schema, parent_table], |row| row.get::<_, String>(0))?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    fn init(&self) -> Result<(), DatabaseError> {
        self.lock().execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {links} (
                 schema_name VARCHAR NOT NULL,
                 support_table VARCHAR NOT NULL,
                 parent_table VARCHAR NOT NULL,
                 PRIMARY KEY (schema_name, support_table)
             );",
            schema = quote_ident(META_SCHEMA),
            links = qualify(META_SCHEMA, "support_links"),
        ))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ::duckdb::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn relation_type(
        conn: &::duckdb::Connection,
        schema: &str,
        name: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT table_type FROM information_schema.tables WHERE table_schema = ?1 AND table_name = ?2",
        )?;
        let mut rows = stmt.query_map([schema, name], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn require_table(conn: &::duckdb::Connection, schema: &str, name: &str) -> Result<(), DatabaseError> {
        match Self::relation_type(conn, schema, name)? {
            Some(_) => Ok(()),
            None => Err(DatabaseError::not_found(schema, name)),
        }
    }

    fn columns(conn: &::duckdb::Connection, schema: &str, name: &str) -> Result<Vec<String>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_schema = ?1 AND table_name = ?2 ORDER BY ordinal_position",
        )?;
        let rows = stmt.query_map([schema, name], |row| row.get::<_, String>(0))?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?.to_lowercase());
        }
        Ok(columns)
    }

    fn geometry_source(
        conn: &::duckdb::Connection,
        schema: &str,
        name: &str,
    ) -> Result<Option<GeometrySource>, DatabaseError> {
        Self::require_table(conn, schema, name)?;
        let columns = Self::columns(conn, schema, name)?;
        if columns.iter().any(|c| c == GEOMETRY_COLUMN) {
            return Ok(Some(GeometrySource::Wkt));
        }
        Ok(COORDINATE_COLUMNS
            .iter()
            .find(|(x, y)| columns.iter().any(|c| c == x) && columns.iter().any(|c| c == y))
            .map(|(x, y)| GeometrySource::Coordinates(x, y)))
    }
}

/// Canonical geometry type name for a WKT keyword
fn geometry_type_name(keyword: &str) -> String {
    match keyword.to_ascii_uppercase().as_str() {
        "POINT" => "Point".to_string(),
        "MULTIPOINT" => "MultiPoint".to_string(),
        "LINESTRING" => "LineString".to_string(),
        "MULTILINESTRING" => "MultiLineString".to_string(),
        "POLYGON" => "Polygon".to_string(),
        "MULTIPOLYGON" => "MultiPolygon".to_string(),
        "GEOMETRYCOLLECTION" => "GeometryCollection".to_string(),
        other => other.to_lowercase(),
    }
}

/// Extend `bounds` with every coordinate pair of a WKT string
fn extend_with_wkt(bounds: Option<BoundingBox>, wkt: &str) -> Option<BoundingBox> {
    let body = match wkt.find('(') {
        Some(start) => &wkt[start..],
        None => return bounds,
    };
    let numbers: Vec<f64> = WKT_NUMBER
        .find_iter(body)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    numbers.chunks_exact(2).fold(bounds, |acc, pair| {
        let point = BoundingBox::new(pair[0], pair[1], pair[0], pair[1]);
        Some(match acc {
            Some(b) => b.union(&point),
            None => point,
        })
    })
}

/// Sampling percentage of the overview at `zoom` relative to the deepest level
fn sample_percent(zoom: u8, max_zoom: u8) -> f64 {
    let depth = i32::from(max_zoom.saturating_sub(zoom));
    100.0 / 4f64.powi(depth)
}

impl TableStore for DuckDbDatabase {
    fn create_schema(&self, schema: &str) -> Result<(), DatabaseError> {
        self.lock()
            .execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))?;
        Ok(())
    }

    fn table_exists(&self, schema: &str, name: &str) -> Result<bool, DatabaseError> {
        Ok(Self::relation_type(&self.lock(), schema, name)?.is_some())
    }

    fn table_names(&self, schema: &str) -> Result<Vec<String>, DatabaseError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = ?1 ORDER BY table_name",
        )?;
        let rows = stmt.query_map([schema], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    fn rename_table(&self, schema: &str, from: &str, to: &str) -> Result<(), DatabaseError> {
        let conn = self.lock();
        Self::require_table(&conn, schema, from)?;
        if Self::relation_type(&conn, schema, to)?.is_some() {
            return Err(DatabaseError::already_exists(schema, to));
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            qualify(schema, from),
            quote_ident(to)
        ))?;
        conn.execute(
            &format!(
                "UPDATE {} SET parent_table = ?1 WHERE schema_name = ?2 AND parent_table = ?3",
                qualify(META_SCHEMA, "support_links")
            ),
            [to, schema, from],
        )?;
        debug!(schema, from, to, "Renamed table");
        Ok(())
    }

    fn rename_index_if_exists(
        &self,
        schema: &str,
        from: &str,
        to: &str,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.lock();
        let definition = {
            let mut stmt = conn.prepare(
                "SELECT sql FROM duckdb_indexes() WHERE schema_name = ?1 AND index_name = ?2",
            )?;
            let mut rows = stmt.query_map([schema, from], |row| row.get::<_, Option<String>>(0))?;
            match rows.next() {
                Some(row) => row?,
                None => return Ok(()),
            }
        };
        let Some(definition) = definition else {
            return Err(DatabaseError::Statement(format!(
                "Index {} has no stored definition",
                from
            )));
        };

        // DuckDB has no ALTER INDEX ... RENAME, recreate under the new name
        let recreated = definition.replacen(from, &quote_ident(to), 1);
        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP INDEX {}", qualify(schema, from)))?;
        // Stored definitions name the table without its schema
        tx.execute_batch(&format!(
            "SET schema = '{}'; {}; RESET schema;",
            schema.replace('\'', "''"),
            recreated.trim_end_matches(';')
        ))?;
        tx.commit()?;
        debug!(schema, from, to, "Renamed index");
        Ok(())
    }

    fn set_schema(&self, schema: &str, name: &str, destination: &str) -> Result<(), DatabaseError> {
        let mut conn = self.lock();
        match Self::relation_type(&conn, schema, name)?.as_deref() {
            None => return Err(DatabaseError::not_found(schema, name)),
            Some("VIEW") => {
                return Err(DatabaseError::Statement(format!(
                    "Cannot move view {} to another schema",
                    qualify(schema, name)
                )));
            }
            Some(_) => {}
        }
        if Self::relation_type(&conn, destination, name)?.is_some() {
            return Err(DatabaseError::already_exists(destination, name));
        }

        let tx = conn.transaction()?;
        tx.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {dest_schema};
             CREATE TABLE {dest} AS SELECT * FROM {src};
             DROP TABLE {src};",
            dest_schema = quote_ident(destination),
            dest = qualify(destination, name),
            src = qualify(schema, name),
        ))?;
        tx.execute(
            &format!(
                "DELETE FROM {} WHERE schema_name = ?1 AND support_table = ?2",
                qualify(META_SCHEMA, "support_links")
            ),
            [schema, name],
        )?;
        tx.commit()?;
        debug!(schema, name, destination, "Moved table");
        Ok(())
    }

    fn rebuild_constraints(
        &self,
        schema: &str,
        support_table: &str,
        parent_table: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.lock();
        Self::require_table(&conn, schema, support_table)?;
        Self::require_table(&conn, schema, parent_table)?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (schema_name, support_table, parent_table) VALUES (?1, ?2, ?3)",
                qualify(META_SCHEMA, "support_links")
            ),
            [schema, support_table, parent_table],
        )?;
        Ok(())
    }

    fn drop_table(&self, schema: &str, name: &str) -> Result<(), DatabaseError> {
        let conn = self.lock();
        match Self::relation_type(&conn, schema, name)?.as_deref() {
            None => return Err(DatabaseError::not_found(schema, name)),
            Some("VIEW") => {
                return Err(DatabaseError::Statement(format!(
                    "{} is a view",
                    qualify(schema, name)
                )));
            }
            Some(_) => {}
        }
        conn.execute_batch(&format!("DROP TABLE {}", qualify(schema, name)))?;
        conn.execute(
            &format!(
                "DELETE FROM {} WHERE schema_name = ?1 AND (support_table = ?2 OR parent_table = ?2)",
                qualify(META_SCHEMA, "support_links")
            ),
            [schema, name],
        )?;
        Ok(())
    }

    fn drop_view(&self, schema: &str, name: &str) -> Result<(), DatabaseError> {
        let conn = self.lock();
        match Self::relation_type(&conn, schema, name)?.as_deref() {
            Some("VIEW") => {}
            None => return Err(DatabaseError::not_found(schema, name)),
            Some(_) => {
                return Err(DatabaseError::Statement(format!(
                    "{} is not a view",
                    qualify(schema, name)
                )));
            }
        }
        conn.execute_batch(&format!("DROP VIEW {}", qualify(schema, name)))?;
        Ok(())
    }

    fn row_count(&self, schema: &str, name: &str) -> Result<u64, DatabaseError> {
        let conn = self.lock();
        Self::require_table(&conn, schema, name)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", qualify(schema, name)),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn geometry_type(&self, schema: &str, name: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.lock();
        match Self::geometry_source(&conn, schema, name)? {
            None => Ok(None),
            Some(GeometrySource::Coordinates(_, _)) => Ok(Some("Point".to_string())),
            Some(GeometrySource::Wkt) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT CAST({col} AS VARCHAR) FROM {table} WHERE {col} IS NOT NULL LIMIT 1",
                    col = quote_ident(GEOMETRY_COLUMN),
                    table = qualify(schema, name),
                ))?;
                let mut rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let first = match rows.next() {
                    Some(row) => row?,
                    None => return Ok(Some("geometry".to_string())),
                };
                Ok(WKT_TYPE
                    .captures(&first)
                    .map(|c| geometry_type_name(&c[1]))
                    .or_else(|| Some("geometry".to_string())))
            }
        }
    }

    fn bounds(&self, schema: &str, name: &str) -> Result<Option<BoundingBox>, DatabaseError> {
        let conn = self.lock();
        match Self::geometry_source(&conn, schema, name)? {
            None => Ok(None),
            Some(GeometrySource::Coordinates(x, y)) => {
                let (min_x, min_y, max_x, max_y): (Option<f64>, Option<f64>, Option<f64>, Option<f64>) =
                    conn.query_row(
                        &format!(
                            "SELECT CAST(MIN({x}) AS DOUBLE), CAST(MIN({y}) AS DOUBLE),
                                    CAST(MAX({x}) AS DOUBLE), CAST(MAX({y}) AS DOUBLE)
                             FROM {table}",
                            x = quote_ident(x),
                            y = quote_ident(y),
                            table = qualify(schema, name),
                        ),
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )?;
                Ok(match (min_x, min_y, max_x, max_y) {
                    (Some(a), Some(b), Some(c), Some(d)) => Some(BoundingBox::new(a, b, c, d)),
                    _ => None,
                })
            }
            Some(GeometrySource::Wkt) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT CAST({col} AS VARCHAR) FROM {table} WHERE {col} IS NOT NULL",
                    col = quote_ident(GEOMETRY_COLUMN),
                    table = qualify(schema, name),
                ))?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut bounds = None;
                for row in rows {
                    bounds = extend_with_wkt(bounds, &row?);
                }
                Ok(bounds)
            }
        }
    }

    fn create_overviews(
        &self,
        schema: &str,
        name: &str,
        zoom_levels: &[u8],
    ) -> Result<Vec<String>, DatabaseError> {
        let mut conn = self.lock();
        Self::require_table(&conn, schema, name)?;
        let Some(max_zoom) = zoom_levels.iter().copied().max() else {
            return Ok(Vec::new());
        };

        let source = qualify(schema, name);
        let tx = conn.transaction()?;
        let mut created = Vec::with_capacity(zoom_levels.len());
        for &zoom in zoom_levels {
            let overview = overview_table_name(name, zoom);
            let percent = sample_percent(zoom, max_zoom);
            let select = if percent >= 100.0 {
                format!("SELECT * FROM {}", source)
            } else {
                format!(
                    "SELECT * FROM {} USING SAMPLE {:.6} PERCENT (bernoulli)",
                    source, percent
                )
            };
            tx.execute_batch(&format!(
                "CREATE OR REPLACE TABLE {} AS {}",
                qualify(schema, &overview),
                select
            ))?;
            created.push(overview);
        }
        // Dropping `tx` without commit rolls every overview back
        tx.commit()?;
        debug!(schema, name, count = created.len(), "Created overviews");
        Ok(created)
    }

    fn overview_tables(&self, schema: &str, name: &str) -> Result<Vec<String>, DatabaseError> {
        Ok(self
            .table_names(schema)?
            .into_iter()
            .filter(|candidate| is_overview_of(candidate, name))
            .collect())
    }
}
