//! Table quota checks

use std::sync::Arc;

use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::ImportResult;

/// Trait for tenant quota checks
pub trait QuotaChecker: Send + Sync {
    /// Whether registering `additional` more tables would exceed the quota
    fn would_exceed_table_quota(&self, additional: usize) -> ImportResult<bool>;

    /// Whether the tenant is already past the quota
    fn is_over_table_quota(&self) -> ImportResult<bool> {
        self.would_exceed_table_quota(0)
    }
}

/// Counts the tenant's registered tables against a limit
pub struct TableQuota {
    catalog: Arc<dyn Catalog>,
    user_id: Uuid,
    limit: Option<u64>,
}

impl TableQuota {
    pub fn new(catalog: Arc<dyn Catalog>, user_id: Uuid, limit: Option<u64>) -> Self {
        Self {
            catalog,
            user_id,
            limit,
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }
}

impl QuotaChecker for TableQuota {
    fn would_exceed_table_quota(&self, additional: usize) -> ImportResult<bool> {
        let Some(limit) = self.limit else {
            return Ok(false);
        };
        let current = self.catalog.count_tables(self.user_id)?;
        Ok(current + additional as u64 > limit)
    }

    fn is_over_table_quota(&self) -> ImportResult<bool> {
        let Some(limit) = self.limit else {
            return Ok(false);
        };
        Ok(self.catalog.count_tables(self.user_id)? > limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::{RegisteredTable, Tenant};

    fn catalog_with_tables(user: &Tenant, count: usize) -> Arc<MemoryCatalog> {
        let catalog = Arc::new(MemoryCatalog::new().with_user(user));
        for i in 0..count {
            catalog
                .insert_table(&RegisteredTable::new(user.id, "public", format!("t{}", i)))
                .unwrap();
        }
        catalog
    }

    #[test]
    fn test_unlimited_quota() {
        let user = Tenant::new("alice");
        let quota = TableQuota::new(catalog_with_tables(&user, 3), user.id, None);
        assert!(!quota.would_exceed_table_quota(1_000).unwrap());
        assert!(!quota.is_over_table_quota().unwrap());
    }

    #[test]
    fn test_quota_boundary() {
        let user = Tenant::new("alice");
        let quota = TableQuota::new(catalog_with_tables(&user, 3), user.id, Some(5));
        assert!(!quota.would_exceed_table_quota(2).unwrap());
        assert!(quota.would_exceed_table_quota(3).unwrap());
        assert!(!quota.is_over_table_quota().unwrap());
    }

    #[test]
    fn test_over_quota() {
        let user = Tenant::new("alice");
        let quota = TableQuota::new(catalog_with_tables(&user, 4), user.id, Some(3));
        assert!(quota.is_over_table_quota().unwrap());
        assert!(quota.would_exceed_table_quota(0).unwrap());
    }
}
