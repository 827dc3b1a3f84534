// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Database selection for a session

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::debug;

use crate::error::{DorisError, Result};
use crate::session::ConnectContext;

pub const DEFAULT_CATALOG: &str = "internal";

pub trait CatalogManager: Send + Sync {
    /// Switch the session to `db`, which may be qualified as `catalog.db`.
    /// The session is left unchanged on error.
    fn change_catalog_db(&self, ctx: &mut ConnectContext, db: &str) -> Result<()>;
}

/// Catalogs and their databases held in memory.
pub struct InMemoryCatalog {
    catalogs: DashMap<String, HashSet<String>>,
    default_catalog: String,
}

impl InMemoryCatalog {
    pub fn new(default_catalog: &str) -> Self {
        let catalogs = DashMap::new();
        catalogs.insert(default_catalog.to_string(), HashSet::new());
        Self {
            catalogs,
            default_catalog: default_catalog.to_string(),
        }
    }

    pub fn with_databases<I, S>(self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for db in databases {
            self.create_database(&self.default_catalog, db.as_ref());
        }
        self
    }

    pub fn create_database(&self, catalog: &str, db: &str) {
        self.catalogs
            .entry(catalog.to_string())
            .or_default()
            .insert(db.to_string());
    }

    pub fn drop_database(&self, catalog: &str, db: &str) -> bool {
        self.catalogs
            .get_mut(catalog)
            .map(|mut dbs| dbs.remove(db))
            .unwrap_or(false)
    }

    fn contains(&self, catalog: &str, db: &str) -> bool {
        self.catalogs
            .get(catalog)
            .map(|dbs| dbs.contains(db))
            .unwrap_or(false)
    }

    /// `catalog.db` when the prefix names a known catalog, otherwise `db` in
    /// the session's current catalog.
    fn resolve<'a>(&self, ctx: &'a ConnectContext, name: &'a str) -> (&'a str, &'a str) {
        if let Some((catalog, db)) = name.split_once('.') {
            if self.catalogs.contains_key(catalog) {
                return (catalog, db);
            }
        }
        (ctx.current_catalog(), name)
    }
}

impl CatalogManager for InMemoryCatalog {
    fn change_catalog_db(&self, ctx: &mut ConnectContext, db: &str) -> Result<()> {
        let (catalog, name) = self.resolve(ctx, db);
        if !self.contains(catalog, name) {
            return Err(DorisError::UnknownDatabase(db.to_string()));
        }
        let (catalog, name) = (catalog.to_string(), name.to_string());
        debug!("connection {} uses {}.{}", ctx.connection_id(), catalog, name);
        ctx.set_catalog_db(&catalog, &name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> InMemoryCatalog {
        let catalog = InMemoryCatalog::new(DEFAULT_CATALOG).with_databases(["tpch", "ssb"]);
        catalog.create_database("hive", "logs");
        catalog
    }

    #[test]
    fn test_change_db() {
        let catalog = catalog();
        let mut ctx = ConnectContext::new(1, false);

        catalog.change_catalog_db(&mut ctx, "tpch").unwrap();
        assert_eq!(ctx.current_catalog(), "internal");
        assert_eq!(ctx.current_db(), Some("tpch"));
    }

    #[test]
    fn test_change_qualified_db() {
        let catalog = catalog();
        let mut ctx = ConnectContext::new(1, false);

        catalog.change_catalog_db(&mut ctx, "hive.logs").unwrap();
        assert_eq!(ctx.current_catalog(), "hive");
        assert_eq!(ctx.current_db(), Some("logs"));

        // Unqualified names now resolve in hive.
        assert!(catalog.change_catalog_db(&mut ctx, "tpch").is_err());
    }

    #[test]
    fn test_unknown_db_leaves_session() {
        let catalog = catalog();
        let mut ctx = ConnectContext::new(1, false);
        catalog.change_catalog_db(&mut ctx, "ssb").unwrap();

        let err = catalog.change_catalog_db(&mut ctx, "missing").unwrap_err();
        assert!(matches!(err, DorisError::UnknownDatabase(db) if db == "missing"));
        assert_eq!(ctx.current_db(), Some("ssb"));

        assert!(catalog.drop_database("internal", "ssb"));
        assert!(catalog.change_catalog_db(&mut ctx, "internal.ssb").is_err());
    }
}
