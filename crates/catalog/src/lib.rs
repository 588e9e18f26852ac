use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use ahash::RandomState;
use common::{DbError, DbResult, Schema, TableId};
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use storage::HeapFile;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Registry of the tables in a database: heap file, name and primary key.
///
/// Lookups take `&self`; registration goes through an internal lock so the
/// catalog can be shared with the buffer pool behind an `Arc`.
#[derive(Debug, Default)]
pub struct Catalog {
    inner: RwLock<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    tables: Map<TableId, TableMeta>,
    table_name_index: Map<String, TableId>,
}

/// Metadata describing a registered table.
#[derive(Clone, Debug)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub file: Arc<HeapFile>,
    pub primary_key: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    tables: Vec<TableDef>,
}

#[derive(Serialize, Deserialize)]
struct TableDef {
    name: String,
    path: PathBuf,
    schema: Schema,
    primary_key: Option<String>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a heap file under `name`, returning the file's id as the table id.
    pub fn add_table(
        &self,
        file: HeapFile,
        name: &str,
        primary_key: Option<&str>,
    ) -> DbResult<TableId> {
        Self::check_columns(file.schema(), name)?;
        if let Some(pk) = primary_key {
            file.schema().index_of(pk)?;
        }

        let mut registry = self.write();
        if registry.table_name_index.contains_key(name) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        let id = file.id();
        if let Some(existing) = registry.tables.get(&id) {
            return Err(DbError::Catalog(format!(
                "{} is already registered as '{}'",
                file.path().display(),
                existing.name
            )));
        }

        registry.table_name_index.insert(name.to_string(), id);
        registry.tables.insert(
            id,
            TableMeta {
                id,
                name: name.to_string(),
                file: Arc::new(file),
                primary_key: primary_key.map(str::to_string),
            },
        );
        Ok(id)
    }

    fn check_columns(schema: &Schema, table: &str) -> DbResult<()> {
        let mut seen = HashSet::new();
        for field in schema.fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(DbError::Catalog(format!(
                    "duplicate column '{}' in table '{table}'",
                    field.name
                )));
            }
        }
        Ok(())
    }

    /// Metadata for a table by identifier.
    pub fn table_by_id(&self, id: TableId) -> DbResult<TableMeta> {
        self.read()
            .tables
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))
    }

    /// Heap file backing a table.
    pub fn database_file(&self, id: TableId) -> DbResult<Arc<HeapFile>> {
        Ok(self.table_by_id(id)?.file)
    }

    pub fn table_name(&self, id: TableId) -> DbResult<String> {
        Ok(self.table_by_id(id)?.name)
    }

    pub fn schema(&self, id: TableId) -> DbResult<Schema> {
        Ok(self.table_by_id(id)?.file.schema().clone())
    }

    pub fn primary_key(&self, id: TableId) -> DbResult<Option<String>> {
        Ok(self.table_by_id(id)?.primary_key)
    }

    /// Identifier of a table by name.
    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        self.read()
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    /// All registered table ids, in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.read().tables.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Unregister a table. Its heap file is left on disk.
    pub fn drop_table(&self, name: &str) -> DbResult<()> {
        let mut registry = self.write();
        let id = registry
            .table_name_index
            .remove(name)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))?;
        registry.tables.remove(&id);
        Ok(())
    }

    /// Remove every table.
    pub fn clear(&self) {
        let mut registry = self.write();
        registry.tables.clear();
        registry.table_name_index.clear();
    }

    /// Persist table definitions as pretty JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let registry = self.read();
        let mut tables: Vec<&TableMeta> = registry.tables.values().collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        let file = CatalogFile {
            tables: tables
                .into_iter()
                .map(|t| TableDef {
                    name: t.name.clone(),
                    path: t.file.path().to_path_buf(),
                    schema: t.file.schema().clone(),
                    primary_key: t.primary_key.clone(),
                })
                .collect(),
        };
        let data = serde_json::to_string_pretty(&file)
            .map_err(|err| DbError::Catalog(format!("serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Load table definitions, reopening each heap file with `page_size`.
    /// A missing catalog file yields an empty catalog.
    pub fn load(path: &Path, page_size: usize) -> DbResult<Self> {
        let catalog = Self::new();
        if !path.exists() {
            return Ok(catalog);
        }
        let data = fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&data)
            .map_err(|err| DbError::Catalog(format!("invalid catalog file: {err}")))?;
        for def in file.tables {
            let heap = HeapFile::open(&def.path, def.schema, page_size)?;
            catalog.add_table(heap, &def.name, def.primary_key.as_deref())?;
        }
        Ok(catalog)
    }
}
