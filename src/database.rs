use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::buffer::{PageCache, PageStore, TransactionCache};
use crate::common::{BlockPointer, PointerPair, Result, StorageConfig, StrataError};
use crate::index::{IndexSpec, Predicate, RangeMatch};
use crate::storage::disk::{BlockStore, DiskManager, DiskScheduler};
use crate::table::Table;
use crate::types::{Row, Schema, Value};

/// Handle to an open database.
///
/// Owns the root page cache, the tables and the stack of open transactions.
/// Every row operation goes to the innermost transaction's cache, or to the
/// root cache when no transaction is open. Root cache changes reach storage
/// at [`Database::checkpoint`], at the outermost commit and on drop.
pub struct Database {
    config: StorageConfig,
    root: Arc<PageCache>,
    transactions: Vec<Arc<TransactionCache>>,
    tables: BTreeMap<String, Table>,
}

impl Database {
    pub fn open(store: Arc<dyn BlockStore>, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let root = Arc::new(PageCache::new(config.cache_capacity, config.lru_k, store));
        debug!(capacity = config.cache_capacity, lru_k = config.lru_k, "opened database");
        Ok(Self {
            config,
            root,
            transactions: Vec::new(),
            tables: BTreeMap::new(),
        })
    }

    /// Opens a database whose files live under `dir`, with all file access
    /// going through one disk worker.
    pub fn open_dir<P: AsRef<Path>>(dir: P, config: StorageConfig) -> Result<Self> {
        let disk = Arc::new(DiskManager::new(dir)?);
        let scheduler = Arc::new(DiskScheduler::new(disk));
        Self::open(scheduler, config)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn root_cache(&self) -> &Arc<PageCache> {
        &self.root
    }

    /// Number of open transactions.
    pub fn transaction_depth(&self) -> usize {
        self.transactions.len()
    }

    /// The page store row operations currently go to.
    pub fn current_store(&self) -> Arc<dyn PageStore> {
        match self.transactions.last() {
            Some(top) => Arc::clone(top) as Arc<dyn PageStore>,
            None => Arc::clone(&self.root) as Arc<dyn PageStore>,
        }
    }

    /// Opens a table, rebuilding its indexes from their logs.
    pub fn create_table(&mut self, name: &str, schema: Schema, specs: &[IndexSpec]) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(StrataError::TableAlreadyExists(name.to_string()));
        }
        let store = self.current_store();
        let mut table = Table::open(
            store.as_ref(),
            name,
            schema,
            specs,
            self.config.index_structure,
        )?;
        for _ in 0..self.transactions.len() {
            table.begin();
        }
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StrataError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StrataError::TableNotFound(name.to_string()))
    }

    pub fn insert_row(&mut self, table: &str, row: &Row) -> Result<BlockPointer> {
        let store = self.current_store();
        self.table_mut(table)?.insert_row(store.as_ref(), row)
    }

    pub fn delete_row(&mut self, table: &str, at: BlockPointer) -> Result<Row> {
        let store = self.current_store();
        self.table_mut(table)?.delete_row(store.as_ref(), at)
    }

    pub fn update_row(&mut self, table: &str, at: BlockPointer, row: &Row) -> Result<Row> {
        let store = self.current_store();
        self.table_mut(table)?.update_row(store.as_ref(), at, row)
    }

    pub fn get_row(&self, table: &str, at: BlockPointer) -> Result<Row> {
        self.table(table)?.get_row(self.current_store().as_ref(), at)
    }

    pub fn scan(&self, table: &str) -> Result<Vec<(BlockPointer, Row)>> {
        self.table(table)?.scan(self.current_store().as_ref())
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        self.table(table)?.len(self.current_store().as_ref())
    }

    pub fn find_block(
        &self,
        table: &str,
        column: &str,
        key: Option<&Value>,
    ) -> Result<Vec<(Option<Value>, PointerPair)>> {
        self.table(table)?.find_block(column, key)
    }

    pub fn find_range(&self, table: &str, predicate: &Predicate) -> Result<Vec<RangeMatch>> {
        self.table(table)?.find_range(self.current_store().as_ref(), predicate)
    }

    pub fn is_key_found(&self, table: &str, column: &str, key: Option<&Value>) -> Result<bool> {
        self.table(table)?.is_key_found(column, key)
    }

    pub fn get_max(&self, table: &str, column: &str) -> Result<Option<Value>> {
        self.table(table)?.get_max(column)
    }

    /// Opens a transaction nested in the current one, if any.
    pub fn begin_transaction(&mut self) {
        let overlay = Arc::new(TransactionCache::new(self.current_store()));
        self.transactions.push(overlay);
        for table in self.tables.values_mut() {
            table.begin();
        }
        debug!(depth = self.transactions.len(), "began transaction");
    }

    /// Commits the innermost transaction into its parent. Committing the
    /// outermost one also checkpoints the root cache.
    pub fn commit(&mut self) -> Result<()> {
        let top = self
            .transactions
            .last()
            .cloned()
            .ok_or(StrataError::NoActiveTransaction)?;
        // The transaction stays open until its pages are all merged
        top.commit()?;
        self.transactions.pop();
        for table in self.tables.values_mut() {
            table.commit();
        }
        debug!(depth = self.transactions.len(), "committed transaction");
        if self.transactions.is_empty() {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Discards the innermost transaction's pages and undoes its index
    /// changes.
    pub fn rollback(&mut self) -> Result<()> {
        let top = self.transactions.pop().ok_or(StrataError::NoActiveTransaction)?;
        top.rollback();
        let mut first_error = None;
        for (name, table) in self.tables.iter_mut() {
            if let Err(e) = table.rollback() {
                error!(table = %name, error = %e, "index rollback failed");
                first_error.get_or_insert(e);
            }
        }
        debug!(depth = self.transactions.len(), "rolled back transaction");
        first_error.map_or(Ok(()), Err)
    }

    /// Writes the root cache back and truncates files with enough vacated
    /// pages. Truncation waits while a transaction is open. Returns the
    /// number of pages written.
    pub fn checkpoint(&mut self) -> Result<usize> {
        let written = self.root.commit()?;
        if !self.transactions.is_empty() {
            return Ok(written);
        }
        let threshold = self.config.truncate_threshold();
        let mut truncated = 0;
        for table in self.tables.values_mut() {
            truncated += table.truncate_if_needed(&self.root, threshold)?;
        }
        debug!(written, truncated, "checkpoint");
        Ok(written)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.transactions.is_empty() {
            warn!(depth = self.transactions.len(), "rolling back open transactions on close");
        }
        while !self.transactions.is_empty() {
            if let Err(e) = self.rollback() {
                error!(error = %e, "rollback on close failed");
                return;
            }
        }
        if let Err(e) = self.checkpoint() {
            error!(error = %e, "checkpoint on close failed");
        }
    }
}
