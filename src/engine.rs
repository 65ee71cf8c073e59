use std::path::Path;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::catalog::{CatalogCache, REL_NAME_ATTR};
use crate::common::{
    AttrType, AttrValue, CmpOp, RecId, Result, SlateError, ATTRCAT_NAME, ATTRCAT_RELID, ATTR_SIZE,
    BLOCK_SIZE, HEADER_SIZE, INVALID_BLOCK, RELCAT_NAME, RELCAT_RELID,
};
use crate::index::BPlusTree;
use crate::record::BlockAccess;
use crate::storage::FileBlockStore;

/// Engine wires the storage stack together: one block store, one buffer
/// pool, one catalog cache. Opening a path formats a fresh disk (catalog
/// bootstrap) or attaches to an existing one; closing flushes the catalog
/// cache, every dirty frame and the block-type map.
pub struct Engine {
    pool: Arc<BufferPool>,
    catalog: Arc<CatalogCache>,
}

impl Engine {
    /// Opens (or creates and formats) a disk file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = FileBlockStore::open(path)?;
        let pool = Arc::new(BufferPool::new(store)?);
        if pool.is_fresh() {
            CatalogCache::bootstrap(&pool)?;
        }
        let catalog = Arc::new(CatalogCache::attach(Arc::clone(&pool))?);
        Ok(Self { pool, catalog })
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    /// The record-chain access layer.
    pub fn record_access(&self) -> BlockAccess {
        BlockAccess::new(Arc::clone(&self.pool), Arc::clone(&self.catalog))
    }

    /// The B+ tree index engine.
    pub fn index(&self) -> BPlusTree {
        BPlusTree::new(Arc::clone(&self.pool), Arc::clone(&self.catalog))
    }

    /// Creates a relation with the given attributes (name and type, in
    /// offset order). The relation starts with an empty record chain.
    pub fn create_relation(&self, name: &str, attrs: &[(&str, AttrType)]) -> Result<()> {
        assert!(!attrs.is_empty());
        if name == RELCAT_NAME || name == ATTRCAT_NAME {
            return Err(SlateError::RelationExists(name.to_string()));
        }
        for (i, (attr_name, _)) in attrs.iter().enumerate() {
            if attrs[..i].iter().any(|(other, _)| other == attr_name) {
                return Err(SlateError::AttributeExists(attr_name.to_string()));
            }
        }

        let access = self.record_access();

        self.catalog.reset_scan_cursor(RELCAT_RELID)?;
        if access
            .linear_search(
                RELCAT_RELID,
                REL_NAME_ATTR,
                &AttrValue::Text(name.to_string()),
                CmpOp::Eq,
            )?
            .is_some()
        {
            return Err(SlateError::RelationExists(name.to_string()));
        }

        let slots_per_block = (BLOCK_SIZE - HEADER_SIZE) / (attrs.len() * ATTR_SIZE + 1);
        let relcat_record = vec![
            AttrValue::Text(name.to_string()),
            AttrValue::Number(attrs.len() as f64),
            AttrValue::Number(0.0),
            AttrValue::Number(INVALID_BLOCK as f64),
            AttrValue::Number(INVALID_BLOCK as f64),
            AttrValue::Number(slots_per_block as f64),
        ];
        access.insert(RELCAT_RELID, &relcat_record)?;

        for (offset, (attr_name, ty)) in attrs.iter().enumerate() {
            let attrcat_record = vec![
                AttrValue::Text(name.to_string()),
                AttrValue::Text(attr_name.to_string()),
                AttrValue::Number(ty.code() as f64),
                AttrValue::Number(0.0),
                AttrValue::Number(INVALID_BLOCK as f64),
                AttrValue::Number(offset as f64),
            ];
            match access.insert(ATTRCAT_RELID, &attrcat_record) {
                Err(SlateError::DiskFull) => {
                    // Roll the half-created relation back before surfacing.
                    let _ = access.delete_relation(name);
                    return Err(SlateError::DiskFull);
                }
                result => {
                    result?;
                }
            }
        }

        Ok(())
    }

    /// Deletes a relation, its record chain and any indexes.
    pub fn delete_relation(&self, name: &str) -> Result<()> {
        self.record_access().delete_relation(name)
    }

    pub fn rename_relation(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.record_access().rename_relation(old_name, new_name)
    }

    pub fn rename_attribute(
        &self,
        rel_name: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        self.record_access()
            .rename_attribute(rel_name, old_name, new_name)
    }

    /// Opens a relation for record and index operations.
    pub fn open_relation(&self, name: &str) -> Result<i32> {
        self.catalog.open_relation(name)
    }

    pub fn close_relation(&self, rel_id: i32) -> Result<()> {
        self.catalog.close_relation(rel_id)
    }

    pub fn create_index(&self, rel_id: i32, attr_name: &str) -> Result<()> {
        self.index().create_index(rel_id, attr_name)
    }

    pub fn drop_index(&self, rel_id: i32, attr_name: &str) -> Result<()> {
        self.index().drop_index(rel_id, attr_name)
    }

    /// Inserts a record into an open relation.
    pub fn insert(&self, rel_id: i32, values: &[AttrValue]) -> Result<RecId> {
        self.record_access().insert(rel_id, values)
    }

    /// Returns the next record matching the condition, using an index when
    /// one exists on the attribute.
    pub fn search(
        &self,
        rel_id: i32,
        attr_name: &str,
        value: &AttrValue,
        op: CmpOp,
    ) -> Result<Vec<AttrValue>> {
        self.record_access().search(rel_id, attr_name, value, op)
    }

    /// Flushes all cached state and consumes the engine.
    pub fn close(self) -> Result<()> {
        self.catalog.flush()?;
        self.pool.flush()
    }
}
