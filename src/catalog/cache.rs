use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::BufferPool;
use crate::common::{
    AttrType, AttrValue, BlockNum, BlockType, IndexId, RecId, Result, SlateError, ATTRCAT_ATTR_NAME,
    ATTRCAT_ATTR_TYPE, ATTRCAT_BLOCK, ATTRCAT_NAME, ATTRCAT_OFFSET, ATTRCAT_RELID,
    ATTRCAT_ROOT_BLOCK, CATALOG_ATTR_COUNT, CATALOG_SLOTS_PER_BLOCK, INVALID_BLOCK, MAX_OPEN,
    RELCAT_BLOCK, RELCAT_NAME, RELCAT_RELID,
};
use crate::page::{BlockHeader, RecBlock, SLOT_OCCUPIED, SLOT_UNOCCUPIED};

/// Name of the first attribute of both catalog relations
pub const REL_NAME_ATTR: &str = "RelName";
/// Name of the attribute-name attribute of the attribute catalog
pub const ATTR_NAME_ATTR: &str = "AttrName";

/// Attribute type tags of a relation catalog record
pub const RELCAT_TYPES: [AttrType; CATALOG_ATTR_COUNT] = [
    AttrType::Text,
    AttrType::Number,
    AttrType::Number,
    AttrType::Number,
    AttrType::Number,
    AttrType::Number,
];

/// Attribute type tags of an attribute catalog record
pub const ATTRCAT_TYPES: [AttrType; CATALOG_ATTR_COUNT] = [
    AttrType::Text,
    AttrType::Text,
    AttrType::Number,
    AttrType::Number,
    AttrType::Number,
    AttrType::Number,
];

const RELCAT_ATTR_NAMES: [&str; CATALOG_ATTR_COUNT] = [
    REL_NAME_ATTR,
    "AttrCount",
    "RecordCount",
    "FirstBlock",
    "LastBlock",
    "SlotCount",
];

const ATTRCAT_ATTR_NAMES: [&str; CATALOG_ATTR_COUNT] = [
    REL_NAME_ATTR,
    ATTR_NAME_ATTR,
    "AttrType",
    "PrimaryFlag",
    "RootBlock",
    "Offset",
];

/// Cached relation catalog entry for one open relation.
#[derive(Debug, Clone)]
pub struct RelationMeta {
    pub name: String,
    pub attr_count: i32,
    pub record_count: i32,
    pub first_block: BlockNum,
    pub last_block: BlockNum,
    pub slots_per_block: i32,
}

impl RelationMeta {
    pub(crate) fn to_record(&self) -> Vec<AttrValue> {
        vec![
            AttrValue::Text(self.name.clone()),
            AttrValue::Number(self.attr_count as f64),
            AttrValue::Number(self.record_count as f64),
            AttrValue::Number(self.first_block as f64),
            AttrValue::Number(self.last_block as f64),
            AttrValue::Number(self.slots_per_block as f64),
        ]
    }

    pub(crate) fn from_record(record: &[AttrValue]) -> Self {
        Self {
            name: record[0].as_text().unwrap_or_default().to_string(),
            attr_count: num(record, 1),
            record_count: num(record, 2),
            first_block: num(record, 3),
            last_block: num(record, 4),
            slots_per_block: num(record, 5),
        }
    }
}

/// Cached attribute catalog entry.
#[derive(Debug, Clone)]
pub struct AttrMeta {
    pub name: String,
    pub attr_type: AttrType,
    pub offset: i32,
    pub root_block: BlockNum,
}

impl AttrMeta {
    pub(crate) fn from_record(record: &[AttrValue]) -> Self {
        Self {
            name: record[ATTRCAT_ATTR_NAME]
                .as_text()
                .unwrap_or_default()
                .to_string(),
            attr_type: AttrType::from_code(num(record, ATTRCAT_ATTR_TYPE)),
            offset: num(record, ATTRCAT_OFFSET),
            root_block: num(record, ATTRCAT_ROOT_BLOCK),
        }
    }
}

fn num(record: &[AttrValue], index: usize) -> i32 {
    record[index].as_number().unwrap_or(-1.0) as i32
}

/// Per-attribute cache slot: metadata, the attrcat record holding it, and
/// the attribute's persisted index-search cursor.
struct AttrSlot {
    meta: AttrMeta,
    rec_id: RecId,
    cursor: IndexId,
    dirty: bool,
}

/// One open relation: relation metadata, its relcat record location, the
/// relation-level scan cursor, and its attributes in offset order.
struct OpenRel {
    meta: RelationMeta,
    rec_id: RecId,
    scan_cursor: RecId,
    attrs: Vec<AttrSlot>,
    dirty: bool,
}

/// CatalogCache is the open-relation table: it caches schema metadata for
/// up to MAX_OPEN relations and owns the resumable search cursors (one scan
/// cursor per relation, one index cursor per attribute). Entries 0 and 1
/// are permanently the relation catalog and attribute catalog. Mutations go
/// to the cache first and are written back to the catalog records on flush
/// or close.
pub struct CatalogCache {
    pool: Arc<BufferPool>,
    slots: Mutex<Vec<Option<OpenRel>>>,
}

impl CatalogCache {
    /// Formats the catalog blocks of a fresh disk: the relation catalog
    /// with entries for itself and the attribute catalog, and the
    /// attribute catalog with the twelve catalog attribute records.
    pub fn bootstrap(pool: &BufferPool) -> Result<()> {
        let relcat = RecBlock::alloc(pool)?;
        let attrcat = RecBlock::alloc(pool)?;
        debug_assert_eq!(relcat.block_num(), RELCAT_BLOCK);
        debug_assert_eq!(attrcat.block_num(), ATTRCAT_BLOCK);

        let slots = CATALOG_SLOTS_PER_BLOCK as i32;

        let mut head = BlockHeader::new(BlockType::Record);
        head.num_attrs = CATALOG_ATTR_COUNT as i32;
        head.num_slots = slots;
        head.num_entries = 2;
        relcat.set_header(&head)?;

        let mut map = vec![SLOT_UNOCCUPIED; slots as usize];
        map[0] = SLOT_OCCUPIED;
        map[1] = SLOT_OCCUPIED;
        relcat.set_slot_map(&map)?;

        let relcat_meta = RelationMeta {
            name: RELCAT_NAME.to_string(),
            attr_count: CATALOG_ATTR_COUNT as i32,
            record_count: 2,
            first_block: RELCAT_BLOCK,
            last_block: RELCAT_BLOCK,
            slots_per_block: slots,
        };
        let attrcat_meta = RelationMeta {
            name: ATTRCAT_NAME.to_string(),
            attr_count: CATALOG_ATTR_COUNT as i32,
            record_count: 2 * CATALOG_ATTR_COUNT as i32,
            first_block: ATTRCAT_BLOCK,
            last_block: ATTRCAT_BLOCK,
            slots_per_block: slots,
        };
        relcat.set_record(0, &relcat_meta.to_record())?;
        relcat.set_record(1, &attrcat_meta.to_record())?;

        let mut head = BlockHeader::new(BlockType::Record);
        head.num_attrs = CATALOG_ATTR_COUNT as i32;
        head.num_slots = slots;
        head.num_entries = 2 * CATALOG_ATTR_COUNT as i32;
        attrcat.set_header(&head)?;

        let mut map = vec![SLOT_UNOCCUPIED; slots as usize];
        let mut slot = 0;
        for (rel_name, attr_names, types) in [
            (RELCAT_NAME, &RELCAT_ATTR_NAMES, &RELCAT_TYPES),
            (ATTRCAT_NAME, &ATTRCAT_ATTR_NAMES, &ATTRCAT_TYPES),
        ] {
            for (offset, (&attr_name, &ty)) in attr_names.iter().zip(types.iter()).enumerate() {
                let record = vec![
                    AttrValue::Text(rel_name.to_string()),
                    AttrValue::Text(attr_name.to_string()),
                    AttrValue::Number(ty.code() as f64),
                    AttrValue::Number(0.0),
                    AttrValue::Number(INVALID_BLOCK as f64),
                    AttrValue::Number(offset as f64),
                ];
                attrcat.set_record(slot, &record)?;
                map[slot as usize] = SLOT_OCCUPIED;
                slot += 1;
            }
        }
        attrcat.set_slot_map(&map)?;

        Ok(())
    }

    /// Builds the cache over an already-formatted disk, loading the two
    /// catalog relations into their fixed table slots.
    pub fn attach(pool: Arc<BufferPool>) -> Result<Self> {
        let mut slots: Vec<Option<OpenRel>> = (0..MAX_OPEN).map(|_| None).collect();

        let relcat = RecBlock::new(&pool, RELCAT_BLOCK);
        for (slot, table_index) in [(0, RELCAT_RELID), (1, ATTRCAT_RELID)] {
            let record = relcat.record(slot, &RELCAT_TYPES)?;
            let meta = RelationMeta::from_record(&record);
            let attrs = load_attrs(&pool, &meta.name)?;
            slots[table_index as usize] = Some(OpenRel {
                meta,
                rec_id: RecId::new(RELCAT_BLOCK, slot),
                scan_cursor: RecId::UNSET,
                attrs,
                dirty: false,
            });
        }

        Ok(Self {
            pool,
            slots: Mutex::new(slots),
        })
    }

    /// Opens a relation by name, returning its relation id. Returns the
    /// existing id when the relation is already open.
    pub fn open_relation(&self, name: &str) -> Result<i32> {
        let mut slots = self.slots.lock();

        if let Some(rel_id) = find_open(&slots, name) {
            return Ok(rel_id);
        }

        let free = slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(SlateError::CacheFull)?;

        let (meta, rec_id) = find_rel_record(&self.pool, name)?
            .ok_or_else(|| SlateError::RelationNotFound(name.to_string()))?;
        let attrs = load_attrs(&self.pool, name)?;

        slots[free] = Some(OpenRel {
            meta,
            rec_id,
            scan_cursor: RecId::UNSET,
            attrs,
            dirty: false,
        });

        Ok(free as i32)
    }

    /// Closes an open relation, writing back any dirty catalog state. The
    /// two catalog relations cannot be closed.
    pub fn close_relation(&self, rel_id: i32) -> Result<()> {
        if rel_id == RELCAT_RELID || rel_id == ATTRCAT_RELID {
            return Err(SlateError::NotPermitted);
        }
        let mut slots = self.slots.lock();
        check_open(&slots, rel_id)?;
        let rel = slots[rel_id as usize].take().expect("checked above");
        write_back(&self.pool, &rel)
    }

    /// Returns the relation id of an open relation, if any.
    pub fn rel_id_of(&self, name: &str) -> Option<i32> {
        find_open(&self.slots.lock(), name)
    }

    pub fn rel_meta(&self, rel_id: i32) -> Result<RelationMeta> {
        let slots = self.slots.lock();
        Ok(check_open(&slots, rel_id)?.meta.clone())
    }

    pub fn set_rel_meta(&self, rel_id: i32, meta: RelationMeta) -> Result<()> {
        let mut slots = self.slots.lock();
        let rel = check_open_mut(&mut slots, rel_id)?;
        rel.meta = meta;
        rel.dirty = true;
        Ok(())
    }

    pub fn attr_meta(&self, rel_id: i32, attr_name: &str) -> Result<AttrMeta> {
        let slots = self.slots.lock();
        let rel = check_open(&slots, rel_id)?;
        find_attr(rel, attr_name).map(|a| a.meta.clone())
    }

    /// All attributes of the relation in offset order.
    pub fn attrs(&self, rel_id: i32) -> Result<Vec<AttrMeta>> {
        let slots = self.slots.lock();
        let rel = check_open(&slots, rel_id)?;
        Ok(rel.attrs.iter().map(|a| a.meta.clone()).collect())
    }

    /// The attribute type tags of the relation in offset order, as needed
    /// to decode its records.
    pub fn attr_types(&self, rel_id: i32) -> Result<Vec<AttrType>> {
        let slots = self.slots.lock();
        let rel = check_open(&slots, rel_id)?;
        Ok(rel.attrs.iter().map(|a| a.meta.attr_type).collect())
    }

    pub fn set_attr_root(&self, rel_id: i32, attr_name: &str, root: BlockNum) -> Result<()> {
        let mut slots = self.slots.lock();
        let rel = check_open_mut(&mut slots, rel_id)?;
        let attr = find_attr_mut(rel, attr_name)?;
        attr.meta.root_block = root;
        attr.dirty = true;
        Ok(())
    }

    pub fn scan_cursor(&self, rel_id: i32) -> Result<RecId> {
        let slots = self.slots.lock();
        Ok(check_open(&slots, rel_id)?.scan_cursor)
    }

    pub fn set_scan_cursor(&self, rel_id: i32, cursor: RecId) -> Result<()> {
        let mut slots = self.slots.lock();
        check_open_mut(&mut slots, rel_id)?.scan_cursor = cursor;
        Ok(())
    }

    pub fn reset_scan_cursor(&self, rel_id: i32) -> Result<()> {
        self.set_scan_cursor(rel_id, RecId::UNSET)
    }

    pub fn index_cursor(&self, rel_id: i32, attr_name: &str) -> Result<IndexId> {
        let slots = self.slots.lock();
        let rel = check_open(&slots, rel_id)?;
        find_attr(rel, attr_name).map(|a| a.cursor)
    }

    pub fn set_index_cursor(&self, rel_id: i32, attr_name: &str, cursor: IndexId) -> Result<()> {
        let mut slots = self.slots.lock();
        let rel = check_open_mut(&mut slots, rel_id)?;
        find_attr_mut(rel, attr_name)?.cursor = cursor;
        Ok(())
    }

    pub fn reset_index_cursor(&self, rel_id: i32, attr_name: &str) -> Result<()> {
        self.set_index_cursor(rel_id, attr_name, IndexId::UNSET)
    }

    /// Writes every dirty cached entry back to its catalog record.
    pub fn flush(&self) -> Result<()> {
        let mut slots = self.slots.lock();
        for rel in slots.iter_mut().flatten() {
            write_back(&self.pool, rel)?;
            rel.dirty = false;
            for attr in rel.attrs.iter_mut() {
                attr.dirty = false;
            }
        }
        Ok(())
    }
}

fn find_open(slots: &[Option<OpenRel>], name: &str) -> Option<i32> {
    slots
        .iter()
        .position(|s| s.as_ref().is_some_and(|r| r.meta.name == name))
        .map(|i| i as i32)
}

fn check_open<'a>(slots: &'a [Option<OpenRel>], rel_id: i32) -> Result<&'a OpenRel> {
    if rel_id < 0 || rel_id >= MAX_OPEN as i32 {
        return Err(SlateError::OutOfBound(rel_id));
    }
    slots[rel_id as usize]
        .as_ref()
        .ok_or(SlateError::RelationNotOpen(rel_id))
}

fn check_open_mut<'a>(slots: &'a mut [Option<OpenRel>], rel_id: i32) -> Result<&'a mut OpenRel> {
    if rel_id < 0 || rel_id >= MAX_OPEN as i32 {
        return Err(SlateError::OutOfBound(rel_id));
    }
    slots[rel_id as usize]
        .as_mut()
        .ok_or(SlateError::RelationNotOpen(rel_id))
}

fn find_attr<'a>(rel: &'a OpenRel, attr_name: &str) -> Result<&'a AttrSlot> {
    rel.attrs
        .iter()
        .find(|a| a.meta.name == attr_name)
        .ok_or_else(|| SlateError::AttributeNotFound(attr_name.to_string()))
}

fn find_attr_mut<'a>(rel: &'a mut OpenRel, attr_name: &str) -> Result<&'a mut AttrSlot> {
    rel.attrs
        .iter_mut()
        .find(|a| a.meta.name == attr_name)
        .ok_or_else(|| SlateError::AttributeNotFound(attr_name.to_string()))
}

/// Scans the relation catalog block for the record of the named relation.
fn find_rel_record(pool: &BufferPool, name: &str) -> Result<Option<(RelationMeta, RecId)>> {
    let relcat = RecBlock::new(pool, RELCAT_BLOCK);
    let head = relcat.header()?;
    let map = relcat.slot_map()?;
    for slot in 0..head.num_slots {
        if map[slot as usize] == SLOT_UNOCCUPIED {
            continue;
        }
        let record = relcat.record(slot, &RELCAT_TYPES)?;
        if record[0].as_text() == Some(name) {
            let meta = RelationMeta::from_record(&record);
            return Ok(Some((meta, RecId::new(RELCAT_BLOCK, slot))));
        }
    }
    Ok(None)
}

/// Walks the attribute catalog chain collecting the named relation's
/// attributes, sorted by offset.
fn load_attrs(pool: &BufferPool, rel_name: &str) -> Result<Vec<AttrSlot>> {
    let mut attrs = Vec::new();
    let mut block = ATTRCAT_BLOCK;
    while block != INVALID_BLOCK {
        let rec = RecBlock::new(pool, block);
        let head = rec.header()?;
        let map = rec.slot_map()?;
        for slot in 0..head.num_slots {
            if map[slot as usize] == SLOT_UNOCCUPIED {
                continue;
            }
            let record = rec.record(slot, &ATTRCAT_TYPES)?;
            if record[0].as_text() == Some(rel_name) {
                attrs.push(AttrSlot {
                    meta: AttrMeta::from_record(&record),
                    rec_id: RecId::new(block, slot),
                    cursor: IndexId::UNSET,
                    dirty: false,
                });
            }
        }
        block = head.rblock;
    }
    attrs.sort_by_key(|a| a.meta.offset);
    Ok(attrs)
}

/// Writes a cached entry's dirty state back to the catalog records.
fn write_back(pool: &BufferPool, rel: &OpenRel) -> Result<()> {
    if rel.dirty {
        let relcat = RecBlock::new(pool, rel.rec_id.block);
        relcat.set_record(rel.rec_id.slot, &rel.meta.to_record())?;
    }
    for attr in &rel.attrs {
        if attr.dirty {
            let attrcat = RecBlock::new(pool, attr.rec_id.block);
            attrcat.set_attr(
                attr.rec_id.slot,
                ATTRCAT_ROOT_BLOCK,
                &AttrValue::Number(attr.meta.root_block as f64),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileBlockStore;
    use tempfile::NamedTempFile;

    fn fresh_catalog() -> (Arc<BufferPool>, CatalogCache, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = FileBlockStore::open(temp.path()).unwrap();
        let pool = Arc::new(BufferPool::new(store).unwrap());
        CatalogCache::bootstrap(&pool).unwrap();
        let catalog = CatalogCache::attach(Arc::clone(&pool)).unwrap();
        (pool, catalog, temp)
    }

    #[test]
    fn test_bootstrap_claims_catalog_blocks() {
        let (pool, _catalog, _temp) = fresh_catalog();
        assert_eq!(pool.block_type(RELCAT_BLOCK).unwrap(), BlockType::Record);
        assert_eq!(pool.block_type(ATTRCAT_BLOCK).unwrap(), BlockType::Record);
    }

    #[test]
    fn test_catalogs_open_at_fixed_ids() {
        let (_pool, catalog, _temp) = fresh_catalog();

        let relcat = catalog.rel_meta(RELCAT_RELID).unwrap();
        assert_eq!(relcat.name, RELCAT_NAME);
        assert_eq!(relcat.record_count, 2);
        assert_eq!(relcat.first_block, RELCAT_BLOCK);

        let attrcat = catalog.rel_meta(ATTRCAT_RELID).unwrap();
        assert_eq!(attrcat.name, ATTRCAT_NAME);
        assert_eq!(attrcat.record_count, 12);
    }

    #[test]
    fn test_catalog_attrs_in_offset_order() {
        let (_pool, catalog, _temp) = fresh_catalog();

        let attrs = catalog.attrs(ATTRCAT_RELID).unwrap();
        assert_eq!(attrs.len(), CATALOG_ATTR_COUNT);
        assert_eq!(attrs[0].name, REL_NAME_ATTR);
        assert_eq!(attrs[1].name, ATTR_NAME_ATTR);
        for (i, attr) in attrs.iter().enumerate() {
            assert_eq!(attr.offset, i as i32);
            assert_eq!(attr.root_block, INVALID_BLOCK);
        }
    }

    #[test]
    fn test_open_missing_relation() {
        let (_pool, catalog, _temp) = fresh_catalog();
        assert!(matches!(
            catalog.open_relation("NOPE"),
            Err(SlateError::RelationNotFound(_))
        ));
    }

    #[test]
    fn test_cursors_start_unset() {
        let (_pool, catalog, _temp) = fresh_catalog();

        assert!(catalog.scan_cursor(RELCAT_RELID).unwrap().is_unset());
        assert!(catalog
            .index_cursor(ATTRCAT_RELID, REL_NAME_ATTR)
            .unwrap()
            .is_unset());

        catalog
            .set_scan_cursor(RELCAT_RELID, RecId::new(4, 1))
            .unwrap();
        assert_eq!(catalog.scan_cursor(RELCAT_RELID).unwrap(), RecId::new(4, 1));
        catalog.reset_scan_cursor(RELCAT_RELID).unwrap();
        assert!(catalog.scan_cursor(RELCAT_RELID).unwrap().is_unset());
    }

    #[test]
    fn test_rel_meta_write_back_survives_reattach() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_path_buf();

        {
            let store = FileBlockStore::open(&path).unwrap();
            let pool = Arc::new(BufferPool::new(store).unwrap());
            CatalogCache::bootstrap(&pool).unwrap();
            let catalog = CatalogCache::attach(Arc::clone(&pool)).unwrap();

            let mut meta = catalog.rel_meta(ATTRCAT_RELID).unwrap();
            meta.record_count = 18;
            catalog.set_rel_meta(ATTRCAT_RELID, meta).unwrap();
            catalog.flush().unwrap();
            pool.flush().unwrap();
        }

        let store = FileBlockStore::open(&path).unwrap();
        let pool = Arc::new(BufferPool::new(store).unwrap());
        let catalog = CatalogCache::attach(pool).unwrap();
        assert_eq!(catalog.rel_meta(ATTRCAT_RELID).unwrap().record_count, 18);
    }

    #[test]
    fn test_closing_catalogs_not_permitted() {
        let (_pool, catalog, _temp) = fresh_catalog();
        assert!(matches!(
            catalog.close_relation(RELCAT_RELID),
            Err(SlateError::NotPermitted)
        ));
        assert!(matches!(
            catalog.close_relation(ATTRCAT_RELID),
            Err(SlateError::NotPermitted)
        ));
    }

    #[test]
    fn test_unopened_rel_id_rejected() {
        let (_pool, catalog, _temp) = fresh_catalog();
        assert!(matches!(
            catalog.rel_meta(5),
            Err(SlateError::RelationNotOpen(5))
        ));
        assert!(matches!(
            catalog.rel_meta(MAX_OPEN as i32),
            Err(SlateError::OutOfBound(_))
        ));
    }
}
