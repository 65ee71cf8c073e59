use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::catalog::{CatalogCache, REL_NAME_ATTR};
use crate::common::{
    AttrValue, BlockNum, CmpOp, RecId, Result, SlateError, ATTRCAT_ATTR_NAME, ATTRCAT_NAME,
    ATTRCAT_RELID, ATTRCAT_REL_NAME, ATTRCAT_ROOT_BLOCK, INVALID_BLOCK, RELCAT_FIRST_BLOCK,
    RELCAT_NAME, RELCAT_RELID, RELCAT_REL_NAME,
};
use crate::index::BPlusTree;
use crate::page::{RecBlock, SLOT_OCCUPIED, SLOT_UNOCCUPIED};

/// Record-chain access: linear scans over a relation's linked record
/// blocks, free-slot insertion, and the catalog-maintenance operations
/// (rename, whole-relation delete) built on top of them.
pub struct BlockAccess {
    pool: Arc<BufferPool>,
    catalog: Arc<CatalogCache>,
}

impl BlockAccess {
    pub fn new(pool: Arc<BufferPool>, catalog: Arc<CatalogCache>) -> Self {
        Self { pool, catalog }
    }

    fn index(&self) -> BPlusTree {
        BPlusTree::new(Arc::clone(&self.pool), Arc::clone(&self.catalog))
    }

    /// Returns the id of the next record whose named attribute satisfies
    /// `op` against `value`, resuming from the relation's persisted scan
    /// cursor (or the chain head when unset). Walks the block chain
    /// rightward, skipping unoccupied slots. On a hit the cursor advances
    /// to the hit; on exhaustion the cursor is left for the caller to
    /// reset.
    pub fn linear_search(
        &self,
        rel_id: i32,
        attr_name: &str,
        value: &AttrValue,
        op: CmpOp,
    ) -> Result<Option<RecId>> {
        let cursor = self.catalog.scan_cursor(rel_id)?;

        let (mut block, mut slot) = if cursor.is_unset() {
            (self.catalog.rel_meta(rel_id)?.first_block, 0)
        } else {
            (cursor.block, cursor.slot + 1)
        };

        let attr = self.catalog.attr_meta(rel_id, attr_name)?;
        let types = self.catalog.attr_types(rel_id)?;

        while block != INVALID_BLOCK {
            let rec = RecBlock::new(&self.pool, block);
            let head = rec.header()?;

            if slot >= head.num_slots {
                block = head.rblock;
                slot = 0;
                continue;
            }

            let map = rec.slot_map()?;
            if map[slot as usize] == SLOT_UNOCCUPIED {
                slot += 1;
                continue;
            }

            let record = rec.record(slot, &types)?;
            let ord = record[attr.offset as usize].compare(value);

            if op.matches(ord) {
                let rec_id = RecId::new(block, slot);
                self.catalog.set_scan_cursor(rel_id, rec_id)?;
                return Ok(Some(rec_id));
            }

            slot += 1;
        }

        Ok(None)
    }

    /// Returns the next matching record's values. Goes through the B+
    /// tree when the attribute carries an index, otherwise falls back to
    /// the linear scan. Fails with NotFound once no record qualifies.
    pub fn search(
        &self,
        rel_id: i32,
        attr_name: &str,
        value: &AttrValue,
        op: CmpOp,
    ) -> Result<Vec<AttrValue>> {
        let attr = self.catalog.attr_meta(rel_id, attr_name)?;

        let hit = if attr.root_block != INVALID_BLOCK {
            self.index().search(rel_id, attr_name, value, op)?
        } else {
            self.linear_search(rel_id, attr_name, value, op)?
        };

        match hit {
            Some(rec_id) => self.record_at(rel_id, rec_id),
            None => Err(SlateError::NotFound),
        }
    }

    /// Reads the record at `rec_id`, decoded with the relation's schema.
    pub fn record_at(&self, rel_id: i32, rec_id: RecId) -> Result<Vec<AttrValue>> {
        let types = self.catalog.attr_types(rel_id)?;
        RecBlock::new(&self.pool, rec_id.block).record(rec_id.slot, &types)
    }

    /// Inserts a record into the first free slot of the relation's block
    /// chain, extending the chain with a new tail block when every slot is
    /// taken. The relation catalog itself never grows past its fixed
    /// block and fails with MaxRelations instead. Newly inserted records
    /// are also added to every index the relation's attributes carry.
    pub fn insert(&self, rel_id: i32, values: &[AttrValue]) -> Result<RecId> {
        let mut meta = self.catalog.rel_meta(rel_id)?;
        assert_eq!(values.len(), meta.attr_count as usize);

        let mut rec_id = RecId::UNSET;
        let mut block = meta.first_block;
        let mut prev_block = INVALID_BLOCK;

        // Walk the chain until a block with a free slot turns up.
        while block != INVALID_BLOCK {
            let rec = RecBlock::new(&self.pool, block);
            let head = rec.header()?;
            let map = rec.slot_map()?;

            if let Some(slot) = map.iter().position(|&s| s == SLOT_UNOCCUPIED) {
                rec_id = RecId::new(block, slot as i32);
                break;
            }

            prev_block = block;
            block = head.rblock;
        }

        if rec_id.is_unset() {
            if rel_id == RELCAT_RELID {
                return Err(SlateError::MaxRelations);
            }

            let rec = RecBlock::alloc(&self.pool)?;
            let new_block = rec.block_num();

            let mut head = rec.header()?;
            head.lblock = prev_block;
            head.num_attrs = meta.attr_count;
            head.num_slots = meta.slots_per_block;
            rec.set_header(&head)?;
            rec.set_slot_map(&vec![SLOT_UNOCCUPIED; meta.slots_per_block as usize])?;

            if prev_block != INVALID_BLOCK {
                let prev = RecBlock::new(&self.pool, prev_block);
                let mut prev_head = prev.header()?;
                prev_head.rblock = new_block;
                prev.set_header(&prev_head)?;
            } else {
                meta.first_block = new_block;
            }
            meta.last_block = new_block;

            rec_id = RecId::new(new_block, 0);
        }

        let rec = RecBlock::new(&self.pool, rec_id.block);
        rec.set_record(rec_id.slot, values)?;

        let mut map = rec.slot_map()?;
        map[rec_id.slot as usize] = SLOT_OCCUPIED;
        rec.set_slot_map(&map)?;

        let mut head = rec.header()?;
        head.num_entries += 1;
        rec.set_header(&head)?;

        meta.record_count += 1;
        self.catalog.set_rel_meta(rel_id, meta)?;

        // Keep secondary indexes derived-consistent. A DiskFull here has
        // already torn the affected tree down and reset its root; the
        // record itself stays.
        let btree = self.index();
        for attr in self.catalog.attrs(rel_id)? {
            if attr.root_block == INVALID_BLOCK {
                continue;
            }
            match btree.insert(
                rel_id,
                &attr.name,
                values[attr.offset as usize].clone(),
                rec_id,
            ) {
                Err(SlateError::DiskFull) => {}
                result => result?,
            }
        }

        Ok(rec_id)
    }

    /// Renames a relation by rewriting its name in the relation catalog
    /// record and every attribute catalog record. The relation must exist,
    /// be closed, and the new name must be free.
    pub fn rename_relation(&self, old_name: &str, new_name: &str) -> Result<()> {
        if old_name == RELCAT_NAME || old_name == ATTRCAT_NAME {
            return Err(SlateError::NotPermitted);
        }
        if new_name == RELCAT_NAME || new_name == ATTRCAT_NAME {
            return Err(SlateError::RelationExists(new_name.to_string()));
        }
        if self.catalog.rel_id_of(old_name).is_some() {
            return Err(SlateError::RelationOpen(old_name.to_string()));
        }

        self.catalog.reset_scan_cursor(RELCAT_RELID)?;
        if self
            .linear_search(
                RELCAT_RELID,
                REL_NAME_ATTR,
                &AttrValue::Text(new_name.to_string()),
                CmpOp::Eq,
            )?
            .is_some()
        {
            return Err(SlateError::RelationExists(new_name.to_string()));
        }

        self.catalog.reset_scan_cursor(RELCAT_RELID)?;
        let rec_id = self
            .linear_search(
                RELCAT_RELID,
                REL_NAME_ATTR,
                &AttrValue::Text(old_name.to_string()),
                CmpOp::Eq,
            )?
            .ok_or_else(|| SlateError::RelationNotFound(old_name.to_string()))?;

        RecBlock::new(&self.pool, rec_id.block).set_attr(
            rec_id.slot,
            RELCAT_REL_NAME,
            &AttrValue::Text(new_name.to_string()),
        )?;

        // Rewrite the relation name in every attribute catalog entry.
        self.catalog.reset_scan_cursor(ATTRCAT_RELID)?;
        while let Some(attr_id) = self.linear_search(
            ATTRCAT_RELID,
            REL_NAME_ATTR,
            &AttrValue::Text(old_name.to_string()),
            CmpOp::Eq,
        )? {
            RecBlock::new(&self.pool, attr_id.block).set_attr(
                attr_id.slot,
                ATTRCAT_REL_NAME,
                &AttrValue::Text(new_name.to_string()),
            )?;
        }

        Ok(())
    }

    /// Renames one attribute of a relation in the attribute catalog.
    pub fn rename_attribute(
        &self,
        rel_name: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        if rel_name == RELCAT_NAME || rel_name == ATTRCAT_NAME {
            return Err(SlateError::NotPermitted);
        }
        if self.catalog.rel_id_of(rel_name).is_some() {
            return Err(SlateError::RelationOpen(rel_name.to_string()));
        }

        self.catalog.reset_scan_cursor(RELCAT_RELID)?;
        self.linear_search(
            RELCAT_RELID,
            REL_NAME_ATTR,
            &AttrValue::Text(rel_name.to_string()),
            CmpOp::Eq,
        )?
        .ok_or_else(|| SlateError::RelationNotFound(rel_name.to_string()))?;

        // One pass over the relation's attrcat entries: find the attribute
        // to rename and reject a clash with the new name.
        self.catalog.reset_scan_cursor(ATTRCAT_RELID)?;
        let mut target = None;
        while let Some(attr_id) = self.linear_search(
            ATTRCAT_RELID,
            REL_NAME_ATTR,
            &AttrValue::Text(rel_name.to_string()),
            CmpOp::Eq,
        )? {
            let record = self.record_at(ATTRCAT_RELID, attr_id)?;
            let attr_name = record[ATTRCAT_ATTR_NAME].as_text().unwrap_or_default();
            if attr_name == old_name {
                target = Some(attr_id);
            }
            if attr_name == new_name {
                return Err(SlateError::AttributeExists(new_name.to_string()));
            }
        }

        let attr_id =
            target.ok_or_else(|| SlateError::AttributeNotFound(old_name.to_string()))?;
        RecBlock::new(&self.pool, attr_id.block).set_attr(
            attr_id.slot,
            ATTRCAT_ATTR_NAME,
            &AttrValue::Text(new_name.to_string()),
        )
    }

    /// Deletes a whole relation: releases its record chain, removes its
    /// attribute catalog entries (unlinking any attrcat block that
    /// empties), destroys any indexes, and clears its relation catalog
    /// slot. Forbidden on the catalog relations; the relation must be
    /// closed.
    pub fn delete_relation(&self, rel_name: &str) -> Result<()> {
        if rel_name == RELCAT_NAME || rel_name == ATTRCAT_NAME {
            return Err(SlateError::NotPermitted);
        }
        if self.catalog.rel_id_of(rel_name).is_some() {
            return Err(SlateError::RelationOpen(rel_name.to_string()));
        }

        self.catalog.reset_scan_cursor(RELCAT_RELID)?;
        let rel_rec_id = self
            .linear_search(
                RELCAT_RELID,
                REL_NAME_ATTR,
                &AttrValue::Text(rel_name.to_string()),
                CmpOp::Eq,
            )?
            .ok_or_else(|| SlateError::RelationNotFound(rel_name.to_string()))?;

        let relcat_record = self.record_at(RELCAT_RELID, rel_rec_id)?;
        let first_block = relcat_record[RELCAT_FIRST_BLOCK]
            .as_number()
            .unwrap_or(-1.0) as BlockNum;

        // Release the record chain.
        let mut block = first_block;
        while block != INVALID_BLOCK {
            let head = RecBlock::new(&self.pool, block).header()?;
            let next = head.rblock;
            self.pool.release(block);
            block = next;
        }

        // Remove every attribute catalog entry of the relation.
        let btree = self.index();
        let mut attrs_deleted = 0;
        self.catalog.reset_scan_cursor(ATTRCAT_RELID)?;
        while let Some(attr_id) = self.linear_search(
            ATTRCAT_RELID,
            REL_NAME_ATTR,
            &AttrValue::Text(rel_name.to_string()),
            CmpOp::Eq,
        )? {
            attrs_deleted += 1;

            let record = self.record_at(ATTRCAT_RELID, attr_id)?;
            let root_block = record[ATTRCAT_ROOT_BLOCK].as_number().unwrap_or(-1.0) as BlockNum;

            let rec = RecBlock::new(&self.pool, attr_id.block);
            let mut map = rec.slot_map()?;
            map[attr_id.slot as usize] = SLOT_UNOCCUPIED;
            rec.set_slot_map(&map)?;

            let mut head = rec.header()?;
            head.num_entries -= 1;
            rec.set_header(&head)?;

            if head.num_entries == 0 {
                // Unlink the emptied block. Its left neighbor always
                // exists: the first attrcat block holds the catalogs' own
                // attributes and never empties.
                let left = RecBlock::new(&self.pool, head.lblock);
                let mut left_head = left.header()?;
                left_head.rblock = head.rblock;
                left.set_header(&left_head)?;

                if head.rblock != INVALID_BLOCK {
                    let right = RecBlock::new(&self.pool, head.rblock);
                    let mut right_head = right.header()?;
                    right_head.lblock = head.lblock;
                    right.set_header(&right_head)?;
                } else {
                    let mut attrcat_meta = self.catalog.rel_meta(ATTRCAT_RELID)?;
                    attrcat_meta.last_block = head.lblock;
                    self.catalog.set_rel_meta(ATTRCAT_RELID, attrcat_meta)?;
                }

                self.pool.release(attr_id.block);
                // The scan cursor still points into the released block;
                // restart the scan from the chain head.
                self.catalog.reset_scan_cursor(ATTRCAT_RELID)?;
            }

            if root_block != INVALID_BLOCK {
                btree.destroy(root_block)?;
            }
        }

        // Clear the relation's slot in the relation catalog.
        let relcat = RecBlock::new(&self.pool, rel_rec_id.block);
        let mut map = relcat.slot_map()?;
        map[rel_rec_id.slot as usize] = SLOT_UNOCCUPIED;
        relcat.set_slot_map(&map)?;
        let mut relcat_head = relcat.header()?;
        relcat_head.num_entries -= 1;
        relcat.set_header(&relcat_head)?;

        let mut relcat_meta = self.catalog.rel_meta(RELCAT_RELID)?;
        relcat_meta.record_count -= 1;
        self.catalog.set_rel_meta(RELCAT_RELID, relcat_meta)?;

        let mut attrcat_meta = self.catalog.rel_meta(ATTRCAT_RELID)?;
        attrcat_meta.record_count -= attrs_deleted;
        self.catalog.set_rel_meta(ATTRCAT_RELID, attrcat_meta)?;

        Ok(())
    }
}
