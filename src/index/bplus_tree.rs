use std::cmp::Ordering;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::catalog::CatalogCache;
use crate::common::{
    AttrType, AttrValue, BlockNum, BlockType, CmpOp, IndexId, RecId, Result, SlateError,
    ATTRCAT_RELID, DISK_BLOCKS, INVALID_BLOCK, MAX_KEYS_INTERNAL, MAX_KEYS_LEAF, RELCAT_RELID,
};
use crate::page::{
    set_parent_block, BlockHeader, InternalBlock, InternalEntry, LeafBlock, LeafEntry, RecBlock,
    SLOT_UNOCCUPIED,
};

/// B+ tree secondary index engine.
///
/// Each indexed attribute owns one tree, rooted at the block recorded in
/// its attribute catalog entry (-1 when the attribute has no index). Leaves
/// hold `{attr_val, record id}` entries sorted ascending and chain
/// left-to-right through their sibling links; internal blocks hold routing
/// keys where consecutive entries share a child. Only insertion and
/// whole-subtree destruction are supported; there is no entry deletion or
/// node merging.
pub struct BPlusTree {
    pool: Arc<BufferPool>,
    catalog: Arc<CatalogCache>,
}

impl BPlusTree {
    pub fn new(pool: Arc<BufferPool>, catalog: Arc<CatalogCache>) -> Self {
        Self { pool, catalog }
    }

    /// Returns the next record whose indexed attribute satisfies `op`
    /// against `value`, resuming from the attribute's persisted cursor.
    /// Returns None once no further record qualifies; the cursor is left
    /// for the caller to reset.
    pub fn search(
        &self,
        rel_id: i32,
        attr_name: &str,
        value: &AttrValue,
        op: CmpOp,
    ) -> Result<Option<RecId>> {
        let cursor = self.catalog.index_cursor(rel_id, attr_name)?;
        let attr = self.catalog.attr_meta(rel_id, attr_name)?;
        let ty = attr.attr_type;

        let mut block;
        let mut index;

        if cursor.is_unset() {
            // First call: descend from the root.
            block = attr.root_block;
            index = 0;
            if block == INVALID_BLOCK {
                return Ok(None);
            }
        } else {
            // Resume just past the previous hit, hopping to the right
            // sibling when the leaf is exhausted.
            block = cursor.block;
            index = cursor.index + 1;

            let leaf = LeafBlock::new(&self.pool, block);
            let head = leaf.header()?;
            if index >= head.num_entries {
                block = head.rblock;
                index = 0;
                if block == INVALID_BLOCK {
                    return Ok(None);
                }
            }
        }

        // Descend while the current block is internal. NE/LT/LE need the
        // leftmost leaf (keys ascend left to right, and NE must visit every
        // leaf); EQ/GE/GT follow the left child of the first entry whose
        // key qualifies, or the rightmost child when none does.
        while self.pool.block_type(block)? == BlockType::IndexInternal {
            let node = InternalBlock::new(&self.pool, block);
            let head = node.header()?;

            block = match op {
                CmpOp::Ne | CmpOp::Lt | CmpOp::Le => node.entry(0, ty)?.lchild,
                CmpOp::Eq | CmpOp::Ge | CmpOp::Gt => {
                    let mut chosen = None;
                    for i in 0..head.num_entries {
                        let entry = node.entry(i, ty)?;
                        let ord = entry.attr_val.compare(value);
                        let qualifies = match op {
                            CmpOp::Gt => ord == Ordering::Greater,
                            _ => ord != Ordering::Less,
                        };
                        if qualifies {
                            chosen = Some(entry.lchild);
                            break;
                        }
                    }
                    match chosen {
                        Some(child) => child,
                        None => node.entry(head.num_entries - 1, ty)?.rchild,
                    }
                }
            };
        }

        // Scan leaf entries rightward from the resume point.
        while block != INVALID_BLOCK {
            let leaf = LeafBlock::new(&self.pool, block);
            let head = leaf.header()?;

            while index < head.num_entries {
                let entry = leaf.entry(index, ty)?;
                let ord = entry.attr_val.compare(value);

                if op.matches(ord) {
                    self.catalog
                        .set_index_cursor(rel_id, attr_name, IndexId::new(block, index))?;
                    return Ok(Some(entry.rec_id()));
                }
                if matches!(op, CmpOp::Eq | CmpOp::Le | CmpOp::Lt) && ord == Ordering::Greater {
                    // Keys ascend: nothing further right can qualify.
                    return Ok(None);
                }
                index += 1;
            }

            // Only NE must keep walking the leaf chain; every other
            // operator finds all remaining matches in the leaf it landed
            // on, given the resume rule above.
            if op != CmpOp::Ne {
                break;
            }
            block = head.rblock;
            index = 0;
        }

        Ok(None)
    }

    /// Inserts `{value, rec_id}` into the attribute's tree. Fails with
    /// NoIndex when the attribute has no root. On DiskFull anywhere in the
    /// split chain the whole tree is destroyed and the attribute's root
    /// reset to -1: the structure does not tolerate a partially linked
    /// tree, and the index is rebuildable from the records.
    pub fn insert(
        &self,
        rel_id: i32,
        attr_name: &str,
        value: AttrValue,
        rec_id: RecId,
    ) -> Result<()> {
        let attr = self.catalog.attr_meta(rel_id, attr_name)?;
        if attr.root_block == INVALID_BLOCK {
            return Err(SlateError::NoIndex);
        }

        let leaf = self.find_leaf(attr.root_block, &value, attr.attr_type)?;
        let entry = LeafEntry {
            attr_val: value,
            block: rec_id.block,
            slot: rec_id.slot,
        };

        match self.insert_into_leaf(rel_id, attr_name, leaf, entry, attr.attr_type) {
            Err(SlateError::DiskFull) => {
                let root = self.catalog.attr_meta(rel_id, attr_name)?.root_block;
                self.destroy(root)?;
                self.catalog.set_attr_root(rel_id, attr_name, INVALID_BLOCK)?;
                self.catalog.reset_index_cursor(rel_id, attr_name)?;
                Err(SlateError::DiskFull)
            }
            result => result,
        }
    }

    /// Builds an index over one attribute of a relation: allocates an empty
    /// leaf root, then inserts every existing record. A no-op when the
    /// attribute already has a root; forbidden on the catalog relations.
    pub fn create_index(&self, rel_id: i32, attr_name: &str) -> Result<()> {
        if rel_id == RELCAT_RELID || rel_id == ATTRCAT_RELID {
            return Err(SlateError::NotPermitted);
        }

        let attr = self.catalog.attr_meta(rel_id, attr_name)?;
        if attr.root_block != INVALID_BLOCK {
            return Ok(());
        }

        let root = LeafBlock::alloc(&self.pool)?;
        self.catalog
            .set_attr_root(rel_id, attr_name, root.block_num())?;

        let meta = self.catalog.rel_meta(rel_id)?;
        let types = self.catalog.attr_types(rel_id)?;

        let mut block = meta.first_block;
        while block != INVALID_BLOCK {
            let rec = RecBlock::new(&self.pool, block);
            let head = rec.header()?;
            let map = rec.slot_map()?;

            for slot in 0..head.num_slots {
                if map[slot as usize] == SLOT_UNOCCUPIED {
                    continue;
                }
                let record = rec.record(slot, &types)?;
                let value = record[attr.offset as usize].clone();
                // insert() already tears the tree down on DiskFull; the
                // error only needs to surface.
                self.insert(rel_id, attr_name, value, RecId::new(block, slot))?;
            }

            block = head.rblock;
        }

        Ok(())
    }

    /// Destroys the attribute's index and resets its root to -1.
    pub fn drop_index(&self, rel_id: i32, attr_name: &str) -> Result<()> {
        let attr = self.catalog.attr_meta(rel_id, attr_name)?;
        if attr.root_block == INVALID_BLOCK {
            return Err(SlateError::NoIndex);
        }
        self.destroy(attr.root_block)?;
        self.catalog.set_attr_root(rel_id, attr_name, INVALID_BLOCK)?;
        self.catalog.reset_index_cursor(rel_id, attr_name)
    }

    /// Recursively releases an entire subtree. A leaf is released
    /// directly; an internal block releases the left child of its first
    /// entry and the right child of every entry (each right child is the
    /// next entry's left child, so every child is visited exactly once),
    /// then itself.
    pub fn destroy(&self, block: BlockNum) -> Result<()> {
        if block < 0 || block >= DISK_BLOCKS as BlockNum {
            return Err(SlateError::OutOfBound(block));
        }

        match self.pool.block_type(block)? {
            BlockType::IndexLeaf => {
                self.pool.release(block);
                Ok(())
            }
            BlockType::IndexInternal => {
                let node = InternalBlock::new(&self.pool, block);
                let head = node.header()?;

                // Child pointers are all that matter here; the key bytes
                // are never interpreted.
                self.destroy(node.entry(0, AttrType::Number)?.lchild)?;
                for i in 0..head.num_entries {
                    self.destroy(node.entry(i, AttrType::Number)?.rchild)?;
                }

                self.pool.release(block);
                Ok(())
            }
            _ => Err(SlateError::InvalidBlock(block)),
        }
    }

    /// Descends from the root to the leaf where `value` belongs: at each
    /// internal block, the left child of the first entry whose key is >=
    /// value, or the rightmost child when none is.
    fn find_leaf(&self, root: BlockNum, value: &AttrValue, ty: AttrType) -> Result<BlockNum> {
        let mut block = root;
        while self.pool.block_type(block)? == BlockType::IndexInternal {
            let node = InternalBlock::new(&self.pool, block);
            let head = node.header()?;

            let mut next = None;
            for i in 0..head.num_entries {
                let entry = node.entry(i, ty)?;
                if entry.attr_val.compare(value) != Ordering::Less {
                    next = Some(entry.lchild);
                    break;
                }
            }
            block = match next {
                Some(child) => child,
                None => node.entry(head.num_entries - 1, ty)?.rchild,
            };
        }
        Ok(block)
    }

    /// Inserts an entry into a leaf, keeping ascending order (ties insert
    /// before the existing equal key), splitting on overflow.
    fn insert_into_leaf(
        &self,
        rel_id: i32,
        attr_name: &str,
        leaf_block: BlockNum,
        entry: LeafEntry,
        ty: AttrType,
    ) -> Result<()> {
        let leaf = LeafBlock::new(&self.pool, leaf_block);
        let head = leaf.header()?;
        let mut entries = leaf.entries(ty)?;

        let pos = entries
            .iter()
            .position(|e| e.attr_val.compare(&entry.attr_val) != Ordering::Less)
            .unwrap_or(entries.len());
        entries.insert(pos, entry);

        if entries.len() <= MAX_KEYS_LEAF {
            leaf.write_entries(&entries)?;
            let mut new_head = head;
            new_head.num_entries = entries.len() as i32;
            return leaf.set_header(&new_head);
        }

        self.split_leaf(rel_id, attr_name, leaf_block, head, entries, ty)
    }

    /// Splits an overflowing leaf: the lower half stays, the upper half
    /// moves to a new right sibling, and the last key of the lower half
    /// goes to the parent as the separator.
    fn split_leaf(
        &self,
        rel_id: i32,
        attr_name: &str,
        left_block: BlockNum,
        old_head: BlockHeader,
        mut entries: Vec<LeafEntry>,
        ty: AttrType,
    ) -> Result<()> {
        let right = LeafBlock::alloc(&self.pool)?;
        let right_block = right.block_num();

        let mid = (MAX_KEYS_LEAF + 1) / 2;
        let right_entries = entries.split_off(mid);
        let split_key = entries.last().expect("lower half is non-empty").attr_val.clone();

        let mut right_head = right.header()?;
        right_head.pblock = old_head.pblock;
        right_head.lblock = left_block;
        right_head.rblock = old_head.rblock;
        right_head.num_entries = right_entries.len() as i32;
        right.set_header(&right_head)?;
        right.write_entries(&right_entries)?;

        let left = LeafBlock::new(&self.pool, left_block);
        left.write_entries(&entries)?;
        let mut left_head = old_head;
        left_head.num_entries = entries.len() as i32;
        left_head.rblock = right_block;
        left.set_header(&left_head)?;

        if old_head.rblock != INVALID_BLOCK {
            self.pool.with_block_mut(old_head.rblock, |data| {
                let mut far = BlockHeader::read(data);
                far.lblock = right_block;
                far.write(data);
            })?;
        }

        if old_head.pblock != INVALID_BLOCK {
            self.insert_into_internal(
                rel_id,
                attr_name,
                old_head.pblock,
                InternalEntry {
                    lchild: left_block,
                    attr_val: split_key,
                    rchild: right_block,
                },
                ty,
            )
        } else {
            self.create_new_root(rel_id, attr_name, left_block, split_key, right_block)
        }
    }

    /// Pushes a split's separator key and new child into an internal
    /// block, splitting it the same way on overflow and propagating
    /// upward.
    fn insert_into_internal(
        &self,
        rel_id: i32,
        attr_name: &str,
        block: BlockNum,
        new_entry: InternalEntry,
        ty: AttrType,
    ) -> Result<()> {
        let node = InternalBlock::new(&self.pool, block);
        let head = node.header()?;
        let mut entries = node.entries(ty)?;

        let pos = entries
            .iter()
            .position(|e| e.attr_val.compare(&new_entry.attr_val) != Ordering::Less)
            .unwrap_or(entries.len());

        // The entry displaced to pos+1 routed through the child that just
        // split; its lower half stayed in place as new_entry.lchild, so
        // the displaced entry now descends through the new right node.
        let new_child = new_entry.rchild;
        entries.insert(pos, new_entry);
        if pos + 1 < entries.len() {
            entries[pos + 1].lchild = new_child;
        }

        if entries.len() <= MAX_KEYS_INTERNAL {
            node.write_entries(&entries)?;
            let mut new_head = head;
            new_head.num_entries = entries.len() as i32;
            return node.set_header(&new_head);
        }

        self.split_internal(rel_id, attr_name, block, head, entries, ty, new_child)
    }

    /// Splits an overflowing internal block. Unlike a leaf split the
    /// middle key is promoted, not retained: the lower half keeps the
    /// children below it, the upper half moves to a new right node (whose
    /// children are re-parented), and the middle key routes between them
    /// in the parent.
    fn split_internal(
        &self,
        rel_id: i32,
        attr_name: &str,
        left_block: BlockNum,
        old_head: BlockHeader,
        entries: Vec<InternalEntry>,
        ty: AttrType,
        unattached: BlockNum,
    ) -> Result<()> {
        let right = match InternalBlock::alloc(&self.pool) {
            Ok(right) => right,
            Err(SlateError::DiskFull) => {
                // The subtree that arrived from the level below has no
                // parent link yet; release it before unwinding so the
                // whole-tree teardown above cannot miss it.
                self.destroy(unattached)?;
                return Err(SlateError::DiskFull);
            }
            Err(e) => return Err(e),
        };
        let right_block = right.block_num();

        let mid = MAX_KEYS_INTERNAL / 2;
        let promoted = entries[mid].attr_val.clone();
        let right_entries: Vec<InternalEntry> = entries[mid + 1..].to_vec();
        let left_entries = &entries[..mid];

        let mut right_head = right.header()?;
        right_head.pblock = old_head.pblock;
        right_head.num_entries = right_entries.len() as i32;
        right.set_header(&right_head)?;
        right.write_entries(&right_entries)?;

        set_parent_block(&self.pool, right_entries[0].lchild, right_block)?;
        for entry in &right_entries {
            set_parent_block(&self.pool, entry.rchild, right_block)?;
        }

        let left = InternalBlock::new(&self.pool, left_block);
        left.write_entries(left_entries)?;
        let mut left_head = old_head;
        left_head.num_entries = left_entries.len() as i32;
        left.set_header(&left_head)?;

        if old_head.pblock != INVALID_BLOCK {
            self.insert_into_internal(
                rel_id,
                attr_name,
                old_head.pblock,
                InternalEntry {
                    lchild: left_block,
                    attr_val: promoted,
                    rchild: right_block,
                },
                ty,
            )
        } else {
            self.create_new_root(rel_id, attr_name, left_block, promoted, right_block)
        }
    }

    /// Allocates a fresh internal root holding one separator key and the
    /// two halves of the old root as its only children, and records it as
    /// the attribute's new root.
    fn create_new_root(
        &self,
        rel_id: i32,
        attr_name: &str,
        lchild: BlockNum,
        key: AttrValue,
        rchild: BlockNum,
    ) -> Result<()> {
        let root = match InternalBlock::alloc(&self.pool) {
            Ok(root) => root,
            Err(SlateError::DiskFull) => {
                self.destroy(rchild)?;
                return Err(SlateError::DiskFull);
            }
            Err(e) => return Err(e),
        };
        let root_block = root.block_num();

        root.set_entry(
            0,
            &InternalEntry {
                lchild,
                attr_val: key,
                rchild,
            },
        )?;
        let mut head = root.header()?;
        head.num_entries = 1;
        root.set_header(&head)?;

        set_parent_block(&self.pool, lchild, root_block)?;
        set_parent_block(&self.pool, rchild, root_block)?;

        self.catalog.set_attr_root(rel_id, attr_name, root_block)
    }
}
