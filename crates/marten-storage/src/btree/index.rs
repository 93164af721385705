//! Clustered B+ tree index over an integer attribute of a heap relation.
//!
//! The index maps each key to the record ID of its row in the base
//! relation. Nodes live on pages of the index file and are reached only
//! through the pager: every page read or allocated is pinned, mutated via a
//! private copy written back into the frame, and unpinned exactly once on
//! every return path with the dirty flag reflecting whether it changed. The
//! only pin that outlives a public call is the leaf held by an active scan.

use crate::btree::node::{
    InnerNode, LeafNode, MetaNode, DEFAULT_LEAF_CAPACITY, DEFAULT_NODE_CAPACITY, KEY_SENTINEL,
};
use crate::btree::scan::{RangeOp, ScanBounds};
use crate::btree::split::{split_inner, split_leaf};
use crate::heap::HeapFile;
use crate::pager::Pager;
use marten_common::page::{PageId, RecordId};
use marten_common::{AttrType, MartenError, Result};
use std::sync::Arc;
use tracing::{debug, trace};

/// Page number of the index metadata header within the index file.
const HEADER_PAGE_NO: u32 = 0;

/// A split propagating out of a recursion frame: the parent must absorb
/// the separator together with the new right sibling.
struct SplitUp {
    separator: i32,
    right_page_no: u32,
}

/// State of an active range scan. The leaf at `page_no` stays pinned for
/// as long as the scan holds it.
struct ActiveScan {
    bounds: ScanBounds,
    page_no: u32,
    leaf: LeafNode,
    next_entry: usize,
}

/// Clustered B+ tree index over a 32-bit integer attribute.
pub struct BTreeIndex {
    /// Pager for all page I/O.
    pager: Arc<Pager>,
    /// Index file name: "<relation_name>.<attr_byte_offset>".
    index_name: String,
    /// File ID of the index file.
    file_id: u32,
    /// Name of the indexed relation.
    relation_name: String,
    /// Byte offset of the indexed attribute within each record.
    attr_byte_offset: u32,
    /// Scalar type of the indexed attribute.
    attr_type: AttrType,
    /// Cached page number of the tree root.
    root_page_no: u32,
    /// Maximum entries per leaf.
    leaf_capacity: usize,
    /// Maximum keys per inner node.
    node_capacity: usize,
    /// The active scan, if any.
    scan: Option<ActiveScan>,
}

impl BTreeIndex {
    /// Opens the index for `relation` on the attribute at
    /// `attr_byte_offset`, creating and bulk-building it if the index file
    /// does not exist yet.
    ///
    /// The index file is named `"<relation_name>.<attr_byte_offset>"`. On
    /// the open path the stored header must agree with the arguments or
    /// the call fails with `BadIndexInfo`.
    pub fn open_or_create(
        pager: Arc<Pager>,
        relation: &HeapFile,
        attr_byte_offset: u32,
        attr_type: AttrType,
    ) -> Result<Self> {
        Self::open_or_create_with_capacities(
            pager,
            relation,
            attr_byte_offset,
            attr_type,
            DEFAULT_LEAF_CAPACITY,
            DEFAULT_NODE_CAPACITY,
        )
    }

    /// As `open_or_create`, with explicit node capacities.
    ///
    /// The defaults derive from the page size; smaller capacities force
    /// deep trees out of few keys, which the tests rely on. An index must
    /// be reopened with the capacities it was built with.
    pub fn open_or_create_with_capacities(
        pager: Arc<Pager>,
        relation: &HeapFile,
        attr_byte_offset: u32,
        attr_type: AttrType,
        leaf_capacity: usize,
        node_capacity: usize,
    ) -> Result<Self> {
        assert!(leaf_capacity >= 2, "leaf capacity must be at least 2");
        assert!(node_capacity >= 2, "node capacity must be at least 2");

        let relation_name = relation.name().to_string();
        let index_name = format!("{}.{}", relation_name, attr_byte_offset);

        if pager.disk().file_exists(&index_name) {
            Self::open(
                pager,
                index_name,
                relation_name,
                attr_byte_offset,
                attr_type,
                leaf_capacity,
                node_capacity,
            )
        } else {
            if attr_type != AttrType::Integer {
                return Err(MartenError::UnsupportedAttrType { attr_type });
            }
            Self::create(
                pager,
                index_name,
                relation,
                attr_byte_offset,
                attr_type,
                leaf_capacity,
                node_capacity,
            )
        }
    }

    fn open(
        pager: Arc<Pager>,
        index_name: String,
        relation_name: String,
        attr_byte_offset: u32,
        attr_type: AttrType,
        leaf_capacity: usize,
        node_capacity: usize,
    ) -> Result<Self> {
        let file_id = pager.disk().open_file(&index_name)?;

        let header_id = PageId::new(file_id, HEADER_PAGE_NO);
        let buf = pager.read_page(header_id)?;
        let meta = MetaNode::from_bytes(buf);

        let matches = meta.relation_name_matches(&relation_name)
            && meta.attr_byte_offset() == attr_byte_offset
            && meta.attr_type_tag() == attr_type.as_u32();
        let root_page_no = meta.root_page_no();
        pager.unpin_page(header_id, false);

        if !matches {
            return Err(MartenError::BadIndexInfo {
                index_file: index_name,
            });
        }

        debug!(index = %index_name, root = root_page_no, "opened existing index");

        Ok(Self {
            pager,
            index_name,
            file_id,
            relation_name,
            attr_byte_offset,
            attr_type,
            root_page_no,
            leaf_capacity,
            node_capacity,
            scan: None,
        })
    }

    fn create(
        pager: Arc<Pager>,
        index_name: String,
        relation: &HeapFile,
        attr_byte_offset: u32,
        attr_type: AttrType,
        leaf_capacity: usize,
        node_capacity: usize,
    ) -> Result<Self> {
        let file_id = pager.disk().create_file(&index_name)?;

        let mut held: Vec<PageId> = Vec::with_capacity(4);
        let built = Self::build_initial_tree(
            &pager,
            file_id,
            relation.name(),
            attr_byte_offset,
            attr_type,
            leaf_capacity,
            node_capacity,
            &mut held,
        );
        let root_page_no = match built {
            Ok(root) => root,
            Err(e) => {
                for pid in held.drain(..) {
                    pager.unpin_page(pid, false);
                }
                return Err(e);
            }
        };

        debug!(index = %index_name, "created index, starting bulk build");

        let mut index = Self {
            pager,
            index_name,
            file_id,
            relation_name: relation.name().to_string(),
            attr_byte_offset,
            attr_type,
            root_page_no,
            leaf_capacity,
            node_capacity,
            scan: None,
        };

        index.bulk_build(relation)?;
        index.pager.flush_file(file_id)?;
        Ok(index)
    }

    /// Allocates and wires the header page plus the initial tree: a root
    /// at level 1 over two empty linked leaves. Pages sit on `held` while
    /// pinned; on an early error the caller releases what remains.
    #[allow(clippy::too_many_arguments)]
    fn build_initial_tree(
        pager: &Pager,
        file_id: u32,
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
        leaf_capacity: usize,
        node_capacity: usize,
        held: &mut Vec<PageId>,
    ) -> Result<u32> {
        let (header_id, _) = pager.alloc_page(file_id)?;
        held.push(header_id);
        debug_assert_eq!(header_id.page_no, HEADER_PAGE_NO);
        let (root_id, _) = pager.alloc_page(file_id)?;
        held.push(root_id);
        let (leaf0_id, _) = pager.alloc_page(file_id)?;
        held.push(leaf0_id);
        let (leaf1_id, _) = pager.alloc_page(file_id)?;
        held.push(leaf1_id);

        let mut meta = MetaNode::new();
        meta.set_relation_name(relation_name);
        meta.set_attr_byte_offset(attr_byte_offset);
        meta.set_attr_type_tag(attr_type.as_u32());
        meta.set_root_page_no(root_id.page_no);

        let mut root = InnerNode::new(node_capacity, 1);
        root.set_child(0, leaf0_id.page_no);
        root.set_child(1, leaf1_id.page_no);

        let mut leaf0 = LeafNode::new(leaf_capacity);
        leaf0.set_right_sibling(Some(leaf1_id.page_no));
        let leaf1 = LeafNode::new(leaf_capacity);

        let mut write_result = Ok(());
        for (page_id, bytes) in [
            (header_id, meta.as_bytes()),
            (root_id, root.as_bytes()),
            (leaf0_id, leaf0.as_bytes()),
            (leaf1_id, leaf1.as_bytes()),
        ] {
            if write_result.is_ok() {
                write_result = pager.write_page(page_id, bytes);
            }
        }
        for pid in held.drain(..) {
            pager.unpin_page(pid, true);
        }
        write_result?;

        Ok(root_id.page_no)
    }

    /// Scans the base relation and inserts every record's key.
    fn bulk_build(&mut self, relation: &HeapFile) -> Result<()> {
        let offset = self.attr_byte_offset as usize;
        let mut scan = relation.scan()?;
        let mut count = 0u64;

        while let Some(rid) = scan.next_record()? {
            let record = scan.record();
            if record.len() < offset + 4 {
                return Err(MartenError::Corruption(format!(
                    "record {} too short for attribute at offset {}",
                    rid, offset
                )));
            }
            let key = i32::from_le_bytes([
                record[offset],
                record[offset + 1],
                record[offset + 2],
                record[offset + 3],
            ]);
            self.insert_entry(key, rid)?;
            count += 1;
        }

        debug!(index = %self.index_name, records = count, "bulk build complete");
        Ok(())
    }

    /// Returns the index file name.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the indexed relation's name.
    pub fn relation_name(&self) -> &str {
        &self.relation_name
    }

    /// Returns the byte offset of the indexed attribute.
    pub fn attr_byte_offset(&self) -> u32 {
        self.attr_byte_offset
    }

    /// Returns the indexed attribute's type.
    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    /// Returns the page number of the current tree root.
    pub fn root_page_no(&self) -> u32 {
        self.root_page_no
    }

    fn pid(&self, page_no: u32) -> PageId {
        PageId::new(self.file_id, page_no)
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Inserts one `(key, rid)` entry.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        if let Some(up) = self.recurse_insert(self.root_page_no, true, key, rid)? {
            self.grow_root(up)?;
        }
        Ok(())
    }

    /// One recursion frame: pins the inner node at `page_no`, dispatches on
    /// its level, writes it back iff modified, and unpins on every path.
    /// Returns the node's own split, if it had to split, for the parent to
    /// absorb.
    fn recurse_insert(
        &mut self,
        page_no: u32,
        is_root: bool,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<SplitUp>> {
        let page_id = self.pid(page_no);
        let buf = self.pager.read_page(page_id)?;
        let mut node = InnerNode::from_bytes(buf, self.node_capacity);

        match self.insert_below(&mut node, is_root, key, rid) {
            Ok((outcome, dirty)) => {
                let write = if dirty {
                    self.pager.write_page(page_id, node.as_bytes())
                } else {
                    Ok(())
                };
                self.pager.unpin_page(page_id, dirty);
                write?;
                Ok(outcome)
            }
            Err(e) => {
                self.pager.unpin_page(page_id, false);
                Err(e)
            }
        }
    }

    /// Body of a recursion frame, operating on the already-pinned node.
    /// Returns (own split to propagate, whether the node was modified).
    fn insert_below(
        &mut self,
        node: &mut InnerNode,
        is_root: bool,
        key: i32,
        rid: RecordId,
    ) -> Result<(Option<SplitUp>, bool)> {
        let mut dirty = false;

        // A fresh index has a root with no separators yet; the first key
        // inserted becomes its first separator.
        if is_root && node.used() == 0 {
            node.set_key(0, key);
            dirty = true;
        }

        let slot = node.find_child_slot(key);
        let child_no = node.child(slot);

        let child_split = if node.level() == 0 {
            self.recurse_insert(child_no, false, key, rid)?
        } else {
            self.insert_into_leaf(child_no, key, rid)?
        };

        match child_split {
            None => Ok((None, dirty)),
            Some(up) => Ok((self.absorb_split(node, up)?, true)),
        }
    }

    /// Inserts `(separator, right sibling)` coming up from a split child
    /// into `node`, splitting `node` itself when it is full.
    fn absorb_split(&mut self, node: &mut InnerNode, up: SplitUp) -> Result<Option<SplitUp>> {
        if !node.is_full() {
            node.insert_separator(up.separator, up.right_page_no);
            return Ok(None);
        }

        let (sibling_id, _) = self.pager.alloc_page(self.file_id)?;
        let mut sibling = InnerNode::new(self.node_capacity, node.level());
        let split = split_inner(node, &mut sibling, up.separator, up.right_page_no);

        let write = self.pager.write_page(sibling_id, sibling.as_bytes());
        self.pager.unpin_page(sibling_id, true);
        write?;

        trace!(
            sibling = sibling_id.page_no,
            separator = split.separator,
            "inner node split"
        );

        Ok(Some(SplitUp {
            separator: split.separator,
            right_page_no: sibling_id.page_no,
        }))
    }

    /// Inserts the entry into the leaf at `leaf_no`, splitting the leaf
    /// when it is full. Returns the leaf's split for the parent to absorb.
    fn insert_into_leaf(&mut self, leaf_no: u32, key: i32, rid: RecordId) -> Result<Option<SplitUp>> {
        let leaf_id = self.pid(leaf_no);
        let buf = self.pager.read_page(leaf_id)?;
        let mut leaf = LeafNode::from_bytes(buf, self.leaf_capacity);

        if !leaf.is_full() {
            let slot = leaf.find_insert_slot(key);
            leaf.insert_at(slot, key, rid);
            let write = self.pager.write_page(leaf_id, leaf.as_bytes());
            self.pager.unpin_page(leaf_id, true);
            write?;
            return Ok(None);
        }

        let (right_id, _) = match self.pager.alloc_page(self.file_id) {
            Ok(alloc) => alloc,
            Err(e) => {
                self.pager.unpin_page(leaf_id, false);
                return Err(e);
            }
        };

        let mut right = LeafNode::new(self.leaf_capacity);
        let split = split_leaf(&mut leaf, &mut right, key, right_id.page_no);

        // The incoming entry lands on the side its range falls in
        if key < split.separator {
            let slot = leaf.find_insert_slot(key);
            leaf.insert_at(slot, key, rid);
        } else {
            let slot = right.find_insert_slot(key);
            right.insert_at(slot, key, rid);
        }

        let write_left = self.pager.write_page(leaf_id, leaf.as_bytes());
        self.pager.unpin_page(leaf_id, true);
        let write_right = self.pager.write_page(right_id, right.as_bytes());
        self.pager.unpin_page(right_id, true);
        write_left?;
        write_right?;

        trace!(
            leaf = leaf_no,
            sibling = right_id.page_no,
            separator = split.separator,
            "leaf split"
        );

        Ok(Some(SplitUp {
            separator: split.separator,
            right_page_no: right_id.page_no,
        }))
    }

    /// Grows the tree by one level after the root itself split.
    fn grow_root(&mut self, up: SplitUp) -> Result<()> {
        let old_root = self.root_page_no;

        let (new_root_id, _) = self.pager.alloc_page(self.file_id)?;
        let mut new_root = InnerNode::new(self.node_capacity, 0);
        new_root.set_key(0, up.separator);
        new_root.set_child(0, old_root);
        new_root.set_child(1, up.right_page_no);
        let write = self.pager.write_page(new_root_id, new_root.as_bytes());
        self.pager.unpin_page(new_root_id, true);
        write?;

        let header_id = self.pid(HEADER_PAGE_NO);
        let buf = self.pager.read_page(header_id)?;
        let mut meta = MetaNode::from_bytes(buf);
        meta.set_root_page_no(new_root_id.page_no);
        let write = self.pager.write_page(header_id, meta.as_bytes());
        self.pager.unpin_page(header_id, true);
        write?;

        self.root_page_no = new_root_id.page_no;
        debug!(
            old_root,
            new_root = new_root_id.page_no,
            "tree grew by one level"
        );
        Ok(())
    }

    // =========================================================================
    // Scan
    // =========================================================================

    /// Opens a range scan over keys between `low` and `high`.
    ///
    /// `low_op` must be GT or GTE and `high_op` LT or LTE. An already
    /// active scan is implicitly ended first. Fails with `NoSuchKeyFound`
    /// when no key satisfies both bounds; on success the cursor holds the
    /// starting leaf pinned until `end_scan` (or the scan's exhaustion is
    /// observed and `end_scan` is called).
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: RangeOp,
        high: i32,
        high_op: RangeOp,
    ) -> Result<()> {
        let bounds = ScanBounds::new(low, low_op, high, high_op)?;

        if let Some(active) = self.scan.take() {
            self.pager.unpin_page(self.pid(active.page_no), false);
        }

        // Descend toward the leftmost leaf that could hold the low bound,
        // releasing each inner page as soon as its child is pinned.
        let mut page_no = self.root_page_no;
        let mut buf = self.pager.read_page(self.pid(page_no))?;
        loop {
            let node = InnerNode::from_bytes(buf, self.node_capacity);
            let child_no = node.child(node.find_child_slot(low));
            let child_is_leaf = node.level() == 1;

            let child_buf = match self.pager.read_page(self.pid(child_no)) {
                Ok(b) => b,
                Err(e) => {
                    self.pager.unpin_page(self.pid(page_no), false);
                    return Err(e);
                }
            };
            self.pager.unpin_page(self.pid(page_no), false);
            page_no = child_no;
            buf = child_buf;

            if child_is_leaf {
                break;
            }
        }

        // Position on the first matching entry, walking the sibling chain
        // as long as every key seen is still below the high bound.
        let mut leaf = LeafNode::from_bytes(buf, self.leaf_capacity);
        loop {
            for i in 0..leaf.used() {
                let key = leaf.key(i);
                if !bounds.satisfies_high(key) {
                    self.pager.unpin_page(self.pid(page_no), false);
                    return Err(MartenError::NoSuchKeyFound);
                }
                if bounds.satisfies_low(key) {
                    self.scan = Some(ActiveScan {
                        bounds,
                        page_no,
                        leaf,
                        next_entry: i,
                    });
                    return Ok(());
                }
            }

            match leaf.right_sibling() {
                Some(sibling) => {
                    let sibling_buf = match self.pager.read_page(self.pid(sibling)) {
                        Ok(b) => b,
                        Err(e) => {
                            self.pager.unpin_page(self.pid(page_no), false);
                            return Err(e);
                        }
                    };
                    self.pager.unpin_page(self.pid(page_no), false);
                    page_no = sibling;
                    leaf = LeafNode::from_bytes(sibling_buf, self.leaf_capacity);
                }
                None => {
                    self.pager.unpin_page(self.pid(page_no), false);
                    return Err(MartenError::NoSuchKeyFound);
                }
            }
        }
    }

    /// Returns the record ID of the next entry in the scan.
    ///
    /// Fails with `ScanNotInitialized` when no scan is active and with
    /// `IndexScanCompleted` once the cursor passes the high bound or the
    /// leaf chain ends; the scan stays active either way until `end_scan`.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let mut scan = self.scan.take().ok_or(MartenError::ScanNotInitialized)?;

        match self.advance_scan(&mut scan) {
            Ok(rid) => {
                self.scan = Some(scan);
                Ok(rid)
            }
            Err(MartenError::IndexScanCompleted) => {
                self.scan = Some(scan);
                Err(MartenError::IndexScanCompleted)
            }
            // Any other failure happened mid-advance, after the held pin
            // was released; the scan cannot continue.
            Err(e) => Err(e),
        }
    }

    fn advance_scan(&mut self, scan: &mut ActiveScan) -> Result<RecordId> {
        loop {
            let exhausted = scan.next_entry >= scan.leaf.capacity()
                || scan.leaf.key(scan.next_entry) == KEY_SENTINEL;

            if exhausted {
                let Some(sibling) = scan.leaf.right_sibling() else {
                    return Err(MartenError::IndexScanCompleted);
                };

                self.pager.unpin_page(self.pid(scan.page_no), false);
                let buf = self.pager.read_page(self.pid(sibling))?;
                scan.page_no = sibling;
                scan.leaf = LeafNode::from_bytes(buf, self.leaf_capacity);
                scan.next_entry = 0;
                continue;
            }

            let key = scan.leaf.key(scan.next_entry);
            if !scan.bounds.satisfies_high(key) {
                return Err(MartenError::IndexScanCompleted);
            }

            let rid = scan.leaf.rid(scan.next_entry);
            scan.next_entry += 1;
            return Ok(rid);
        }
    }

    /// Ends the active scan, releasing the held leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        match self.scan.take() {
            Some(scan) => {
                self.pager.unpin_page(self.pid(scan.page_no), false);
                Ok(())
            }
            None => Err(MartenError::ScanNotInitialized),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flushes the index file to disk.
    pub fn flush(&self) -> Result<()> {
        self.pager.flush_file(self.file_id)
    }

    /// Closes the index: ends any active scan and flushes the file.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(scan) = self.scan.take() {
            self.pager.unpin_page(self.pid(scan.page_no), false);
        }
        self.pager.flush_file(self.file_id)
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
