//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Own the database file, its header, and the in-memory table chain
//! - Dispatch get/put/delete through the hash tables and the block layer
//! - Redirect every mutation into the active transaction's staging state
//! - Open an implicit transaction around mutations when the caller has not
//!   begun one, auto-committing per the configured batch policy
//!
//! ## Concurrency Model: Single Writer, Single Process
//!
//! One owning handle manipulates the file at a time. There is no internal
//! locking: the transaction model already serializes mutations into one
//! active staging context, and `get` only reads. All calls are synchronous
//! and may block on storage I/O.
//!
//! ## Lookup order
//!
//! Tables are searched newest → oldest. Each table's bloom filter is tested
//! first; a negative skips the table entirely. On a positive the bucket's
//! block chain is walked, comparing the cached 32-bit hash before the full
//! key bytes.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::block::{self, BlockHeader, BLOCK_PREFIX_SIZE};
use crate::bloom;
use crate::config::{Config, TxnBatchPolicy};
use crate::error::{KvError, Result};
use crate::freelist::{self, FreeLists, SIZE_CLASSES};
use crate::header::{FileHeader, HEADER_SIZE};
use crate::table::{Table, MAX_CHAIN_LEN, TABLE_HEADER_SIZE};
use crate::transaction::{ItemState, Transaction};

/// Cached 32-bit key hash, stored in every block and used for bucket
/// selection and as the chain-walk pre-filter
fn key_hash(key: &[u8]) -> u32 {
    crc32fast::hash(key)
}

/// Metadata of one table as currently visible (staged shadow if a
/// transaction is active, committed otherwise)
#[derive(Debug, Clone, Copy)]
struct TableView {
    offset: u64,
    count: u64,
    max_count: u64,
    bloom_size: u64,
    is_new: bool,
}

/// A located key: the owning table/bucket, the bucket's full chain with
/// decoded prefixes, and the matching position
#[derive(Debug)]
struct Found {
    table_index: usize,
    cell_index: u64,
    chain: Vec<(u64, BlockHeader)>,
    pos: usize,
}

/// How a block allocation will be satisfied
#[derive(Debug, Clone, Copy)]
enum AllocPlan {
    /// Reuse the block just vacated by the same operation (same class)
    ReuseRemoved,

    /// Pop the newest block freed earlier in this transaction
    ReuseFreed(u64),

    /// Pop the head of the committed free list (`next` was read out of the
    /// popped block ahead of time)
    PopCommitted { offset: u64, next: u64 },

    /// Append a fresh block at the staged end of file
    Append { offset: u64, size: u64 },
}

impl AllocPlan {
    fn offset(&self, removed: Option<u64>) -> u64 {
        match *self {
            AllocPlan::ReuseRemoved => removed.unwrap_or(0),
            AllocPlan::ReuseFreed(offset) => offset,
            AllocPlan::PopCommitted { offset, .. } => offset,
            AllocPlan::Append { offset, .. } => offset,
        }
    }
}

/// The main storage engine
#[derive(Debug)]
pub struct Engine {
    /// Database file path
    path: PathBuf,

    /// The single backing file (header + tables + block heap)
    file: File,

    /// Engine configuration
    config: Config,

    /// Committed header (source of truth for file size and free lists)
    header: FileHeader,

    /// Committed table chain, oldest first
    tables: Vec<Table>,

    /// Active transaction, explicit or implicit (at most one)
    tx: Option<Transaction>,
}

impl Engine {
    // =========================================================================
    // Open / Close
    // =========================================================================

    /// Open or create a database with the given config
    ///
    /// Fails with `Format` if the file exists but carries a foreign magic or
    /// an unsupported version, and `Corrupt` if its header/table chain does
    /// not decode consistently.
    pub fn open(config: Config) -> Result<Self> {
        if config.first_table_max_count == 0 {
            return Err(KvError::Config(
                "first_table_max_count must be nonzero".to_string(),
            ));
        }
        if config.max_mean_collision == 0 {
            return Err(KvError::Config(
                "max_mean_collision must be nonzero".to_string(),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.path)?;
        let len = file.metadata()?.len();

        let (header, tables) = if len == 0 {
            Self::create(&file, &config)?
        } else {
            Self::load(&file, len)?
        };

        tracing::debug!(
            path = %config.path.display(),
            file_size = header.file_size,
            tables = tables.len(),
            "engine opened"
        );

        Ok(Self {
            path: config.path.clone(),
            file,
            config,
            header,
            tables,
            tx: None,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses the default config with the specified database file.
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().path(path).build();
        Self::open(config)
    }

    /// Initialize a fresh file: header plus a zeroed first table
    fn create(file: &File, config: &Config) -> Result<(FileHeader, Vec<Table>)> {
        let table = Table::new_at(HEADER_SIZE, config.first_table_max_count);
        let header = FileHeader::new(
            config.first_table_max_count,
            config.storage_type,
            table.end_offset(),
        );

        let mut region = vec![0u8; Table::size_on_disk(table.max_count) as usize];
        region[..TABLE_HEADER_SIZE as usize].copy_from_slice(&table.encode_header());
        file.write_all_at(&region, HEADER_SIZE)?;
        file.write_all_at(&header.encode(), 0)?;
        file.sync_all()?;

        tracing::debug!(max_count = table.max_count, "created new database file");
        Ok((header, vec![table]))
    }

    /// Validate an existing file and load its header and table chain
    fn load(file: &File, len: u64) -> Result<(FileHeader, Vec<Table>)> {
        if len < HEADER_SIZE {
            return Err(KvError::Format(format!(
                "file of {} bytes is smaller than the header",
                len
            )));
        }
        let mut buf = vec![0u8; HEADER_SIZE as usize];
        file.read_exact_at(&mut buf, 0)?;
        let header = FileHeader::decode(&buf)?;

        if header.file_size > len {
            return Err(KvError::Corrupt(format!(
                "recorded file size {} beyond the physical file ({} bytes)",
                header.file_size, len
            )));
        }

        let mut tables = Vec::new();
        let mut offset = HEADER_SIZE;
        loop {
            if tables.len() >= MAX_CHAIN_LEN {
                return Err(KvError::Corrupt(
                    "table chain exceeds the maximum length".to_string(),
                ));
            }
            if offset + TABLE_HEADER_SIZE > header.file_size {
                return Err(KvError::Corrupt(format!(
                    "table header at offset {} crosses the recorded file size",
                    offset
                )));
            }
            let mut hdr = [0u8; TABLE_HEADER_SIZE as usize];
            file.read_exact_at(&mut hdr, offset)?;
            let table = Table::decode_header(offset, &hdr)?;
            if table.end_offset() > header.file_size {
                return Err(KvError::Corrupt(format!(
                    "table at offset {} crosses the recorded file size",
                    offset
                )));
            }
            let next = table.next_table_offset;
            tables.push(table);
            if next == 0 {
                break;
            }
            offset = next;
        }

        if tables[0].max_count != header.first_table_max_count {
            return Err(KvError::Corrupt(
                "header and first table disagree on capacity".to_string(),
            ));
        }
        Ok((header, tables))
    }

    /// Commit any pending implicit batch and fsync.
    ///
    /// An open explicit transaction is left untouched.
    pub fn flush(&mut self) -> Result<()> {
        if matches!(&self.tx, Some(tx) if tx.implicit) {
            if let Some(tx) = self.tx.take() {
                self.apply_transaction(tx)?;
            }
        } else {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Commits any pending implicit batch and syncs to disk. An explicit
    /// transaction still open at this point is discarded, as rollback would.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Get a value by key
    ///
    /// Observes the active transaction's uncommitted writes first
    /// (read-your-writes), then committed on-disk state.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(tx) = &self.tx {
            if let Some(item) = tx.items.get(key) {
                return match *item {
                    ItemState::Deleted => Ok(None),
                    ItemState::Written { offset } => {
                        let image = tx.block_image(offset).ok_or_else(|| {
                            KvError::Corrupt(
                                "staged item points at a missing block image".to_string(),
                            )
                        })?;
                        Ok(Some(block::decode_block(image)?.value))
                    }
                };
            }
        }

        let hash = key_hash(key);
        match self.locate(key, hash)? {
            Some(found) => {
                let (offset, header) = found.chain[found.pos];
                Ok(Some(self.read_block_value(offset, &header)?))
            }
            None => Ok(None),
        }
    }

    /// Put a key-value pair
    ///
    /// Replaces any existing value for the key (the vacated block returns to
    /// its size class's free list). The new block is prepended to the
    /// current table's bucket chain.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_transaction();

        let hash = key_hash(key);
        let found = self.locate(key, hash)?;

        // ---- plan phase: committed + overlay reads only ----

        let removal = found.as_ref().map(|f| {
            let (offset, header) = f.chain[f.pos];
            (f.table_index, f.cell_index, offset, header.size_class)
        });

        let class = block::size_class_for(key.len() as u64, value.len() as u64)?;

        let current = self.table_count_view() - 1;
        let view = self.table_view(current);
        let cell = hash as u64 % view.max_count;

        // Chain of the current table's target bucket, minus the old block if
        // it happens to live in that same bucket.
        let same_bucket = matches!(removal, Some((ti, ci, _, _)) if ti == current && ci == cell);
        let chain: Vec<u64> = match (&found, same_bucket) {
            (Some(f), true) => f
                .chain
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != f.pos)
                .map(|(_, (offset, _))| *offset)
                .collect(),
            _ => self
                .load_chain(current, &view, cell)?
                .into_iter()
                .map(|(offset, _)| offset)
                .collect(),
        };

        // Chain of the old block's bucket, if it is a different one.
        let removal_chain: Option<Vec<u64>> = match (&found, same_bucket) {
            (Some(f), false) => Some(
                f.chain
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != f.pos)
                    .map(|(_, (offset, _))| *offset)
                    .collect(),
            ),
            _ => None,
        };

        let alloc = match removal {
            Some((_, _, _, removed_class)) if removed_class == class => AllocPlan::ReuseRemoved,
            _ => self.plan_alloc(class)?,
        };
        let new_offset = alloc.offset(removal.map(|(_, _, offset, _)| offset));

        let next = chain.first().copied().unwrap_or(0);
        let image = block::encode_block(next, hash, class, key, value).to_vec();
        let mut new_chain = Vec::with_capacity(chain.len() + 1);
        new_chain.push(new_offset);
        new_chain.extend(chain);

        // Resolve the bloom bytes this key touches in the current table.
        let mut bloom_bytes: Vec<(u64, u8)> = Vec::with_capacity(bloom::HASH_COUNT);
        for pos in bloom::probe_positions(key, view.bloom_size) {
            if let Some(entry) = bloom_bytes.iter_mut().find(|(byte, _)| *byte == pos.byte) {
                entry.1 |= pos.mask;
            } else {
                let base = self.bloom_byte(current, &view, pos.byte)?;
                bloom_bytes.push((pos.byte, base | pos.mask));
            }
        }

        // Growth check against the count the current table will end up with.
        let removed_here = matches!(removal, Some((ti, _, _, _)) if ti == current);
        let final_count = view.count + 1 - u64::from(removed_here);
        let grow = if final_count >= view.max_count.saturating_mul(self.config.max_mean_collision)
        {
            Some(view.max_count * 2)
        } else {
            None
        };

        // ---- apply phase: staging mutations only ----
        {
            let tx = self.active_tx_mut()?;

            if let Some((rtable, rcell, roffset, rclass)) = removal {
                if let Some(rchain) = removal_chain {
                    tx.set_bucket(rtable, rcell, rchain);
                }
                tx.drop_block(roffset);
                if !matches!(alloc, AllocPlan::ReuseRemoved) {
                    tx.free.free(rclass, roffset);
                }
                tx.tables[rtable].count = tx.tables[rtable].count.saturating_sub(1);
            }

            match alloc {
                AllocPlan::ReuseRemoved => {}
                AllocPlan::ReuseFreed(offset) => {
                    let popped = tx.free.take_freed(class);
                    debug_assert_eq!(popped, Some(offset));
                }
                AllocPlan::PopCommitted { next, .. } => {
                    tx.free.pop_committed(class, next);
                }
                AllocPlan::Append { size, .. } => {
                    tx.file_size += size;
                }
            }

            tx.stage_block(new_offset, image);
            tx.set_bucket(current, cell, new_chain);
            for (byte, val) in bloom_bytes {
                tx.tables[current].bloom_patches.insert(byte, val);
            }
            tx.tables[current].count += 1;
            tx.items
                .insert(key.to_vec(), ItemState::Written { offset: new_offset });

            if let Some(new_max) = grow {
                let index = tx.append_table(new_max)?;
                tracing::debug!(capacity = new_max, index, "hash table chain grown");
            }
        }

        self.note_op()
    }

    /// Delete a key
    ///
    /// Returns whether the key existed. The vacated block returns to its
    /// size class's free list; the bloom filter is not retroactively cleared
    /// (the chain walk is the ground truth, so the lingering positive is
    /// harmless).
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.ensure_transaction();

        let hash = key_hash(key);
        let found = match self.locate(key, hash)? {
            Some(found) => found,
            None => return Ok(false),
        };

        let (offset, header) = found.chain[found.pos];
        let new_chain: Vec<u64> = found
            .chain
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != found.pos)
            .map(|(_, (off, _))| *off)
            .collect();

        {
            let tx = self.active_tx_mut()?;
            tx.set_bucket(found.table_index, found.cell_index, new_chain);
            tx.drop_block(offset);
            tx.free.free(header.size_class, offset);
            tx.tables[found.table_index].count =
                tx.tables[found.table_index].count.saturating_sub(1);
            tx.items.insert(key.to_vec(), ItemState::Deleted);
        }

        self.note_op()?;
        Ok(true)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Begin an explicit transaction
    ///
    /// A pending implicit batch is committed first. Fails with
    /// `TransactionState` if an explicit transaction is already active.
    pub fn begin(&mut self) -> Result<()> {
        match &self.tx {
            Some(tx) if !tx.implicit => {
                return Err(KvError::TransactionState(
                    "a transaction is already active".to_string(),
                ));
            }
            Some(_) => {
                if let Some(tx) = self.tx.take() {
                    self.apply_transaction(tx)?;
                }
            }
            None => {}
        }

        self.tx = Some(Transaction::new(
            self.header.file_size,
            &self.header.free_lists,
            &self.tables,
            false,
        ));
        tracing::trace!("explicit transaction opened");
        Ok(())
    }

    /// Commit the explicit transaction, fusing all staged state into the
    /// file in one deterministic apply step
    pub fn commit(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) if !tx.implicit => self.apply_transaction(tx),
            Some(tx) => {
                self.tx = Some(tx);
                Err(KvError::TransactionState(
                    "no explicit transaction to commit".to_string(),
                ))
            }
            None => Err(KvError::TransactionState(
                "no transaction is active".to_string(),
            )),
        }
    }

    /// Roll back the explicit transaction, discarding all staged state with
    /// no file mutation
    pub fn rollback(&mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) if !tx.implicit => {
                drop(tx);
                tracing::debug!("transaction rolled back");
                Ok(())
            }
            Some(tx) => {
                self.tx = Some(tx);
                Err(KvError::TransactionState(
                    "no explicit transaction to roll back".to_string(),
                ))
            }
            None => Err(KvError::TransactionState(
                "no transaction is active".to_string(),
            )),
        }
    }

    /// Open an implicit transaction if none is active
    fn ensure_transaction(&mut self) {
        if self.tx.is_none() {
            self.tx = Some(Transaction::new(
                self.header.file_size,
                &self.header.free_lists,
                &self.tables,
                true,
            ));
            tracing::trace!("implicit transaction opened");
        }
    }

    /// Count a mutating op and auto-commit an implicit batch when due
    fn note_op(&mut self) -> Result<()> {
        let due = match &mut self.tx {
            Some(tx) if tx.implicit => {
                tx.ops += 1;
                match self.config.txn_batch_policy {
                    TxnBatchPolicy::EveryOp => true,
                    TxnBatchPolicy::EveryNOps { count } => tx.ops >= count,
                }
            }
            _ => false,
        };
        if due {
            if let Some(tx) = self.tx.take() {
                self.apply_transaction(tx)?;
            }
        }
        Ok(())
    }

    fn active_tx_mut(&mut self) -> Result<&mut Transaction> {
        self.tx.as_mut().ok_or_else(|| {
            KvError::TransactionState("no transaction is active".to_string())
        })
    }

    /// Apply a transaction's staged state to the file.
    ///
    /// Order matters for crash consistency: blocks and tables are written
    /// before the bucket slots and chain links that reference them, and the
    /// header (free-list heads + file size) is written last, then fsynced.
    fn apply_transaction(&mut self, tx: Transaction) -> Result<()> {
        // 1. Free lists: link the blocks freed in this transaction onto the
        //    staged heads, newest at the front.
        let mut free_lists = FreeLists::new();
        for class in 0..SIZE_CLASSES as u8 {
            let mut head = tx.free.staged_head(class);
            for &offset in tx.free.freed(class) {
                self.write_u64_at(head, offset)?;
                head = offset;
            }
            free_lists.set_head(class, head);
        }

        // 2. Regions for tables appended during the transaction, so the slot
        //    and bloom writes below land in existing space.
        for t in tx.tables.iter().filter(|t| t.is_new) {
            let descriptor = Table {
                offset: t.offset,
                next_table_offset: 0,
                count: t.count,
                bloom_size: t.bloom_size,
                max_count: t.max_count,
            };
            let mut region = vec![0u8; Table::size_on_disk(t.max_count) as usize];
            region[..TABLE_HEADER_SIZE as usize].copy_from_slice(&descriptor.encode_header());
            self.write_all_at(&region, t.offset)?;
        }

        // 3. Staged block images, then the chain links and bucket heads that
        //    wire them into the tables.
        let mut offsets: Vec<u64> = tx.blocks.keys().copied().collect();
        offsets.sort_unstable();
        for offset in offsets {
            self.write_all_at(&tx.blocks[&offset], offset)?;
        }

        for (&(table_index, cell), chain) in &tx.buckets {
            for (i, &offset) in chain.iter().enumerate() {
                let next = chain.get(i + 1).copied().unwrap_or(0);
                self.write_u64_at(next, offset)?;
            }
            let t = &tx.tables[table_index];
            let slot = t.offset + TABLE_HEADER_SIZE + t.bloom_size + cell * 8;
            self.write_u64_at(chain.first().copied().unwrap_or(0), slot)?;
        }

        // 4. Bloom patches, counts, and table chain links.
        for (i, t) in tx.tables.iter().enumerate() {
            for (&byte, &val) in &t.bloom_patches {
                self.write_all_at(&[val], t.offset + TABLE_HEADER_SIZE + byte)?;
            }
            self.write_u64_at(t.count, t.offset + 8)?;
            if t.is_new && i > 0 {
                self.write_u64_at(t.offset, tx.tables[i - 1].offset)?;
            }
        }

        // 5. Header last: everything it references is on disk now. Block
        //    images are written unpadded, so the physical file can end short
        //    of the staged logical size when the last appended record does
        //    not fill its power-of-two block; extend it before recording the
        //    size, or reopen would reject the file.
        self.file.set_len(tx.file_size)?;
        let mut header = self.header.clone();
        header.file_size = tx.file_size;
        header.free_lists = free_lists;
        self.write_all_at(&header.encode(), 0)?;
        self.file.sync_all()?;
        self.header = header;

        // Refresh the in-memory chain from the shadows.
        self.tables = tx
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| Table {
                offset: t.offset,
                next_table_offset: tx.tables.get(i + 1).map(|n| n.offset).unwrap_or(0),
                count: t.count,
                bloom_size: t.bloom_size,
                max_count: t.max_count,
            })
            .collect();

        tracing::debug!(
            ops = tx.ops,
            keys = tx.items.len(),
            file_size = self.header.file_size,
            "transaction committed"
        );
        Ok(())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find a key, scanning tables newest → oldest
    fn locate(&self, key: &[u8], hash: u32) -> Result<Option<Found>> {
        for table_index in (0..self.table_count_view()).rev() {
            let view = self.table_view(table_index);
            let cell = hash as u64 % view.max_count;

            // A staged chain is authoritative; otherwise the bloom filter
            // short-circuits certainly-absent keys.
            let staged = self
                .tx
                .as_ref()
                .and_then(|tx| tx.staged_bucket(table_index, cell));
            if staged.is_none() && !self.bloom_test(table_index, &view, key)? {
                continue;
            }

            let chain = match staged {
                Some(offsets) => self.headers_for(offsets)?,
                None => self.walk_committed_chain(table_index, &view, cell)?,
            };

            for pos in 0..chain.len() {
                let (offset, header) = chain[pos];
                if header.hash != hash {
                    continue;
                }
                if self.read_block_key(offset, &header)? == key {
                    return Ok(Some(Found {
                        table_index,
                        cell_index: cell,
                        chain,
                        pos,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Bucket chain with decoded prefixes, via the staging overlay or disk
    fn load_chain(
        &self,
        table_index: usize,
        view: &TableView,
        cell: u64,
    ) -> Result<Vec<(u64, BlockHeader)>> {
        match self
            .tx
            .as_ref()
            .and_then(|tx| tx.staged_bucket(table_index, cell))
        {
            Some(offsets) => self.headers_for(offsets),
            None => self.walk_committed_chain(table_index, view, cell),
        }
    }

    fn headers_for(&self, offsets: &[u64]) -> Result<Vec<(u64, BlockHeader)>> {
        offsets
            .iter()
            .map(|&offset| Ok((offset, self.read_block_header(offset)?)))
            .collect()
    }

    /// Walk a committed bucket chain via the intrusive next pointers
    fn walk_committed_chain(
        &self,
        table_index: usize,
        view: &TableView,
        cell: u64,
    ) -> Result<Vec<(u64, BlockHeader)>> {
        if view.is_new {
            return Ok(Vec::new());
        }
        let slot = view.offset + TABLE_HEADER_SIZE + view.bloom_size + cell * 8;
        let mut offset = self.read_u64_at(slot)?;

        // A consistent chain cannot hold more blocks than the table does.
        let max_len = self.tables[table_index].count as usize + 1;
        let mut chain = Vec::new();
        while offset != 0 {
            if chain.len() >= max_len {
                return Err(KvError::Corrupt(format!(
                    "bucket chain at table {} cell {} exceeds the table's record count",
                    table_index, cell
                )));
            }
            let header = self.read_block_header(offset)?;
            chain.push((offset, header));
            offset = header.next_offset;
        }
        Ok(chain)
    }

    /// Test a key against a table's bloom filter (patched bytes first)
    fn bloom_test(&self, table_index: usize, view: &TableView, key: &[u8]) -> Result<bool> {
        for pos in bloom::probe_positions(key, view.bloom_size) {
            let byte = self.bloom_byte(table_index, view, pos.byte)?;
            if byte & pos.mask == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// One bloom-filter byte as currently visible
    fn bloom_byte(&self, table_index: usize, view: &TableView, byte: u64) -> Result<u8> {
        if let Some(tx) = &self.tx {
            if let Some(patched) = tx.bloom_patch(table_index, byte) {
                return Ok(patched);
            }
        }
        if view.is_new {
            return Ok(0);
        }
        let mut buf = [0u8; 1];
        self.read_exact_at(&mut buf, view.offset + TABLE_HEADER_SIZE + byte)?;
        Ok(buf[0])
    }

    fn table_count_view(&self) -> usize {
        match &self.tx {
            Some(tx) => tx.tables.len(),
            None => self.tables.len(),
        }
    }

    fn table_view(&self, index: usize) -> TableView {
        match &self.tx {
            Some(tx) => {
                let t = &tx.tables[index];
                TableView {
                    offset: t.offset,
                    count: t.count,
                    max_count: t.max_count,
                    bloom_size: t.bloom_size,
                    is_new: t.is_new,
                }
            }
            None => {
                let t = &self.tables[index];
                TableView {
                    offset: t.offset,
                    count: t.count,
                    max_count: t.max_count,
                    bloom_size: t.bloom_size,
                    is_new: false,
                }
            }
        }
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Decide how to satisfy an allocation of the given class, without
    /// mutating the staging state yet
    fn plan_alloc(&self, class: u8) -> Result<AllocPlan> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            KvError::TransactionState("no transaction is active".to_string())
        })?;

        if let Some(&offset) = tx.free.freed(class).last() {
            return Ok(AllocPlan::ReuseFreed(offset));
        }

        let head = tx.free.staged_head(class);
        if head != 0 {
            // While free, the block's next field is the list link.
            let next = self.read_u64_at(head)?;
            return Ok(AllocPlan::PopCommitted { offset: head, next });
        }

        let size = freelist::class_size(class);
        let offset = tx.file_size;
        offset.checked_add(size).ok_or_else(|| {
            KvError::OutOfSpace("file size overflow appending a block".to_string())
        })?;
        Ok(AllocPlan::Append { offset, size })
    }

    // =========================================================================
    // Block Reads (overlay-aware)
    // =========================================================================

    fn read_block_header(&self, offset: u64) -> Result<BlockHeader> {
        if let Some(tx) = &self.tx {
            if let Some(image) = tx.block_image(offset) {
                return BlockHeader::decode(image);
            }
        }
        let mut buf = [0u8; BLOCK_PREFIX_SIZE as usize];
        self.read_exact_at(&mut buf, offset)?;
        BlockHeader::decode(&buf)
    }

    fn read_block_key(&self, offset: u64, header: &BlockHeader) -> Result<Vec<u8>> {
        if let Some(tx) = &self.tx {
            if let Some(image) = tx.block_image(offset) {
                let start = BLOCK_PREFIX_SIZE as usize;
                let end = start + header.key_len as usize;
                if image.len() < end {
                    return Err(KvError::Corrupt(
                        "staged block image shorter than its key".to_string(),
                    ));
                }
                return Ok(image[start..end].to_vec());
            }
        }
        let mut key = vec![0u8; header.key_len as usize];
        self.read_exact_at(&mut key, offset + BLOCK_PREFIX_SIZE)?;
        Ok(key)
    }

    fn read_block_value(&self, offset: u64, header: &BlockHeader) -> Result<Vec<u8>> {
        if let Some(tx) = &self.tx {
            if let Some(image) = tx.block_image(offset) {
                return Ok(block::decode_block(image)?.value);
            }
        }
        let len_offset = offset + BLOCK_PREFIX_SIZE + header.key_len;
        let value_len = self.read_u64_at(len_offset)?;
        if block::encoded_len(header.key_len, value_len)
            > freelist::class_size(header.size_class)
        {
            return Err(KvError::Corrupt(format!(
                "record at offset {} does not fit its class-{} block",
                offset, header.size_class
            )));
        }
        let mut value = vec![0u8; value_len as usize];
        self.read_exact_at(&mut value, len_offset + 8)?;
        Ok(value)
    }

    // =========================================================================
    // Raw I/O (bounds-checked reads against the committed file size)
    // =========================================================================

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let end = offset.checked_add(buf.len() as u64).ok_or_else(|| {
            KvError::Corrupt(format!("read offset {} overflows", offset))
        })?;
        if end > self.header.file_size {
            return Err(KvError::Corrupt(format!(
                "read of {} bytes at offset {} crosses the recorded file size {}",
                buf.len(),
                offset,
                self.header.file_size
            )));
        }
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn read_u64_at(&self, offset: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact_at(&mut buf, offset)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_all_at(&self, buf: &[u8], offset: u64) -> Result<()> {
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn write_u64_at(&self, value: u64, offset: u64) -> Result<()> {
        self.write_all_at(&value.to_le_bytes(), offset)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Committed logical file size
    pub fn file_size(&self) -> u64 {
        self.header.file_size
    }

    /// Number of tables in the committed chain
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Total live records across the committed chain
    pub fn entry_count(&self) -> u64 {
        self.tables.iter().map(|t| t.count).sum()
    }

    /// Storage/compression type tag recorded in the header
    pub fn storage_type(&self) -> u8 {
        self.header.storage_type
    }

    /// The configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
