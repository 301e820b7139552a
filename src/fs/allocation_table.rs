//! the file allocation table: one fixed-width record per potential file
//!
//! A record is 20 ASCII digits: file size (8), first block (4), last block (4)
//! and directory slot (4). A record whose first byte is zero is free.

use std::ops::RangeInclusive;

use bitvec::prelude::*;

use crate::utils::{fixed_width::Field, traits::FixedWidthRecord};

use super::{FsError, Result, BLOCK_SIZE, FAT_RECORD_LEN, MAX_FAT_LEN, MAX_FILE_LIMIT};

const FILE_SIZE_FIELD: Field = Field::new("file size", 0, 8);
const START_BLOCK_FIELD: Field = Field::new("start block", FILE_SIZE_FIELD.end(), 4);
const END_BLOCK_FIELD: Field = Field::new("end block", START_BLOCK_FIELD.end(), 4);
const DIRECTORY_SLOT_FIELD: Field = Field::new("directory slot", END_BLOCK_FIELD.end(), 4);

/// an in-use file: its size and the contiguous extent holding its data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecord {
    /// bytes
    pub file_size: u64,
    /// first block of the extent, a device block index
    pub start_block: usize,
    /// last block of the extent, inclusive
    pub end_block: usize,
    /// index of the directory slot naming this file
    pub directory_slot: usize,
}

impl FileRecord {
    pub fn block_count(&self) -> usize {
        self.end_block - self.start_block + 1
    }

    /// how many bytes the extent can hold
    pub fn capacity(&self) -> u64 {
        (self.block_count() * BLOCK_SIZE) as u64
    }

    pub fn blocks(&self) -> RangeInclusive<usize> {
        self.start_block..=self.end_block
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AllocationEntry {
    #[default]
    Free,
    InUse(FileRecord),
}

impl AllocationEntry {
    pub fn record(&self) -> Option<&FileRecord> {
        match self {
            AllocationEntry::Free => None,
            AllocationEntry::InUse(record) => Some(record),
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, AllocationEntry::Free)
    }
}

impl FixedWidthRecord for AllocationEntry {
    const WIDTH: usize = FAT_RECORD_LEN;

    fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        buf.fill(0);
        let AllocationEntry::InUse(record) = self else {
            return Ok(());
        };
        FILE_SIZE_FIELD.write(buf, record.file_size)?;
        START_BLOCK_FIELD.write(buf, record.start_block as u64)?;
        END_BLOCK_FIELD.write(buf, record.end_block as u64)?;
        DIRECTORY_SLOT_FIELD.write(buf, record.directory_slot as u64)
    }

    fn decode_from(buf: &[u8]) -> Result<Self> {
        if buf.first().copied().unwrap_or(0) == 0 {
            return Ok(AllocationEntry::Free);
        }
        let read = |field: Field| {
            field.read(buf).ok_or_else(|| {
                FsError::CorruptTable(format!("{} is not a decimal number", field.name))
            })
        };
        Ok(AllocationEntry::InUse(FileRecord {
            file_size: read(FILE_SIZE_FIELD)?,
            start_block: read(START_BLOCK_FIELD)? as usize,
            end_block: read(END_BLOCK_FIELD)? as usize,
            directory_slot: read(DIRECTORY_SLOT_FIELD)? as usize,
        }))
    }
}

/// In-memory allocation table.
///
/// Besides the records it keeps one occupancy bit per data block, so finding
/// a free extent never has to walk every record.
#[derive(Debug, Clone)]
pub struct AllocationTable {
    entries: Vec<AllocationEntry>,
    data_bitmap: BitVec<u8, Lsb0>,
    /// device block index of the first data block
    data_start: usize,
}

/// for serialize and deserialize
impl AllocationTable {
    /// encode every record into the table region
    pub fn serialize_all(&self) -> Result<Vec<u8>> {
        AllocationEntry::encode_all(&self.entries, MAX_FAT_LEN)
    }

    /// decode every record of the table region
    pub fn deserialize_all(region: &[u8]) -> Result<Vec<AllocationEntry>> {
        AllocationEntry::decode_all(region, MAX_FILE_LIMIT)
    }
}

impl AllocationTable {
    /// an empty table over `data_blocks` blocks starting at `data_start`
    pub fn new(data_start: usize, data_blocks: usize) -> Self {
        Self {
            entries: vec![AllocationEntry::Free; MAX_FILE_LIMIT],
            data_bitmap: bitvec![u8, Lsb0; 0; data_blocks],
            data_start,
        }
    }

    /// rebuild a table from decoded records, checking every extent
    pub fn from_entries(
        entries: Vec<AllocationEntry>,
        data_start: usize,
        data_blocks: usize,
    ) -> Result<Self> {
        let mut table = Self::new(data_start, data_blocks);
        if entries.len() != MAX_FILE_LIMIT {
            return Err(FsError::CorruptTable(format!(
                "expected {MAX_FILE_LIMIT} records, found {}",
                entries.len()
            )));
        }
        for (index, entry) in entries.into_iter().enumerate() {
            let AllocationEntry::InUse(record) = entry else {
                continue;
            };
            if record.start_block > record.end_block
                || record.start_block < data_start
                || record.end_block >= data_start + data_blocks
            {
                return Err(FsError::CorruptTable(format!(
                    "record {index}: extent {}..={} is outside the data region",
                    record.start_block, record.end_block
                )));
            }
            if record.file_size > record.capacity() {
                return Err(FsError::CorruptTable(format!(
                    "record {index}: {} bytes do not fit in {} block(s)",
                    record.file_size,
                    record.block_count()
                )));
            }
            if record.directory_slot >= MAX_FILE_LIMIT {
                return Err(FsError::CorruptTable(format!(
                    "record {index}: directory slot {} is out of range",
                    record.directory_slot
                )));
            }
            if !table.is_range_free(record.start_block, record.block_count()) {
                return Err(FsError::CorruptTable(format!(
                    "record {index}: extent {}..={} overlaps another file",
                    record.start_block, record.end_block
                )));
            }
            table.allocate(index, record)?;
        }
        Ok(table)
    }

    pub fn entries(&self) -> &[AllocationEntry] {
        &self.entries
    }

    pub fn record(&self, index: usize) -> Option<&FileRecord> {
        self.entries.get(index)?.record()
    }

    pub fn record_mut(&mut self, index: usize) -> Option<&mut FileRecord> {
        match self.entries.get_mut(index)? {
            AllocationEntry::Free => None,
            AllocationEntry::InUse(record) => Some(record),
        }
    }

    /// (index, record) of every in-use entry
    pub fn in_use(&self) -> impl Iterator<Item = (usize, &FileRecord)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.record().map(|record| (index, record)))
    }

    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.is_free()).count()
    }

    pub fn free_blocks(&self) -> usize {
        self.data_bitmap.count_zeros()
    }

    pub fn data_blocks(&self) -> usize {
        self.data_bitmap.len()
    }

    /// check if a data block belongs to some file
    /// # Params
    /// - `block`: device block index
    pub fn is_block_used(&self, block: usize) -> bool {
        block
            .checked_sub(self.data_start)
            .and_then(|bit| self.data_bitmap.get(bit).as_deref().copied())
            .unwrap_or(false)
    }
}

/// for record and data block allocation
impl AllocationTable {
    /// the lowest free record index
    pub fn find_free_slot(&self) -> Option<usize> {
        self.entries.iter().position(AllocationEntry::is_free)
    }

    /// first fit: the lowest run of `blocks_needed` contiguous free data blocks,
    /// as an inclusive (start, end) pair of device block indices
    pub fn find_free_extent(&self, blocks_needed: usize) -> Option<(usize, usize)> {
        if blocks_needed == 0 {
            return None;
        }
        let mut run = 0;
        for (bit, used) in self.data_bitmap.iter().by_vals().enumerate() {
            if used {
                run = 0;
                continue;
            }
            run += 1;
            if run == blocks_needed {
                let start = self.data_start + bit + 1 - blocks_needed;
                return Some((start, start + blocks_needed - 1));
            }
        }
        None
    }

    /// check whether the `extra` blocks right after a record's extent are free
    pub fn can_extend(&self, record: &FileRecord, extra: usize) -> bool {
        self.is_range_free(record.end_block + 1, extra)
    }

    /// store `record` in the free slot `index` and occupy its extent
    ///
    /// # Errors
    /// [FsError::CorruptTable] if slot `index` is taken or does not exist, or
    /// the extent is not free blocks inside the data region; the table is
    /// left untouched
    pub(crate) fn allocate(&mut self, index: usize, record: FileRecord) -> Result<()> {
        if !self.entries.get(index).is_some_and(AllocationEntry::is_free) {
            return Err(FsError::CorruptTable(format!(
                "record {index} is taken or out of range"
            )));
        }
        if record.start_block > record.end_block
            || !self.is_range_free(record.start_block, record.block_count())
        {
            return Err(FsError::CorruptTable(format!(
                "extent {}..={} is not free",
                record.start_block, record.end_block
            )));
        }
        self.occupy(record.start_block, record.block_count(), true);
        self.entries[index] = AllocationEntry::InUse(record);
        Ok(())
    }

    /// grow the extent of record `index` by `extra` blocks in place
    ///
    /// # Errors
    /// [FsError::NoSpace] when the following blocks are taken or past the end
    /// of the data region; the table is left untouched
    pub fn extend(&mut self, index: usize, extra: usize) -> Result<()> {
        let record = *self
            .record(index)
            .ok_or_else(|| FsError::CorruptTable(format!("record {index} is free")))?;
        if !self.can_extend(&record, extra) {
            return Err(FsError::NoSpace { blocks: extra });
        }
        self.occupy(record.end_block + 1, extra, true);
        if let Some(record) = self.record_mut(index) {
            record.end_block += extra;
        }
        Ok(())
    }

    /// free record `index` and return its extent to the free pool
    pub fn release(&mut self, index: usize) -> Option<FileRecord> {
        let record = *self.record(index)?;
        self.occupy(record.start_block, record.block_count(), false);
        self.entries[index] = AllocationEntry::Free;
        Some(record)
    }

    fn is_range_free(&self, start: usize, count: usize) -> bool {
        let Some(first) = start.checked_sub(self.data_start) else {
            return false;
        };
        match self.data_bitmap.get(first..first + count) {
            Some(bits) => bits.not_any(),
            None => false,
        }
    }

    fn occupy(&mut self, start: usize, count: usize, used: bool) {
        let first = start - self.data_start;
        self.data_bitmap[first..first + count].fill(used);
    }
}
