use crate::utils::{
    fixed_width::Field,
    fs_size_calculator::{block_of_offset, data_block_count},
    traits::FixedWidthRecord,
};

use super::{
    FsError, Result, BLOCK_SIZE, DATA_OFFSET, DIRECTORY_OFFSET, DISK_BLOCKS, FS_SIGNATURE,
    MAX_DIR_LEN, MAX_FAT_LEN, MAX_FILE_LIMIT, SUPERBLOCK_SIZE, TABLE_OFFSET,
};

const SIGNATURE_LEN: usize = FS_SIGNATURE.len();
const DIRECTORY_OFFSET_FIELD: Field = Field::new("directory offset", SIGNATURE_LEN, 4);
const TABLE_OFFSET_FIELD: Field = Field::new("table offset", DIRECTORY_OFFSET_FIELD.end(), 4);
const DATA_OFFSET_FIELD: Field = Field::new("data offset", TABLE_OFFSET_FIELD.end(), 8);
const FILE_COUNT_FIELD: Field = Field::new("file count", DATA_OFFSET_FIELD.end(), 2);
const FREE_BLOCKS_FIELD: Field = Field::new("free block count", FILE_COUNT_FIELD.end(), 4);

/// The superblock of this filesystem.
///
/// Stored at byte 0 of the device as the signature followed by five zero padded
/// decimal fields. The in-memory copy is authoritative between mount and unmount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// byte offset of the directory region
    pub directory_offset: u64,
    /// byte offset of the allocation table region
    pub table_offset: u64,
    /// byte offset of the first data block
    pub data_offset: u64,
    /// files currently registered
    pub file_count: u64,
    pub free_block_count: u64,
}

impl SuperBlock {
    /// the superblock `format` writes: directory in block 1, table in block 2,
    /// data in the upper half of the disk
    pub fn new() -> Self {
        Self {
            directory_offset: DIRECTORY_OFFSET,
            table_offset: TABLE_OFFSET,
            data_offset: DATA_OFFSET,
            file_count: 0,
            free_block_count: data_block_count(DATA_OFFSET) as u64,
        }
    }

    /// first block of the data region
    pub fn data_start_block(&self) -> usize {
        block_of_offset(self.data_offset)
    }

    pub fn data_block_count(&self) -> usize {
        data_block_count(self.data_offset)
    }

    /// check the region layout and counters
    pub fn validate(&self) -> Result<()> {
        let block_size = BLOCK_SIZE as u64;
        let offsets = [self.directory_offset, self.table_offset, self.data_offset];
        if let Some(offset) = offsets.iter().find(|offset| *offset % block_size != 0) {
            return Err(FsError::CorruptSuperblock(format!(
                "offset {offset} is not block aligned"
            )));
        }
        if self.directory_offset == 0
            || self.directory_offset + MAX_DIR_LEN as u64 > self.table_offset
            || self.table_offset + MAX_FAT_LEN as u64 > self.data_offset
        {
            return Err(FsError::CorruptSuperblock(format!(
                "regions overlap: directory {}, table {}, data {}",
                self.directory_offset, self.table_offset, self.data_offset
            )));
        }
        if self.data_start_block() >= DISK_BLOCKS {
            return Err(FsError::CorruptSuperblock(format!(
                "data offset {} is past the end of the disk",
                self.data_offset
            )));
        }
        if self.file_count > MAX_FILE_LIMIT as u64 {
            return Err(FsError::CorruptSuperblock(format!(
                "file count {} exceeds {MAX_FILE_LIMIT}",
                self.file_count
            )));
        }
        if self.free_block_count > DISK_BLOCKS as u64 {
            return Err(FsError::CorruptSuperblock(format!(
                "free block count {} exceeds {DISK_BLOCKS}",
                self.free_block_count
            )));
        }
        Ok(())
    }
}

impl Default for SuperBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedWidthRecord for SuperBlock {
    const WIDTH: usize = SUPERBLOCK_SIZE;

    fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        buf[..SIGNATURE_LEN].copy_from_slice(FS_SIGNATURE);
        DIRECTORY_OFFSET_FIELD.write(buf, self.directory_offset)?;
        TABLE_OFFSET_FIELD.write(buf, self.table_offset)?;
        DATA_OFFSET_FIELD.write(buf, self.data_offset)?;
        FILE_COUNT_FIELD.write(buf, self.file_count)?;
        FREE_BLOCKS_FIELD.write(buf, self.free_block_count)
    }

    fn decode_from(buf: &[u8]) -> Result<Self> {
        if buf.get(..SIGNATURE_LEN) != Some(FS_SIGNATURE.as_slice()) {
            return Err(FsError::NotFormatted);
        }
        let read = |field: Field| {
            field.read(buf).ok_or_else(|| {
                FsError::CorruptSuperblock(format!("{} is not a decimal number", field.name))
            })
        };
        let superblock = Self {
            directory_offset: read(DIRECTORY_OFFSET_FIELD)?,
            table_offset: read(TABLE_OFFSET_FIELD)?,
            data_offset: read(DATA_OFFSET_FIELD)?,
            file_count: read(FILE_COUNT_FIELD)?,
            free_block_count: read(FREE_BLOCKS_FIELD)?,
        };
        superblock.validate()?;
        Ok(superblock)
    }
}
