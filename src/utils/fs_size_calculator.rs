//! This module contains functions to calculate the size of different fs components

use crate::fs::{BLOCK_SIZE, DISK_BLOCKS};

/// calculate the size of a whole volume image
/// # Example
/// ```
/// use vdiskfs::utils::fs_size_calculator::image_size;
/// assert_eq!(image_size(), 8192 * 4096);
/// ```
pub const fn image_size() -> u64 {
    DISK_BLOCKS as u64 * BLOCK_SIZE as u64
}

/// calculate how many blocks a region of `len` bytes spans
/// # Example
/// ```
/// use vdiskfs::utils::fs_size_calculator::region_blocks;
/// assert_eq!(region_blocks(1024), 1);
/// assert_eq!(region_blocks(4096), 1);
/// assert_eq!(region_blocks(4097), 2);
/// ```
pub const fn region_blocks(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE)
}

/// calculate the block index a block aligned byte offset points at
/// # Example
/// ```
/// use vdiskfs::utils::fs_size_calculator::block_of_offset;
/// assert_eq!(block_of_offset(16_777_216), 4096);
/// ```
pub const fn block_of_offset(offset: u64) -> usize {
    (offset / BLOCK_SIZE as u64) as usize
}

/// calculate how many data blocks follow the data region offset
/// # Example
/// ```
/// use vdiskfs::utils::fs_size_calculator::data_block_count;
/// assert_eq!(data_block_count(16_777_216), 4096);
/// ```
pub const fn data_block_count(data_offset: u64) -> usize {
    DISK_BLOCKS.saturating_sub(block_of_offset(data_offset))
}

/// calculate how many blocks an extent needs to hold `bytes`;
/// every file owns at least one block
/// # Example
/// ```
/// use vdiskfs::utils::fs_size_calculator::blocks_for_bytes;
/// assert_eq!(blocks_for_bytes(0), 1);
/// assert_eq!(blocks_for_bytes(4096), 1);
/// assert_eq!(blocks_for_bytes(5000), 2);
/// ```
pub const fn blocks_for_bytes(bytes: u64) -> usize {
    let blocks = bytes.div_ceil(BLOCK_SIZE as u64) as usize;
    if blocks == 0 {
        1
    } else {
        blocks
    }
}
