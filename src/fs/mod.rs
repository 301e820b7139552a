//! our flat, single-directory filesystem
pub mod allocation_table;
pub mod descriptor;
pub mod directory;
mod error;
mod fs_api_impl;
pub mod fs_layout;
pub mod superblock;
pub use allocation_table::*;
pub use descriptor::*;
pub use directory::*;
pub use error::*;
pub use fs_api_impl::FileStat;
pub use fs_layout::*;
pub use superblock::*;

/// number of blocks on the virtual disk
pub const DISK_BLOCKS: usize = 8192;
/// block size on the virtual disk
pub const BLOCK_SIZE: usize = 4096;
/// how many files can be open at the same time
pub const MAX_FILE_DESC: usize = 32;
/// 15 usable characters plus the NUL terminator
pub const MAX_FILENAME_LEN: usize = 16;
/// how many files a volume can hold
pub const MAX_FILE_LIMIT: usize = 64;
/// length of the directory region, `MAX_FILE_LIMIT` slots of `MAX_FILENAME_LEN` bytes
pub const MAX_DIR_LEN: usize = 1024;
/// length of the allocation table region, `MAX_FILE_LIMIT` records of `FAT_RECORD_LEN` bytes
pub const MAX_FAT_LEN: usize = 1280;
/// one allocation table record
pub const FAT_RECORD_LEN: usize = 20;
/// signature + directory offset + table offset + data offset + file count + free blocks
pub const SUPERBLOCK_SIZE: usize = 29;

const FS_SIGNATURE: &[u8; 7] = b"CPSC351";
const SUPERBLOCK_BLOCK: usize = 0;
/// canonical byte offsets written by `format`
const DIRECTORY_OFFSET: u64 = BLOCK_SIZE as u64;
const TABLE_OFFSET: u64 = 2 * BLOCK_SIZE as u64;
const DATA_OFFSET: u64 = (DISK_BLOCKS / 2 * BLOCK_SIZE) as u64;
