//! what does our filesystem look like on the device and in memory

use log::{debug, info, warn};

use crate::{
    block_device::{Block, BlockDevice},
    utils::{fs_size_calculator, traits::FixedWidthRecord},
};

use super::{
    AllocationTable, DescriptorTable, Directory, FsError, Result, SuperBlock, BLOCK_SIZE,
    MAX_DIR_LEN, MAX_FAT_LEN, MAX_FILE_DESC, MAX_FILE_LIMIT, SUPERBLOCK_BLOCK, SUPERBLOCK_SIZE,
};

/// A mounted volume.
///
/// It has the following layout on the device:
/// - superblock, at byte 0
/// - directory, at `directory_offset`
/// - allocation table, at `table_offset`
/// - data blocks, from `data_offset` to the end of the device
///
/// Between [Volume::mount] and [Volume::unmount] the metadata lives in memory
/// and only file contents are written through to the device.
#[derive(Debug)]
pub struct Volume<D: BlockDevice> {
    pub(super) device: D,
    pub(super) superblock: SuperBlock,
    pub(super) table: AllocationTable,
    pub(super) directory: Directory,
    pub(super) descriptors: DescriptorTable,
}

/// volume wide counters, see [Volume::stats]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeStats {
    pub file_count: usize,
    pub max_files: usize,
    pub free_blocks: usize,
    pub data_blocks: usize,
    pub open_files: usize,
    pub max_open_files: usize,
    pub block_size: usize,
}

impl VolumeStats {
    pub fn free_bytes(&self) -> u64 {
        (self.free_blocks * self.block_size) as u64
    }
}

/// format, mount and unmount
impl<D: BlockDevice> Volume<D> {
    /// write a fresh superblock and empty directory and table regions
    ///
    /// The device must not be mounted anywhere while it is formatted.
    pub fn format(device: &mut D) -> Result<()> {
        let superblock = SuperBlock::new();
        write_region(device, 0, &superblock.encode()?)?;
        write_region(device, superblock.directory_offset, &Directory::new().serialize()?)?;
        let table = AllocationTable::new(
            superblock.data_start_block(),
            superblock.data_block_count(),
        );
        write_region(device, superblock.table_offset, &table.serialize_all()?)?;
        device.flush()?;
        info!(
            "formatted volume: {} data blocks from block {}",
            superblock.data_block_count(),
            superblock.data_start_block()
        );
        Ok(())
    }

    /// read the superblock, directory and allocation table into memory
    ///
    /// # Errors
    /// - [FsError::NotFormatted] if block 0 does not start with the signature;
    /// nothing past block 0 is read in that case
    /// - [FsError::CorruptSuperblock], [FsError::CorruptTable] if the metadata
    /// does not have the expected layout
    pub fn mount(device: D) -> Result<Self> {
        let first_block = device.read(SUPERBLOCK_BLOCK)?;
        let mut superblock = SuperBlock::decode_from(&first_block[..SUPERBLOCK_SIZE])?;

        let directory_region = read_region(&device, superblock.directory_offset, MAX_DIR_LEN)?;
        let directory = Directory::deserialize(&directory_region)?;
        let table_region = read_region(&device, superblock.table_offset, MAX_FAT_LEN)?;
        let entries = AllocationTable::deserialize_all(&table_region)?;
        let table = AllocationTable::from_entries(
            entries,
            superblock.data_start_block(),
            superblock.data_block_count(),
        )?;
        let directory = link_directory(&table, directory)?;

        let file_count = table.file_count() as u64;
        if superblock.file_count != file_count {
            warn!(
                "superblock says {} files, the table holds {file_count}",
                superblock.file_count
            );
            superblock.file_count = file_count;
        }
        let free_blocks = table.free_blocks() as u64;
        if superblock.free_block_count != free_blocks {
            warn!(
                "superblock says {} free blocks, the table leaves {free_blocks}",
                superblock.free_block_count
            );
            superblock.free_block_count = free_blocks;
        }

        info!(
            "mounted volume with {} file(s), {} free block(s)",
            superblock.file_count, superblock.free_block_count
        );
        Ok(Self {
            device,
            superblock,
            table,
            directory,
            descriptors: DescriptorTable::new(),
        })
    }

    /// write the superblock, then the allocation table, then the directory
    /// back to their regions and flush the device
    pub fn sync(&mut self) -> Result<()> {
        write_region(&mut self.device, 0, &self.superblock.encode()?)?;
        write_region(
            &mut self.device,
            self.superblock.table_offset,
            &self.table.serialize_all()?,
        )?;
        write_region(
            &mut self.device,
            self.superblock.directory_offset,
            &self.directory.serialize()?,
        )?;
        self.device.flush()?;
        debug!("metadata synced");
        Ok(())
    }

    /// sync the metadata and close the device, returning it to the caller;
    /// every open descriptor is invalidated
    pub fn unmount(mut self) -> Result<D> {
        let open_files = self.descriptors.open_count();
        if open_files > 0 {
            debug!("unmounting with {open_files} open descriptor(s)");
        }
        self.sync()?;
        self.device.close()?;
        info!("unmounted volume with {} file(s)", self.superblock.file_count);
        Ok(self.device)
    }
}

/// get [SuperBlock], counters and the device of this volume
impl<D: BlockDevice> Volume<D> {
    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    #[inline]
    pub fn allocation_table(&self) -> &AllocationTable {
        &self.table
    }

    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn stats(&self) -> VolumeStats {
        VolumeStats {
            file_count: self.superblock.file_count as usize,
            max_files: MAX_FILE_LIMIT,
            free_blocks: self.superblock.free_block_count as usize,
            data_blocks: self.table.data_blocks(),
            open_files: self.descriptors.open_count(),
            max_open_files: MAX_FILE_DESC,
            block_size: BLOCK_SIZE,
        }
    }

    /// refresh the superblock counters from the allocation table
    pub(super) fn update_counters(&mut self) {
        self.superblock.file_count = self.table.file_count() as u64;
        self.superblock.free_block_count = self.table.free_blocks() as u64;
    }
}

/// check that every in-use record names a directory slot of its own,
/// and drop directory names no record points at
fn link_directory(table: &AllocationTable, mut directory: Directory) -> Result<Directory> {
    let mut referenced = [false; MAX_FILE_LIMIT];
    for (index, record) in table.in_use() {
        if directory.name(record.directory_slot).is_none() {
            return Err(FsError::CorruptTable(format!(
                "record {index} points at empty directory slot {}",
                record.directory_slot
            )));
        }
        if std::mem::replace(&mut referenced[record.directory_slot], true) {
            return Err(FsError::CorruptTable(format!(
                "directory slot {} is shared by several records",
                record.directory_slot
            )));
        }
    }
    let orphans: Vec<usize> = directory
        .entries()
        .map(|(slot, _)| slot)
        .filter(|slot| !referenced[*slot])
        .collect();
    for slot in orphans {
        warn!(
            "dropping directory name {:?} in slot {slot}: no file record uses it",
            directory.name(slot).map(|name| name.as_str())
        );
        directory.clear(slot);
    }
    Ok(directory)
}

/// read `len` bytes starting at the block aligned byte `offset`
pub(super) fn read_region<D: BlockDevice>(
    device: &D,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    let first = fs_size_calculator::block_of_offset(offset);
    let mut region = Vec::with_capacity(fs_size_calculator::region_blocks(len) * BLOCK_SIZE);
    for index in first..first + fs_size_calculator::region_blocks(len) {
        region.extend_from_slice(&device.read(index)?);
    }
    region.truncate(len);
    Ok(region)
}

/// write `bytes` starting at the block aligned byte `offset`,
/// zero filling the rest of the last block
pub(super) fn write_region<D: BlockDevice>(
    device: &mut D,
    offset: u64,
    bytes: &[u8],
) -> Result<()> {
    let first = fs_size_calculator::block_of_offset(offset);
    for (index, chunk) in (first..).zip(bytes.chunks(BLOCK_SIZE)) {
        device.write_block(index, &Block::from_prefix(chunk)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{
        block_device::MemoryDisk,
        fs::{AllocationEntry, FileRecord, FAT_RECORD_LEN},
    };

    /// a [MemoryDisk] that counts block reads
    struct CountingDisk {
        inner: MemoryDisk,
        reads: Rc<Cell<usize>>,
    }

    impl BlockDevice for CountingDisk {
        fn read_block(&self, index: usize, buf: &mut Block) -> Result<()> {
            self.reads.set(self.reads.get() + 1);
            self.inner.read_block(index, buf)
        }

        fn write_block(&mut self, index: usize, buf: &Block) -> Result<()> {
            self.inner.write_block(index, buf)
        }

        fn flush(&mut self) -> Result<()> {
            self.inner.flush()
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }
    }

    fn formatted_disk() -> MemoryDisk {
        let mut disk = MemoryDisk::new();
        Volume::format(&mut disk).unwrap();
        disk
    }

    #[test]
    fn test_format_layout() {
        let disk = formatted_disk();
        let block = disk.read(0).unwrap();
        assert_eq!(&block[..SUPERBLOCK_SIZE], b"CPSC3514096819216777216004096");
        assert!(block[SUPERBLOCK_SIZE..].iter().all(|b| *b == 0));
        assert_eq!(disk.read(1).unwrap(), Block::zeroed());
        assert_eq!(disk.read(2).unwrap(), Block::zeroed());
    }

    #[test]
    fn test_mount_empty_volume() {
        let volume = Volume::mount(formatted_disk()).unwrap();
        assert_eq!(volume.superblock(), &SuperBlock::new());
        let stats = volume.stats();
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.free_blocks, 4096);
        assert_eq!(stats.data_blocks, 4096);
        assert_eq!(stats.open_files, 0);
        assert_eq!(stats.free_bytes(), 4096 * 4096);
    }

    #[test]
    fn test_mount_unformatted_reads_only_block_zero() {
        let reads = Rc::new(Cell::new(0));
        let disk = CountingDisk {
            inner: MemoryDisk::new(),
            reads: Rc::clone(&reads),
        };
        assert!(matches!(Volume::mount(disk), Err(FsError::NotFormatted)));
        assert_eq!(reads.get(), 1);
    }

    #[test]
    fn test_mount_corrupt_superblock() {
        let mut disk = formatted_disk();
        let mut block = disk.read(0).unwrap();
        block[7..11].copy_from_slice(b"40x6");
        disk.write_block(0, &block).unwrap();
        assert!(matches!(
            Volume::mount(disk),
            Err(FsError::CorruptSuperblock(_))
        ));
    }

    #[test]
    fn test_mount_corrupt_table() {
        let mut disk = formatted_disk();
        let mut block = Block::zeroed();
        block[..FAT_RECORD_LEN].copy_from_slice(b"0000000040960x960000");
        disk.write_block(2, &block).unwrap();
        assert!(matches!(Volume::mount(disk), Err(FsError::CorruptTable(_))));
    }

    #[test]
    fn test_mount_record_with_empty_directory_slot() {
        let mut disk = formatted_disk();
        let mut block = Block::zeroed();
        block[..FAT_RECORD_LEN].copy_from_slice(b"00000010409640960000");
        disk.write_block(2, &block).unwrap();
        assert!(matches!(
            Volume::mount(disk),
            Err(FsError::CorruptTable(msg)) if msg.contains("empty directory slot")
        ));
    }

    #[test]
    fn test_mount_reconciles_counters() {
        let mut disk = formatted_disk();
        // one file "a" in slot 0, two blocks, but a superblock that still says empty
        disk.write_block(1, &Block::from_prefix(b"a\0").unwrap()).unwrap();
        let entry = AllocationEntry::InUse(FileRecord {
            file_size: 5000,
            start_block: 4096,
            end_block: 4097,
            directory_slot: 0,
        });
        disk.write_block(2, &Block::from_prefix(&entry.encode().unwrap()).unwrap()).unwrap();
        // an orphan name in slot 3
        let mut directory = disk.read(1).unwrap();
        directory[48..50].copy_from_slice(b"b\0");
        disk.write_block(1, &directory).unwrap();

        let volume = Volume::mount(disk).unwrap();
        assert_eq!(volume.superblock().file_count, 1);
        assert_eq!(volume.superblock().free_block_count, 4094);
        assert_eq!(volume.directory().find_slot_by_name("a"), Some(0));
        assert_eq!(volume.directory().find_slot_by_name("b"), None);
    }

    #[test]
    fn test_unmount_writes_metadata_and_closes() {
        let mut volume = Volume::mount(formatted_disk()).unwrap();
        volume.superblock.free_block_count = 4000;
        let disk = volume.unmount().unwrap();
        assert!(!disk.is_open());

        let mut disk = disk;
        disk.open().unwrap();
        assert_eq!(&disk.read(0).unwrap()[23..29], b"004000");
    }

    #[test]
    fn test_region_helpers() {
        let mut disk = MemoryDisk::new();
        let bytes: Vec<u8> = (0..BLOCK_SIZE + 10).map(|i| i as u8).collect();
        write_region(&mut disk, 8192, &bytes).unwrap();
        assert_eq!(read_region(&disk, 8192, bytes.len()).unwrap(), bytes);
        assert_eq!(&disk.read(3).unwrap()[10..], &[0u8; BLOCK_SIZE - 10][..]);
    }
}
