use log::{debug, info};

use crate::{
    block_device::{Block, BlockDevice},
    utils::fs_size_calculator,
};

use super::{
    FileDescriptor, FileName, FileRecord, FsError, OpenFile, Result, Volume, BLOCK_SIZE,
};

/// one row of [Volume::list]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: u64,
    pub start_block: usize,
    pub end_block: usize,
}

/// file level operations
impl<D: BlockDevice> Volume<D> {
    /// create an empty file, reserving one data block for it
    pub fn create(&mut self, name: &str) -> Result<()> {
        let name = FileName::new(name)?;
        if self.directory.find_slot_by_name(name.as_str()).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        let index = self.table.find_free_slot().ok_or(FsError::TooManyFiles)?;
        let directory_slot = self
            .directory
            .find_free_slot()
            .ok_or(FsError::TooManyFiles)?;
        let (start_block, end_block) = self
            .table
            .find_free_extent(1)
            .ok_or(FsError::NoSpace { blocks: 1 })?;

        self.table.allocate(
            index,
            FileRecord {
                file_size: 0,
                start_block,
                end_block,
                directory_slot,
            },
        )?;
        self.directory.write(directory_slot, name.as_str())?;
        self.update_counters();
        info!(
            "created {:?} in record {index}, block {start_block}",
            name.as_str()
        );
        Ok(())
    }

    /// open `name` with the cursor at the start of the file
    pub fn open(&mut self, name: &str) -> Result<FileDescriptor> {
        let index = self.find_file(name)?;
        let fd = self.descriptors.open(index)?;
        debug!("opened {name:?} as descriptor {fd}");
        Ok(fd)
    }

    pub fn close(&mut self, fd: FileDescriptor) -> Result<()> {
        self.descriptors.close(fd)?;
        debug!("closed descriptor {fd}");
        Ok(())
    }

    /// read up to `len` bytes at the cursor; fewer at the end of the file
    pub fn read(&mut self, fd: FileDescriptor, len: usize) -> Result<Vec<u8>> {
        let OpenFile { entry, cursor } = *self.descriptors.get(fd)?;
        let record = *self.record(fd, entry)?;
        let len = len.min(record.file_size.saturating_sub(cursor) as usize);

        let mut data = Vec::with_capacity(len);
        let mut position = cursor;
        while data.len() < len {
            let block = record.start_block + (position / BLOCK_SIZE as u64) as usize;
            let offset_in_block = (position % BLOCK_SIZE as u64) as usize;
            let chunk = (BLOCK_SIZE - offset_in_block).min(len - data.len());
            let buf = self.device.read(block)?;
            data.extend_from_slice(&buf[offset_in_block..offset_in_block + chunk]);
            position += chunk as u64;
        }

        self.descriptors.get_mut(fd)?.cursor = position;
        debug!("read {} byte(s) from descriptor {fd} at {cursor}", data.len());
        Ok(data)
    }

    /// Write `data` at the cursor, growing the extent in place when needed.
    ///
    /// # Errors
    /// [FsError::NoSpace] if the blocks right after the extent are taken or
    /// past the end of the disk; the file and the free block count are left
    /// as they were. Files are never moved to find room.
    pub fn write(&mut self, fd: FileDescriptor, data: &[u8]) -> Result<usize> {
        let OpenFile { entry, cursor } = *self.descriptors.get(fd)?;
        let record = *self.record(fd, entry)?;
        if data.is_empty() {
            return Ok(0);
        }

        let end = cursor + data.len() as u64;
        let blocks_needed = fs_size_calculator::blocks_for_bytes(end);
        if blocks_needed > record.block_count() {
            let extra = blocks_needed - record.block_count();
            self.table.extend(entry, extra)?;
            self.update_counters();
            debug!(
                "extent of record {entry} grew by {extra} block(s) to {}..={}",
                record.start_block,
                record.end_block + extra
            );
        }

        let mut written = 0;
        let outcome = loop {
            if written == data.len() {
                break Ok(());
            }
            let position = cursor + written as u64;
            let block = record.start_block + (position / BLOCK_SIZE as u64) as usize;
            match self.write_in_block(block, position, &data[written..]) {
                Ok(chunk) => written += chunk,
                Err(e) => break Err(e),
            }
        };

        // keep whatever reached the device, even if a later block failed
        let reached = cursor + written as u64;
        if let Some(record) = self.table.record_mut(entry) {
            record.file_size = record.file_size.max(reached);
        }
        self.descriptors.get_mut(fd)?.cursor = reached;
        outcome?;
        debug!("wrote {written} byte(s) to descriptor {fd} at {cursor}");
        Ok(written)
    }

    /// move the cursor to `offset`, which may be at most the file size
    pub fn seek(&mut self, fd: FileDescriptor, offset: i64) -> Result<()> {
        let OpenFile { entry, .. } = *self.descriptors.get(fd)?;
        let file_size = self.record(fd, entry)?.file_size;
        if offset < 0 || offset as u64 > file_size {
            return Err(FsError::InvalidOffset { offset, file_size });
        }
        self.descriptors.get_mut(fd)?.cursor = offset as u64;
        debug!("descriptor {fd} seeked to {offset}");
        Ok(())
    }

    /// delete `name`, refused while any descriptor has it open
    pub fn delete(&mut self, name: &str) -> Result<()> {
        let index = self.find_file(name)?;
        if self.descriptors.is_referenced(index) {
            return Err(FsError::FileOpen(name.to_owned()));
        }
        if let Some(record) = self.table.release(index) {
            self.directory.clear(record.directory_slot);
            info!(
                "deleted {name:?}, blocks {}..={} are free again",
                record.start_block, record.end_block
            );
        }
        self.update_counters();
        Ok(())
    }

    /// the size of the file behind `fd`
    pub fn get_size(&self, fd: FileDescriptor) -> Result<u64> {
        let OpenFile { entry, .. } = *self.descriptors.get(fd)?;
        Ok(self.record(fd, entry)?.file_size)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.find_file(name).is_ok()
    }

    /// every file, in allocation table order
    pub fn list(&self) -> Vec<FileStat> {
        self.table
            .in_use()
            .filter_map(|(_, record)| {
                let name = self.directory.name(record.directory_slot)?;
                Some(FileStat {
                    name: name.to_string(),
                    size: record.file_size,
                    start_block: record.start_block,
                    end_block: record.end_block,
                })
            })
            .collect()
    }
}

impl<D: BlockDevice> Volume<D> {
    /// the allocation table index of `name`
    fn find_file(&self, name: &str) -> Result<usize> {
        let slot = self
            .directory
            .find_slot_by_name(name)
            .ok_or_else(|| FsError::NotFound(name.to_owned()))?;
        self.table
            .in_use()
            .find(|(_, record)| record.directory_slot == slot)
            .map(|(index, _)| index)
            .ok_or_else(|| FsError::NotFound(name.to_owned()))
    }

    fn record(&self, fd: FileDescriptor, entry: usize) -> Result<&FileRecord> {
        self.table
            .record(entry)
            .ok_or(FsError::InvalidDescriptor(fd.as_raw()))
    }

    /// write as much of `data` as fits in `block` from byte `position` of the
    /// file on, returning how many bytes went in
    fn write_in_block(&mut self, block: usize, position: u64, data: &[u8]) -> Result<usize> {
        let offset_in_block = (position % BLOCK_SIZE as u64) as usize;
        let chunk = (BLOCK_SIZE - offset_in_block).min(data.len());
        let mut buf = if chunk == BLOCK_SIZE {
            Block::zeroed()
        } else {
            self.device.read(block)?
        };
        buf[offset_in_block..offset_in_block + chunk].copy_from_slice(&data[..chunk]);
        self.device.write_block(block, &buf)?;
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block_device::MemoryDisk,
        fs::{MAX_FILE_DESC, MAX_FILE_LIMIT},
    };

    fn mounted() -> Volume<MemoryDisk> {
        let mut disk = MemoryDisk::new();
        Volume::format(&mut disk).unwrap();
        Volume::mount(disk).unwrap()
    }

    fn assert_extents_disjoint(volume: &Volume<MemoryDisk>) {
        let records: Vec<FileRecord> = volume
            .allocation_table()
            .in_use()
            .map(|(_, record)| *record)
            .collect();
        for (i, a) in records.iter().enumerate() {
            for b in &records[i + 1..] {
                assert!(a.end_block < b.start_block || b.end_block < a.start_block);
            }
        }
    }

    #[test]
    fn test_create_and_open() {
        let mut volume = mounted();
        volume.create("a.txt").unwrap();
        assert_eq!(volume.superblock().file_count, 1);
        assert_eq!(volume.superblock().free_block_count, 4095);
        assert!(volume.exists("a.txt"));

        let fd = volume.open("a.txt").unwrap();
        assert_eq!(volume.get_size(fd).unwrap(), 0);
        assert!(volume.read(fd, 10).unwrap().is_empty());
    }

    #[test]
    fn test_create_errors() {
        let mut volume = mounted();
        volume.create("a.txt").unwrap();
        assert!(matches!(
            volume.create("a.txt"),
            Err(FsError::AlreadyExists(_))
        ));
        assert!(matches!(
            volume.create("sixteen_chars___"),
            Err(FsError::NameTooLong(_))
        ));
        assert!(matches!(volume.create(""), Err(FsError::InvalidName(_))));
        assert_eq!(volume.superblock().file_count, 1);
    }

    #[test]
    fn test_open_missing_file() {
        let mut volume = mounted();
        assert!(matches!(volume.open("nope"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_too_many_files() {
        let mut volume = mounted();
        for i in 0..MAX_FILE_LIMIT {
            volume.create(&format!("file{i}")).unwrap();
        }
        assert!(matches!(
            volume.create("one_more"),
            Err(FsError::TooManyFiles)
        ));

        volume.delete("file10").unwrap();
        volume.create("one_more").unwrap();
        assert_eq!(volume.superblock().file_count, MAX_FILE_LIMIT as u64);
        assert_extents_disjoint(&volume);
    }

    #[test]
    fn test_too_many_open_files() {
        let mut volume = mounted();
        volume.create("shared").unwrap();
        let fds: Vec<FileDescriptor> = (0..MAX_FILE_DESC)
            .map(|_| volume.open("shared").unwrap())
            .collect();
        assert!(matches!(
            volume.open("shared"),
            Err(FsError::TooManyOpenFiles)
        ));
        volume.close(fds[0]).unwrap();
        assert!(volume.open("shared").is_ok());
    }

    #[test]
    fn test_close_invalid_descriptor() {
        let mut volume = mounted();
        volume.create("a").unwrap();
        let fd = volume.open("a").unwrap();
        volume.close(fd).unwrap();
        assert!(matches!(volume.close(fd), Err(FsError::InvalidDescriptor(_))));
        assert!(matches!(volume.get_size(fd), Err(FsError::InvalidDescriptor(_))));
        assert!(matches!(volume.read(fd, 1), Err(FsError::InvalidDescriptor(_))));
        assert!(matches!(
            volume.write(fd, b"x"),
            Err(FsError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_write_then_read() {
        let mut volume = mounted();
        volume.create("a.txt").unwrap();
        let fd = volume.open("a.txt").unwrap();
        let bytes = b"hello, virtual disk";
        assert_eq!(volume.write(fd, bytes).unwrap(), bytes.len());
        assert_eq!(volume.get_size(fd).unwrap(), bytes.len() as u64);

        volume.seek(fd, 0).unwrap();
        assert_eq!(volume.read(fd, bytes.len()).unwrap(), bytes);
        // at the end of the file
        assert!(volume.read(fd, 5).unwrap().is_empty());
    }

    #[test]
    fn test_short_read_and_cursor() {
        let mut volume = mounted();
        volume.create("a").unwrap();
        let fd = volume.open("a").unwrap();
        volume.write(fd, b"0123456789").unwrap();
        volume.seek(fd, 4).unwrap();
        assert_eq!(volume.read(fd, 3).unwrap(), b"456");
        assert_eq!(volume.read(fd, 100).unwrap(), b"789");
    }

    #[test]
    fn test_overwrite_inside_file() {
        let mut volume = mounted();
        volume.create("a").unwrap();
        let fd = volume.open("a").unwrap();
        volume.write(fd, b"aaaaaaaaaa").unwrap();
        volume.seek(fd, 3).unwrap();
        volume.write(fd, b"BBB").unwrap();
        assert_eq!(volume.get_size(fd).unwrap(), 10);

        volume.seek(fd, 0).unwrap();
        assert_eq!(volume.read(fd, 10).unwrap(), b"aaaBBBaaaa");
    }

    #[test]
    fn test_write_spanning_blocks() {
        let mut volume = mounted();
        volume.create("big").unwrap();
        let fd = volume.open("big").unwrap();
        let data: Vec<u8> = (0..3 * BLOCK_SIZE + 17).map(|i| (i % 251) as u8).collect();
        volume.write(fd, &data).unwrap();

        let stat = &volume.list()[0];
        assert_eq!(stat.end_block - stat.start_block + 1, 4);
        assert_eq!(volume.superblock().free_block_count, 4096 - 4);

        // read back across the block boundaries in odd sized pieces
        volume.seek(fd, 0).unwrap();
        let mut read_back = Vec::new();
        loop {
            let piece = volume.read(fd, 1000).unwrap();
            if piece.is_empty() {
                break;
            }
            read_back.extend(piece);
        }
        assert_eq!(read_back, data);
    }

    #[test]
    fn test_write_blocked_by_neighbour() {
        let mut volume = mounted();
        volume.create("first").unwrap();
        volume.create("second").unwrap();
        let fd = volume.open("first").unwrap();

        volume.write(fd, &[7u8; BLOCK_SIZE]).unwrap();
        let free_before = volume.superblock().free_block_count;
        let result = volume.write(fd, b"one byte too many");
        assert!(matches!(result, Err(FsError::NoSpace { blocks: 1 })));
        assert_eq!(volume.get_size(fd).unwrap(), BLOCK_SIZE as u64);
        assert_eq!(volume.superblock().free_block_count, free_before);

        // the neighbour is still intact and can grow
        let fd2 = volume.open("second").unwrap();
        volume.write(fd2, &[1u8; 2 * BLOCK_SIZE]).unwrap();
        assert_extents_disjoint(&volume);
    }

    #[test]
    fn test_write_larger_than_disk() {
        let mut volume = mounted();
        volume.create("huge").unwrap();
        let fd = volume.open("huge").unwrap();
        let data = vec![0u8; 4097 * BLOCK_SIZE];
        assert!(matches!(
            volume.write(fd, &data),
            Err(FsError::NoSpace { blocks: 4096 })
        ));
        assert_eq!(volume.get_size(fd).unwrap(), 0);
        assert_eq!(volume.superblock().free_block_count, 4095);
    }

    #[test]
    fn test_seek_bounds() {
        let mut volume = mounted();
        volume.create("a").unwrap();
        let fd = volume.open("a").unwrap();
        volume.write(fd, b"abc").unwrap();
        assert!(volume.seek(fd, 3).is_ok());
        assert!(matches!(
            volume.seek(fd, 4),
            Err(FsError::InvalidOffset {
                offset: 4,
                file_size: 3
            })
        ));
        assert!(matches!(
            volume.seek(fd, -1),
            Err(FsError::InvalidOffset { offset: -1, .. })
        ));
    }

    #[test]
    fn test_shared_file_independent_cursors() {
        let mut volume = mounted();
        volume.create("a").unwrap();
        let writer = volume.open("a").unwrap();
        let reader = volume.open("a").unwrap();
        volume.write(writer, b"first").unwrap();
        assert_eq!(volume.read(reader, 5).unwrap(), b"first");
        // last write wins
        volume.seek(writer, 0).unwrap();
        volume.write(writer, b"FI").unwrap();
        volume.seek(reader, 0).unwrap();
        assert_eq!(volume.read(reader, 5).unwrap(), b"FIrst");
    }

    #[test]
    fn test_delete() {
        let mut volume = mounted();
        volume.create("a").unwrap();
        let fd = volume.open("a").unwrap();
        volume.write(fd, &[1u8; BLOCK_SIZE + 1]).unwrap();
        assert!(matches!(volume.delete("a"), Err(FsError::FileOpen(_))));

        volume.close(fd).unwrap();
        volume.delete("a").unwrap();
        assert!(!volume.exists("a"));
        assert_eq!(volume.superblock().file_count, 0);
        assert_eq!(volume.superblock().free_block_count, 4096);
        assert!(matches!(volume.delete("a"), Err(FsError::NotFound(_))));

        // the name can be used again
        volume.create("a").unwrap();
        let fd = volume.open("a").unwrap();
        assert_eq!(volume.get_size(fd).unwrap(), 0);
    }

    #[test]
    fn test_create_delete_keeps_extents_disjoint() {
        let mut volume = mounted();
        for round in 0..48 {
            let name = format!("f{}", round % 20);
            if volume.exists(&name) {
                volume.delete(&name).unwrap();
            } else {
                volume.create(&name).unwrap();
                let fd = volume.open(&name).unwrap();
                // growing may collide with the next file, which is fine here
                let _ = volume.write(fd, &vec![round as u8; (round % 3) * BLOCK_SIZE]);
                volume.close(fd).unwrap();
            }
            assert_extents_disjoint(&volume);
            let used: usize = volume
                .list()
                .iter()
                .map(|stat| stat.end_block - stat.start_block + 1)
                .sum();
            assert_eq!(
                used + volume.superblock().free_block_count as usize,
                4096
            );
            assert_eq!(
                volume.superblock().file_count as usize,
                volume.list().len()
            );
        }
    }

    #[test]
    fn test_list() {
        let mut volume = mounted();
        volume.create("x").unwrap();
        volume.create("y").unwrap();
        let fd = volume.open("y").unwrap();
        volume.write(fd, b"12345").unwrap();
        let names: Vec<(String, u64)> = volume
            .list()
            .into_iter()
            .map(|stat| (stat.name, stat.size))
            .collect();
        assert_eq!(names, vec![("x".to_string(), 0), ("y".to_string(), 5)]);
    }

    #[test]
    fn test_remount_keeps_files() {
        let mut volume = mounted();
        volume.create("x").unwrap();
        let fd = volume.open("x").unwrap();
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 7 % 256) as u8).collect();
        volume.write(fd, &data).unwrap();

        let mut disk = volume.unmount().unwrap();
        disk.open().unwrap();
        let mut volume = Volume::mount(disk).unwrap();
        assert_eq!(volume.superblock().file_count, 1);
        assert_eq!(volume.superblock().free_block_count, 4094);

        let fd = volume.open("x").unwrap();
        assert_eq!(volume.get_size(fd).unwrap(), 5000);
        assert_eq!(volume.read(fd, 5000).unwrap(), data);
    }

    /// a [MemoryDisk] that refuses to write any block from `fail_from` on
    struct FailingDisk {
        inner: MemoryDisk,
        fail_from: usize,
    }

    impl BlockDevice for FailingDisk {
        fn read_block(&self, index: usize, buf: &mut Block) -> Result<()> {
            self.inner.read_block(index, buf)
        }

        fn write_block(&mut self, index: usize, buf: &Block) -> Result<()> {
            if index >= self.fail_from {
                return Err(FsError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "bad sector",
                )));
            }
            self.inner.write_block(index, buf)
        }

        fn flush(&mut self) -> Result<()> {
            self.inner.flush()
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }
    }

    #[test]
    fn test_write_failing_midway_keeps_accounting() {
        let mut disk = FailingDisk {
            inner: MemoryDisk::new(),
            fail_from: 4098,
        };
        Volume::format(&mut disk).unwrap();
        let mut volume = Volume::mount(disk).unwrap();
        volume.create("f").unwrap();
        let fd = volume.open("f").unwrap();
        let data: Vec<u8> = (0..3 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();

        // blocks 4096 and 4097 land, 4098 fails
        assert!(matches!(volume.write(fd, &data), Err(FsError::Io(_))));
        let check = |volume: &Volume<FailingDisk>| {
            let files = volume.list();
            let stat = &files[0];
            assert_eq!((stat.start_block, stat.end_block), (4096, 4098));
            assert_eq!(stat.size, 2 * BLOCK_SIZE as u64);
            assert_eq!(volume.superblock().free_block_count, 4093);
            assert_eq!(volume.allocation_table().free_blocks(), 4093);
            assert!((4096..=4098).all(|b| volume.allocation_table().is_block_used(b)));
        };
        check(&volume);
        assert_eq!(volume.get_size(fd).unwrap(), 2 * BLOCK_SIZE as u64);

        let mut disk = volume.unmount().unwrap();
        disk.inner.open().unwrap();
        let mut volume = Volume::mount(disk).unwrap();
        check(&volume);
        let fd = volume.open("f").unwrap();
        assert_eq!(volume.get_size(fd).unwrap(), 2 * BLOCK_SIZE as u64);
        assert_eq!(
            volume.read(fd, 3 * BLOCK_SIZE).unwrap(),
            data[..2 * BLOCK_SIZE].to_vec()
        );
    }
}
