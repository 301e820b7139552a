//! the raw block device a volume lives on
//!
//! [ImageDisk] maps a host image file into memory, [MemoryDisk] keeps blocks in
//! a sparse in-memory map. Both expose `DISK_BLOCKS` blocks of `BLOCK_SIZE` bytes.
use std::{
    collections::BTreeMap,
    fmt,
    fs::OpenOptions,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
};

use log::debug;
use memmap2::MmapMut;

use crate::{
    fs::{FsError, Result, BLOCK_SIZE, DISK_BLOCKS},
    utils::fs_size_calculator,
};

/// a buffer of exactly `BLOCK_SIZE` bytes
#[derive(Clone, PartialEq, Eq)]
pub struct Block(Box<[u8; BLOCK_SIZE]>);

impl Block {
    pub fn zeroed() -> Self {
        Self(Box::new([0u8; BLOCK_SIZE]))
    }

    /// copy a whole block out of `data`
    ///
    /// # Errors
    /// [FsError::BufferSize] unless `data` is exactly `BLOCK_SIZE` bytes
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() != BLOCK_SIZE {
            return Err(FsError::BufferSize {
                expected: BLOCK_SIZE,
                actual: data.len(),
            });
        }
        let mut block = Self::zeroed();
        block.copy_from_slice(data);
        Ok(block)
    }

    /// copy `data` to the start of a zeroed block
    ///
    /// # Errors
    /// [FsError::BufferSize] if `data` is longer than `BLOCK_SIZE`
    pub fn from_prefix(data: &[u8]) -> Result<Self> {
        if data.len() > BLOCK_SIZE {
            return Err(FsError::BufferSize {
                expected: BLOCK_SIZE,
                actual: data.len(),
            });
        }
        let mut block = Self::zeroed();
        block[..data.len()].copy_from_slice(data);
        Ok(block)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Deref for Block {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.0.as_mut_slice()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.iter().filter(|b| **b != 0).count();
        write!(f, "Block({used} non-zero bytes)")
    }
}

pub trait BlockDevice {
    /// Reads block `index` into `buf`.
    fn read_block(&self, index: usize, buf: &mut Block) -> Result<()>;

    /// Writes `buf` to block `index`.
    fn write_block(&mut self, index: usize, buf: &Block) -> Result<()>;

    /// Persists every write made so far.
    fn flush(&mut self) -> Result<()>;

    /// Flushes and releases the active handle; later calls fail with
    /// [FsError::DeviceNotOpen] until the device is opened again.
    fn close(&mut self) -> Result<()>;

    /// Returns the number of blocks on the device.
    fn block_count(&self) -> usize {
        DISK_BLOCKS
    }

    /// Reads block `index` into a new buffer.
    fn read(&self, index: usize) -> Result<Block> {
        let mut block = Block::zeroed();
        self.read_block(index, &mut block)?;
        Ok(block)
    }
}

fn check_index<D: BlockDevice + ?Sized>(device: &D, index: usize) -> Result<()> {
    if index >= device.block_count() {
        return Err(FsError::OutOfRange(index));
    }
    Ok(())
}

/// a volume image on the host file system, accessed through a memory map
#[derive(Debug, Default)]
pub struct ImageDisk {
    image_file_handle: Option<MmapMut>,
    path: Option<PathBuf>,
}

impl ImageDisk {
    /// create a zero filled image of `DISK_BLOCKS * BLOCK_SIZE` bytes,
    /// truncating any file already at `image_path`
    pub fn create<P>(image_path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(image_path.as_ref())?;
        // all the content is set to zero by `set_len`
        file.set_len(fs_size_calculator::image_size())?;
        file.sync_all()?;
        debug!("created image {:?}", image_path.as_ref());
        Ok(())
    }

    /// a device with no image open yet
    pub fn new() -> Self {
        Self::default()
    }

    /// shorthand for [ImageDisk::new] followed by [ImageDisk::open]
    pub fn open_image<P>(image_path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut disk = Self::new();
        disk.open(image_path)?;
        Ok(disk)
    }

    /// open the image at `image_path` for read and write
    pub fn open<P>(&mut self, image_path: P) -> Result<()>
    where
        P: AsRef<Path>,
    {
        if self.image_file_handle.is_some() {
            return Err(FsError::DeviceAlreadyOpen);
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_path.as_ref())?;
        let actual = file.metadata()?.len();
        let expected = fs_size_calculator::image_size();
        if actual != expected {
            return Err(FsError::ImageSize { expected, actual });
        }

        // Safety
        // The map is private to this device and the file is not resized while
        // it is mapped; two processes mapping the same image is unsupported.
        let image_file_mmap = unsafe { MmapMut::map_mut(&file)? };
        self.image_file_handle = Some(image_file_mmap);
        self.path = Some(image_path.as_ref().to_path_buf());
        debug!("opened image {:?}", image_path.as_ref());
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.image_file_handle.is_some()
    }

    /// the image currently or most recently opened
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn image_file_mmap(&self) -> Result<&MmapMut> {
        self.image_file_handle.as_ref().ok_or(FsError::DeviceNotOpen)
    }

    fn image_file_mmap_mut(&mut self) -> Result<&mut MmapMut> {
        self.image_file_handle.as_mut().ok_or(FsError::DeviceNotOpen)
    }
}

impl BlockDevice for ImageDisk {
    fn read_block(&self, index: usize, buf: &mut Block) -> Result<()> {
        check_index(self, index)?;
        let image = self.image_file_mmap()?;
        let start = index * BLOCK_SIZE;
        buf.copy_from_slice(&image[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&mut self, index: usize, buf: &Block) -> Result<()> {
        check_index(&*self, index)?;
        let image = self.image_file_mmap_mut()?;
        let start = index * BLOCK_SIZE;
        image[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.image_file_mmap_mut()?.flush()?)
    }

    fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.image_file_handle = None;
        debug!("closed image {:?}", self.path);
        Ok(())
    }
}

/// a sparse in-memory device, blocks never written read back as zeros
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    blocks: BTreeMap<usize, Block>,
    open: bool,
}

impl MemoryDisk {
    /// an all zero device, already open
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            open: true,
        }
    }

    /// reopen after [BlockDevice::close]; the contents are kept
    pub fn open(&mut self) -> Result<()> {
        if self.open {
            return Err(FsError::DeviceAlreadyOpen);
        }
        self.open = true;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn check_open(&self) -> Result<()> {
        if !self.open {
            return Err(FsError::DeviceNotOpen);
        }
        Ok(())
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice for MemoryDisk {
    fn read_block(&self, index: usize, buf: &mut Block) -> Result<()> {
        self.check_open()?;
        check_index(self, index)?;
        match self.blocks.get(&index) {
            Some(block) => buf.copy_from_slice(block),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_block(&mut self, index: usize, buf: &Block) -> Result<()> {
        self.check_open()?;
        check_index(&*self, index)?;
        self.blocks.insert(index, buf.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        // nothing is buffered
        self.check_open()
    }

    fn close(&mut self) -> Result<()> {
        self.check_open()?;
        self.open = false;
        Ok(())
    }
}
