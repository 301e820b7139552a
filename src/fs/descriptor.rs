use std::fmt;

use super::{FsError, Result, MAX_FILE_DESC};

/// a handle returned by `open`, valid until `close` or unmount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDescriptor(usize);

impl FileDescriptor {
    /// wrap a raw descriptor number, e.g. one a caller stored elsewhere
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// an open file: which allocation entry, and where the next read or write starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub entry: usize,
    pub cursor: u64,
}

/// `MAX_FILE_DESC` descriptor slots, lowest free slot first
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    slots: Vec<Option<OpenFile>>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_FILE_DESC],
        }
    }

    /// open allocation entry `entry` with its cursor at 0
    pub fn open(&mut self, entry: usize) -> Result<FileDescriptor> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::TooManyOpenFiles)?;
        self.slots[index] = Some(OpenFile { entry, cursor: 0 });
        Ok(FileDescriptor(index))
    }

    pub fn close(&mut self, fd: FileDescriptor) -> Result<OpenFile> {
        self.slots
            .get_mut(fd.0)
            .and_then(Option::take)
            .ok_or(FsError::InvalidDescriptor(fd.0))
    }

    pub fn get(&self, fd: FileDescriptor) -> Result<&OpenFile> {
        self.slots
            .get(fd.0)
            .and_then(Option::as_ref)
            .ok_or(FsError::InvalidDescriptor(fd.0))
    }

    pub fn get_mut(&mut self, fd: FileDescriptor) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd.0)
            .and_then(Option::as_mut)
            .ok_or(FsError::InvalidDescriptor(fd.0))
    }

    /// check whether any open descriptor refers to allocation entry `entry`
    pub fn is_referenced(&self, entry: usize) -> bool {
        self.slots.iter().flatten().any(|open| open.entry == entry)
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}
