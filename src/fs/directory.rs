use std::fmt;

use crate::utils::traits::FixedWidthRecord;

use super::{FsError, Result, MAX_DIR_LEN, MAX_FILENAME_LEN, MAX_FILE_LIMIT};

/// a validated file name: 1 to `MAX_FILENAME_LEN - 1` bytes, no NUL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName(String);

impl FileName {
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() || name.contains('\0') {
            return Err(FsError::InvalidName(name.to_owned()));
        }
        // leave room for the terminator
        if name.len() >= MAX_FILENAME_LEN {
            return Err(FsError::NameTooLong(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One directory slot, stored as a NUL terminated name.
/// A slot whose first byte is zero is free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySlot {
    pub name: Option<FileName>,
}

impl FixedWidthRecord for DirectorySlot {
    const WIDTH: usize = MAX_FILENAME_LEN;

    fn encode_into(&self, buf: &mut [u8]) -> Result<()> {
        buf.fill(0);
        if let Some(name) = &self.name {
            buf[..name.0.len()].copy_from_slice(name.0.as_bytes());
        }
        Ok(())
    }

    fn decode_from(buf: &[u8]) -> Result<Self> {
        if buf.first().copied().unwrap_or(0) == 0 {
            return Ok(Self::default());
        }
        let len = buf
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| FsError::CorruptTable("directory name is not terminated".into()))?;
        let name = std::str::from_utf8(&buf[..len])
            .map_err(|_| FsError::CorruptTable("directory name is not UTF-8".into()))?;
        Ok(Self {
            name: Some(FileName::new(name)?),
        })
    }
}

/// the flat directory: `MAX_FILE_LIMIT` name slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    slots: Vec<DirectorySlot>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            slots: vec![DirectorySlot::default(); MAX_FILE_LIMIT],
        }
    }

    /// exact match against the stored names
    pub fn find_slot_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.name
                .as_ref()
                .is_some_and(|stored| stored.as_str() == name)
        })
    }

    /// the lowest free slot
    pub fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.name.is_none())
    }

    pub fn name(&self, slot: usize) -> Option<&FileName> {
        self.slots.get(slot)?.name.as_ref()
    }

    /// store `name` in `slot`
    ///
    /// # Errors
    /// [FsError::NameTooLong] or [FsError::InvalidName] if `name` can't be stored in a slot
    pub fn write(&mut self, slot: usize, name: &str) -> Result<()> {
        let name = FileName::new(name)?;
        self.slots[slot].name = Some(name);
        Ok(())
    }

    pub fn clear(&mut self, slot: usize) {
        self.slots[slot].name = None;
    }

    /// (slot, name) of every used slot
    pub fn entries(&self) -> impl Iterator<Item = (usize, &FileName)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.name.as_ref().map(|name| (index, name)))
    }

    /// encode the whole directory region
    pub fn serialize(&self) -> Result<Vec<u8>> {
        DirectorySlot::encode_all(&self.slots, MAX_DIR_LEN)
    }

    /// decode the whole directory region
    pub fn deserialize(region: &[u8]) -> Result<Self> {
        let slots = DirectorySlot::decode_all(region, MAX_FILE_LIMIT)?;
        let directory = Self { slots };
        for (index, name) in directory.entries() {
            if directory.find_slot_by_name(name.as_str()) != Some(index) {
                return Err(FsError::CorruptTable(format!(
                    "name {name:?} appears twice in the directory"
                )));
            }
        }
        Ok(directory)
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
