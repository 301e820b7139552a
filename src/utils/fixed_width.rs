//! zero padded ASCII-decimal fields at named, fixed positions inside a record

use std::ops::Range;

use crate::fs::{FsError, Result};

/// one decimal field of a fixed-width record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub start: usize,
    pub width: usize,
}

impl Field {
    pub const fn new(name: &'static str, start: usize, width: usize) -> Self {
        Self { name, start, width }
    }

    /// the first byte after this field
    pub const fn end(&self) -> usize {
        self.start + self.width
    }

    pub const fn range(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// the largest value that fits
    pub const fn max_value(&self) -> u64 {
        10u64.pow(self.width as u32) - 1
    }

    /// write `value` as zero padded decimal
    ///
    /// # Errors
    /// [FsError::FieldOverflow] if `value` needs more than `width` digits
    pub fn write(&self, record: &mut [u8], value: u64) -> Result<()> {
        if value > self.max_value() {
            return Err(FsError::FieldOverflow {
                field: self.name,
                value,
                width: self.width,
            });
        }
        let text = format!("{value:0width$}", width = self.width);
        record[self.range()].copy_from_slice(text.as_bytes());
        Ok(())
    }

    /// parse the field, `None` unless every byte is an ASCII digit
    pub fn read(&self, record: &[u8]) -> Option<u64> {
        let digits = record.get(self.range())?;
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        std::str::from_utf8(digits).ok()?.parse().ok()
    }
}
