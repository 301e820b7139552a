use thiserror::Error;

/// everything that can go wrong inside a volume or its block device
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FsError {
    #[error("the device does not carry a filesystem signature")]
    NotFormatted,
    #[error("corrupt superblock: {0}")]
    CorruptSuperblock(String),
    #[error("corrupt metadata table: {0}")]
    CorruptTable(String),
    #[error("{field} = {value} does not fit in {width} digits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        width: usize,
    },

    #[error("file {0:?} already exists")]
    AlreadyExists(String),
    #[error("file {0:?} not found")]
    NotFound(String),
    #[error("file name {0:?} is longer than {max} bytes", max = super::MAX_FILENAME_LEN - 1)]
    NameTooLong(String),
    #[error("invalid file name {0:?}")]
    InvalidName(String),
    #[error("the volume already holds {} files", super::MAX_FILE_LIMIT)]
    TooManyFiles,
    #[error("{} files are already open", super::MAX_FILE_DESC)]
    TooManyOpenFiles,
    #[error("file descriptor {0} is not open")]
    InvalidDescriptor(usize),
    #[error("offset {offset} is outside the file (size {file_size})")]
    InvalidOffset { offset: i64, file_size: u64 },
    #[error("file {0:?} is still open")]
    FileOpen(String),
    #[error("no room for {blocks} more contiguous block(s)")]
    NoSpace { blocks: usize },

    #[error("block {0} is out of range")]
    OutOfRange(usize),
    #[error("the block device is not open")]
    DeviceNotOpen,
    #[error("the block device is already open")]
    DeviceAlreadyOpen,
    #[error("image is {actual} bytes, expected {expected}")]
    ImageSize { expected: u64, actual: u64 },
    #[error("block buffer is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("device I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// user-operation errors leave the volume intact; the caller may retry or choose another action
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FsError::AlreadyExists(_)
                | FsError::NotFound(_)
                | FsError::NameTooLong(_)
                | FsError::InvalidName(_)
                | FsError::TooManyFiles
                | FsError::TooManyOpenFiles
                | FsError::InvalidDescriptor(_)
                | FsError::InvalidOffset { .. }
                | FsError::FileOpen(_)
                | FsError::NoSpace { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
