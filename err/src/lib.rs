/// Every way an operation on a fatbox image can go wrong. The set is
/// closed: callers can match exhaustively, and the rendered strings are
/// the ones the command-line driver prints.
///
/// `EndOfDir` is not a failure. Directory iteration returns it when the
/// cursor reaches the end marker, and callers turn it into a normal loop
/// exit. Everything else propagates unchanged.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    #[error("Error with the buffer containing the FAT FS")]
    FatBufferError,
    #[error("Invalid number of blocks")]
    InvalidBlocksCount,
    #[error("Cannot open the FAT buffer file")]
    FatOpenError,
    #[error("Cannot close the FAT buffer file")]
    FatCloseError,
    #[error("Invalid path")]
    InvalidPath,
    #[error("Cannot find the directory end entry in the last block of the directory")]
    DirEndNotFound,
    #[error("Directory end")]
    EndOfDir,
    #[error("No such file or directory")]
    FileNotFound,
    #[error("Not a directory")]
    NotADirectory,
    #[error("Not enough free blocks")]
    NoFreeBlocks,
    #[error("Invalid block size")]
    InvalidBlockSize,
    #[error("File already exists")]
    FileAlreadyExists,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Invalid block")]
    InvalidBlock,
    #[error("Invalid argument for seek")]
    SeekInvalidArgument,
    #[error("Not a file")]
    NotAFile,
    #[error("Invalid argument for write")]
    WriteInvalidArgument,
    #[error("Invalid argument for file open")]
    FileOpenInvalidArgument,
    #[error("Invalid argument for ls")]
    LsInvalidArgument,
    #[error("Same paths")]
    SamePath,
}

pub type Result<T> = core::result::Result<T, FatError>;
