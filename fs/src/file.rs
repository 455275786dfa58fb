// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Files: a chain of blocks whose first block starts with a small header
//! (payload size and two date stamps), followed by the payload. A handle
//! is a cursor over the chain; reads and writes stream across block
//! boundaries, and writes grow or shrink the chain on the way.

use log::error;
use zerocopy::{
    little_endian::U32,
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

use fatbox_ds::{FAT_EOF, ROOT_DIR_BLOCK};
use fatbox_err::{FatError, Result};

use crate::{
    clock::DateTime,
    dir::{DirEntryType, KIND_DIRECTORY, KIND_FILE},
    path, FatFs,
};

pub(crate) const FILE_HEADER_SIZE: usize = 16;

/// Prefix of a file's first block.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub(crate) struct FileHeader {
    size: U32,
    date_created: DateTime,
    date_modified: DateTime,
}

impl FileHeader {
    fn new(now: DateTime) -> Self {
        Self {
            size: U32::new(0),
            date_created: now,
            date_modified: now,
        }
    }

    pub(crate) fn size(&self) -> u32 {
        self.size.get()
    }

    pub(crate) fn date_created(&self) -> DateTime {
        self.date_created
    }

    pub(crate) fn date_modified(&self) -> DateTime {
        self.date_modified
    }
}

/// Open flags, parsed once from the mode string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
}

impl OpenMode {
    /// Parses a string of single-character flags: `r`ead, `w`rite,
    /// `a`ppend (which implies write) and `+` (create if missing). Order
    /// is irrelevant and duplicates are idempotent; anything else is
    /// rejected, as is an empty string.
    pub fn parse(mode: &str) -> Result<Self> {
        if mode.is_empty() {
            return Err(FatError::FileOpenInvalidArgument);
        }
        let mut flags = Self::default();
        for flag in mode.chars() {
            match flag {
                'r' => flags.read = true,
                'w' => flags.write = true,
                'a' => {
                    flags.append = true;
                    flags.write = true;
                }
                '+' => flags.create = true,
                _ => return Err(FatError::FileOpenInvalidArgument),
            }
        }
        Ok(flags)
    }
}

/// Reference point of a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekWhence {
    Set,
    Cur,
    End,
}

/// Cursor over an open file: block indices and offsets only, never
/// pointers into the image.
///
/// `block_offset` normally stays below the block size; the one exception
/// is a cursor at the end of a file whose last block is exactly full,
/// which parks at `block_offset == block_size` on that block until the
/// next write allocates a successor.
#[derive(Debug, Clone)]
pub struct FileHandle {
    first_block: u32,
    current_block: u32,
    block_offset: usize,
    file_offset: usize,
    can_read: bool,
    can_write: bool,
}

impl FileHandle {
    pub fn offset(&self) -> usize {
        self.file_offset
    }

    pub fn can_read(&self) -> bool {
        self.can_read
    }

    pub fn can_write(&self) -> bool {
        self.can_write
    }
}

impl FatFs {
    pub(crate) fn file_header_at(&self, block: u32) -> FileHeader {
        FileHeader::read_from_bytes(&self.image.block(block)[..FILE_HEADER_SIZE]).unwrap()
    }

    pub(crate) fn set_file_header(&mut self, block: u32, header: &FileHeader) {
        self.image.block_mut(block)[..FILE_HEADER_SIZE].copy_from_slice(header.as_bytes());
    }

    /// Creates an empty file at `path` with both date stamps set to now.
    pub fn file_create(&mut self, path: &str) -> Result<()> {
        let (dir_path, name) = path::components(self.current_directory(), path)?;
        let parent = self.dir_first_block(&dir_path)?;
        let block = self.dir_insert(parent, None, DirEntryType::File, &name)?;
        let now = self.now();
        self.set_file_header(block, &FileHeader::new(now));
        Ok(())
    }

    /// Removes a file and releases its chain.
    pub fn file_erase(&mut self, path: &str) -> Result<()> {
        let (dir_path, name) = path::components(self.current_directory(), path)?;
        let dir_block = self.dir_first_block(&dir_path)?;
        let child = self.dir_delete(dir_block, Some(DirEntryType::File), &name)?;
        self.fat_unlink(child as i32);
        Ok(())
    }

    fn file_open_by_block(&self, block: u32) -> Result<FileHandle> {
        if block as usize >= self.image.blocks_count() {
            return Err(FatError::InvalidBlock);
        }
        Ok(FileHandle {
            first_block: block,
            current_block: block,
            block_offset: FILE_HEADER_SIZE,
            file_offset: 0,
            can_read: false,
            can_write: false,
        })
    }

    /// Opens a file. A missing file is created when the mode carries `+`;
    /// `a` starts the cursor at the end of the file.
    pub fn file_open(&mut self, path: &str, mode: &str) -> Result<FileHandle> {
        let mode = OpenMode::parse(mode)?;
        let (dir_path, name) = path::components(self.current_directory(), path)?;
        let dir_block = self.dir_first_block(&dir_path)?;

        let entry = match self.dir_lookup(dir_block, &name) {
            Ok((_, entry)) => entry,
            Err(FatError::FileNotFound) if mode.create => {
                self.file_create(path)?;
                let (_, entry) = self.dir_lookup(dir_block, &name)?;
                entry
            }
            Err(err) => return Err(err),
        };
        if entry.kind() != KIND_FILE {
            return Err(FatError::NotAFile);
        }

        let mut handle = self.file_open_by_block(entry.first_block())?;
        handle.can_read = mode.read;
        handle.can_write = mode.write;
        if mode.append {
            self.file_seek(&mut handle, 0, SeekWhence::End)?;
        }
        Ok(handle)
    }

    /// Reads up to `buffer.len()` bytes from the cursor, stopping at the
    /// end of the file. Returns how many bytes landed in `buffer`.
    pub fn file_read(&self, handle: &mut FileHandle, buffer: &mut [u8]) -> Result<usize> {
        let size = self.file_header_at(handle.first_block).size() as usize;
        let block_size = self.image.block_size();
        let mut remaining = buffer.len().min(size.saturating_sub(handle.file_offset));

        let mut read = 0;
        while remaining > 0 {
            if handle.block_offset == block_size {
                let next = self.fat_next(handle.current_block);
                if next == FAT_EOF {
                    break;
                }
                handle.current_block = next as u32;
                handle.block_offset = 0;
            }
            let take = remaining.min(block_size - handle.block_offset);
            let offset = handle.block_offset;
            buffer[read..read + take]
                .copy_from_slice(&self.image.block(handle.current_block)[offset..offset + take]);
            read += take;
            remaining -= take;
            handle.file_offset += take;
            handle.block_offset += take;
        }
        Ok(read)
    }

    /// Writes `data` at the cursor, extending the file when the write runs
    /// past its end. Returns how many bytes were written.
    ///
    /// When the allocator runs dry while the chain grows, the call fails
    /// with `NoFreeBlocks` and blocks linked so far stay linked; the image
    /// remains consistent and the recorded size is untouched.
    pub fn file_write(&mut self, handle: &mut FileHandle, data: &[u8]) -> Result<usize> {
        if !handle.can_write {
            return Err(FatError::WriteInvalidArgument);
        }

        let mut header = self.file_header_at(handle.first_block);
        let new_size = (header.size() as usize).max(handle.file_offset + data.len());
        self.resize_chain(handle.first_block, new_size)?;

        let block_size = self.image.block_size();
        let mut written = 0;
        while written < data.len() {
            if handle.block_offset == block_size {
                let next = self.fat_next(handle.current_block);
                if next == FAT_EOF {
                    error!("File chain ends before offset {}", handle.file_offset);
                    return Err(FatError::FatBufferError);
                }
                handle.current_block = next as u32;
                handle.block_offset = 0;
            }
            let take = (data.len() - written).min(block_size - handle.block_offset);
            let offset = handle.block_offset;
            self.image.block_mut(handle.current_block)[offset..offset + take]
                .copy_from_slice(&data[written..written + take]);
            written += take;
            handle.file_offset += take;
            handle.block_offset += take;
        }

        header.size = U32::new(new_size as u32);
        header.date_modified = self.now();
        self.set_file_header(handle.first_block, &header);
        Ok(written)
    }

    /// Grows or shrinks a file's chain to hold `new_size` payload bytes
    /// plus the header. Growth happens at the tail; shrinking unlinks the
    /// suffix past the needed length.
    fn resize_chain(&mut self, first_block: u32, new_size: usize) -> Result<()> {
        let block_size = self.image.block_size();
        let blocks_needed = (FILE_HEADER_SIZE + new_size).div_ceil(block_size).max(1);

        let mut block = first_block;
        for _ in 1..blocks_needed {
            let next = self.fat_next(block);
            block = if next == FAT_EOF {
                let fresh = self.alloc_block()?;
                self.fat_set_next(block, fresh as i32);
                fresh
            } else {
                next as u32
            };
        }

        let tail = self.fat_next(block);
        self.fat_set_next(block, FAT_EOF);
        self.fat_unlink(tail);
        Ok(())
    }

    /// Moves the cursor. The target must land inside `[0, size]`; the
    /// block cursor is recomputed by walking the chain from the start.
    pub fn file_seek(&self, handle: &mut FileHandle, offset: i64, whence: SeekWhence) -> Result<()> {
        let size = self.file_header_at(handle.first_block).size() as i64;
        let target = match whence {
            SeekWhence::Set => offset,
            SeekWhence::Cur => handle.file_offset as i64 + offset,
            SeekWhence::End => size - offset,
        };
        if target < 0 || target > size {
            return Err(FatError::SeekInvalidArgument);
        }
        let target = target as usize;

        let block_size = self.image.block_size();
        let linear = FILE_HEADER_SIZE + target;
        let mut hops = linear / block_size;
        let mut block_offset = linear % block_size;
        if block_offset == 0 && target == size as usize {
            // end of file on an exact block boundary: park on the last
            // real block; the next write allocates before storing bytes
            hops -= 1;
            block_offset = block_size;
        }

        let mut block = handle.first_block;
        for _ in 0..hops {
            let next = self.fat_next(block);
            if next == FAT_EOF {
                error!("File chain is shorter than its recorded size");
                return Err(FatError::SeekInvalidArgument);
            }
            block = next as u32;
        }

        handle.current_block = block;
        handle.block_offset = block_offset;
        handle.file_offset = target;
        Ok(())
    }

    /// Moves or renames a file or directory. No data is copied: the
    /// destination entry adopts the source's first block.
    pub fn file_move(&mut self, source: &str, dest: &str) -> Result<()> {
        let plan = self.transfer_plan(source, dest)?;
        if plan.src_kind == KIND_DIRECTORY
            && plan.dest_path.starts_with(&format!("{}/", plan.src_path))
        {
            // a directory cannot move below itself
            return Err(FatError::InvalidPath);
        }

        let kind = DirEntryType::from_kind(plan.src_kind)?;
        self.dir_insert(plan.dest_block, Some(plan.src_block), kind, &plan.dest_name)?;
        self.dir_delete(plan.src_dir_block, None, &plan.src_name)?;
        Ok(())
    }

    /// Copies a file or a whole directory tree. Fails up front when the
    /// image cannot hold the clone.
    pub fn file_copy(&mut self, source: &str, dest: &str) -> Result<()> {
        let plan = self.transfer_plan(source, dest)?;
        if self.dir_lookup(plan.dest_block, &plan.dest_name).is_ok() {
            return Err(FatError::FileAlreadyExists);
        }
        let (_, blocks) = self.recursive_size(plan.src_block, plan.src_kind)?;
        if blocks + 1 > self.image.free_blocks() as u64 {
            return Err(FatError::NoFreeBlocks);
        }

        let copy_block = self.recursive_copy(plan.src_block, plan.src_kind)?;
        let kind = DirEntryType::from_kind(plan.src_kind)?;
        self.dir_insert(plan.dest_block, Some(copy_block), kind, &plan.dest_name)?;
        Ok(())
    }

    /// Payload bytes and occupied blocks of the file or directory at
    /// `path`; directories are sized recursively.
    pub fn file_size(&self, path: &str) -> Result<(u64, u64)> {
        let absolute = path::absolute(self.current_directory(), path)?;
        if absolute == "/" {
            return self.recursive_size(ROOT_DIR_BLOCK, KIND_DIRECTORY);
        }
        let (dir_path, name) = path::components(self.current_directory(), &absolute)?;
        let dir_block = self.dir_first_block(&dir_path)?;
        let (_, entry) = self.dir_lookup(dir_block, &name)?;
        self.recursive_size(entry.first_block(), entry.kind())
    }

    /// Everything move and copy need to know about their endpoints. The
    /// destination may be an existing directory (the source keeps its
    /// name inside it) or a fresh name in an existing parent; an existing
    /// file is a collision.
    fn transfer_plan(&self, source: &str, dest: &str) -> Result<TransferPlan> {
        let src_path = path::absolute(self.current_directory(), source)?;
        let dest_path = path::absolute(self.current_directory(), dest)?;
        if src_path == dest_path {
            return Err(FatError::SamePath);
        }

        let (src_dir, src_name) = path::components(self.current_directory(), &src_path)?;
        let src_dir_block = self.dir_first_block(&src_dir)?;
        let (_, src_entry) = self.dir_lookup(src_dir_block, &src_name)?;

        let (dest_block, dest_name) = if dest_path == "/" {
            (ROOT_DIR_BLOCK, src_name.clone())
        } else {
            let (dest_dir, dest_leaf) = path::components(self.current_directory(), &dest_path)?;
            let dest_dir_block = self.dir_first_block(&dest_dir)?;
            match self.dir_lookup(dest_dir_block, &dest_leaf) {
                Ok((_, entry)) => {
                    if entry.kind() == KIND_FILE {
                        return Err(FatError::FileAlreadyExists);
                    }
                    (entry.first_block(), src_name.clone())
                }
                Err(FatError::FileNotFound) => (dest_dir_block, dest_leaf),
                Err(err) => return Err(err),
            }
        };

        Ok(TransferPlan {
            src_kind: src_entry.kind(),
            src_block: src_entry.first_block(),
            src_dir_block,
            src_name,
            src_path,
            dest_block,
            dest_name,
            dest_path,
        })
    }
}

struct TransferPlan {
    src_kind: u8,
    src_block: u32,
    src_dir_block: u32,
    src_name: String,
    src_path: String,
    dest_block: u32,
    dest_name: String,
    dest_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{assert_free_blocks_consistent, open_fs},
        Clock,
    };

    struct FixedClock(DateTime);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime {
            self.0
        }
    }

    fn read_all(fs: &FatFs, handle: &mut FileHandle) -> Vec<u8> {
        let mut data = Vec::new();
        let mut chunk = [0u8; 7];
        loop {
            let read = fs.file_read(handle, &mut chunk).unwrap();
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
        }
        data
    }

    #[test]
    fn mode_parsing_is_order_insensitive_and_idempotent() {
        let mode = OpenMode::parse("+wr").unwrap();
        assert!(mode.read && mode.write && mode.create && !mode.append);
        assert_eq!(OpenMode::parse("rr").unwrap(), OpenMode::parse("r").unwrap());

        let append = OpenMode::parse("a").unwrap();
        assert!(append.write && append.append);

        assert_eq!(OpenMode::parse(""), Err(FatError::FileOpenInvalidArgument));
        assert_eq!(OpenMode::parse("rx"), Err(FatError::FileOpenInvalidArgument));
    }

    #[test]
    fn open_honors_the_create_flag() {
        let (_dir, mut fs) = open_fs(32, 32);
        assert_eq!(fs.file_open("/f", "r").unwrap_err(), FatError::FileNotFound);

        fs.file_open("/f", "w+").unwrap();
        let handle = fs.file_open("/f", "r").unwrap();
        assert!(handle.can_read() && !handle.can_write());
    }

    #[test]
    fn open_rejects_directories() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.dir_create("/d").unwrap();
        assert_eq!(fs.file_open("/d", "r").unwrap_err(), FatError::NotAFile);
    }

    #[test]
    fn write_then_read_round_trips_across_blocks() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.file_create("/f").unwrap();
        let mut handle = fs.file_open("/f", "w+").unwrap();

        let data = b"123456789ABCDEFGH012345678abcdefgh";
        assert_eq!(fs.file_write(&mut handle, data).unwrap(), 34);
        assert_eq!(fs.file_size("/f").unwrap(), (34, 2));

        fs.file_seek(&mut handle, 0, SeekWhence::Set).unwrap();
        let mut back = [0u8; 34];
        // the handle has no read flag, but reading is not gated on it
        assert_eq!(fs.file_read(&mut handle, &mut back).unwrap(), 34);
        assert_eq!(&back, data);
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn read_stops_at_the_end_of_the_file() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, b"abc").unwrap();

        fs.file_seek(&mut handle, 0, SeekWhence::Set).unwrap();
        let mut buffer = [0u8; 16];
        assert_eq!(fs.file_read(&mut handle, &mut buffer).unwrap(), 3);
        assert_eq!(&buffer[..3], b"abc");
        assert_eq!(fs.file_read(&mut handle, &mut buffer).unwrap(), 0);
    }

    #[test]
    fn a_full_first_block_takes_one_block_and_one_byte_more_takes_two() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        let before = fs.free_blocks();

        // exactly block_size - header bytes fit the first block
        fs.file_write(&mut handle, &[0x41; 16]).unwrap();
        assert_eq!(fs.free_blocks(), before);
        assert_eq!(fs.file_size("/f").unwrap(), (16, 1));

        fs.file_write(&mut handle, b"!").unwrap();
        assert_eq!(fs.free_blocks(), before - 1);
        assert_eq!(fs.file_size("/f").unwrap(), (17, 2));
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn overwriting_in_the_middle_keeps_the_tail() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, b"aaaaaaaaaaaaaaaaaaaa").unwrap();

        fs.file_seek(&mut handle, 4, SeekWhence::Set).unwrap();
        assert_eq!(fs.file_write(&mut handle, b"BB").unwrap(), 2);
        assert_eq!(handle.offset(), 6);

        fs.file_seek(&mut handle, 0, SeekWhence::Set).unwrap();
        assert_eq!(read_all(&fs, &mut handle), b"aaaaBBaaaaaaaaaaaaaa");
    }

    #[test]
    fn write_requires_the_write_flag() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.file_create("/f").unwrap();
        let mut handle = fs.file_open("/f", "r").unwrap();
        assert_eq!(
            fs.file_write(&mut handle, b"x").unwrap_err(),
            FatError::WriteInvalidArgument
        );
    }

    #[test]
    fn write_fails_cleanly_when_the_allocator_runs_dry() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        let huge = vec![0x42; 32 * 32];
        assert_eq!(
            fs.file_write(&mut handle, &huge).unwrap_err(),
            FatError::NoFreeBlocks
        );
        // size is untouched and the accounting still holds
        assert_eq!(fs.file_size("/f").unwrap().0, 0);
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn append_mode_starts_at_the_end() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, b"hello ").unwrap();

        let mut appender = fs.file_open("/f", "a").unwrap();
        assert_eq!(appender.offset(), 6);
        fs.file_write(&mut appender, b"world").unwrap();

        fs.file_seek(&mut handle, 0, SeekWhence::Set).unwrap();
        assert_eq!(read_all(&fs, &mut handle), b"hello world");
    }

    #[test]
    fn seek_bounds_are_inclusive_of_the_end() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, b"0123456789").unwrap();

        fs.file_seek(&mut handle, 10, SeekWhence::Set).unwrap();
        assert_eq!(handle.offset(), 10);
        assert_eq!(
            fs.file_seek(&mut handle, 11, SeekWhence::Set).unwrap_err(),
            FatError::SeekInvalidArgument
        );

        fs.file_seek(&mut handle, 10, SeekWhence::End).unwrap();
        assert_eq!(handle.offset(), 0);
        assert_eq!(
            fs.file_seek(&mut handle, 11, SeekWhence::End).unwrap_err(),
            FatError::SeekInvalidArgument
        );
        assert_eq!(
            fs.file_seek(&mut handle, -1, SeekWhence::End).unwrap_err(),
            FatError::SeekInvalidArgument
        );

        fs.file_seek(&mut handle, 4, SeekWhence::Set).unwrap();
        fs.file_seek(&mut handle, -2, SeekWhence::Cur).unwrap();
        assert_eq!(handle.offset(), 2);
        assert_eq!(
            fs.file_seek(&mut handle, -3, SeekWhence::Cur).unwrap_err(),
            FatError::SeekInvalidArgument
        );
    }

    #[test]
    fn a_cursor_at_a_block_boundary_parks_and_the_next_write_extends() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        // fills the first block exactly
        fs.file_write(&mut handle, &[0x61; 16]).unwrap();

        fs.file_seek(&mut handle, 0, SeekWhence::End).unwrap();
        assert_eq!(handle.offset(), 16);

        let before = fs.free_blocks();
        fs.file_write(&mut handle, b"xy").unwrap();
        assert_eq!(fs.free_blocks(), before - 1);

        fs.file_seek(&mut handle, 0, SeekWhence::Set).unwrap();
        let mut expected = vec![0x61; 16];
        expected.extend_from_slice(b"xy");
        assert_eq!(read_all(&fs, &mut handle), expected);
    }

    #[test]
    fn resize_shrinks_a_chain_and_releases_the_suffix() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, &[0x7A; 100]).unwrap();
        let grown = fs.free_blocks();

        fs.resize_chain(handle.first_block, 10).unwrap();
        assert_eq!(fs.free_blocks(), grown + 3);
        assert_eq!(fs.fat_next(handle.first_block), FAT_EOF);
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn erase_returns_the_blocks() {
        let (_dir, mut fs) = open_fs(32, 32);
        let before = fs.free_blocks();
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, &[1; 100]).unwrap();

        fs.file_erase("/f").unwrap();
        assert_eq!(fs.free_blocks(), before);
        assert_eq!(fs.file_open("/f", "r").unwrap_err(), FatError::FileNotFound);
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn erase_rejects_directories() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.dir_create("/d").unwrap();
        assert_eq!(fs.file_erase("/d").unwrap_err(), FatError::NotAFile);
    }

    #[test]
    fn create_stamps_both_dates_and_write_updates_one() {
        let (_dir, mut fs) = open_fs(32, 32);
        let created = DateTime::new(2024, 1, 2, 3, 4, 5);
        fs.set_clock(Box::new(FixedClock(created)));
        fs.file_create("/f").unwrap();

        let mut handle = fs.file_open("/f", "w").unwrap();
        let modified = DateTime::new(2025, 6, 7, 8, 9, 10);
        fs.set_clock(Box::new(FixedClock(modified)));
        fs.file_write(&mut handle, b"data").unwrap();

        let header = fs.file_header_at(handle.first_block);
        assert_eq!(header.date_created(), created);
        assert_eq!(header.date_modified(), modified);
    }

    #[test]
    fn move_renames_without_copying() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.dir_create("/dir1").unwrap();
        fs.dir_create("/dir2").unwrap();
        let mut handle = fs.file_open("/dir1/file", "w+").unwrap();
        fs.file_write(&mut handle, b"payload").unwrap();
        let first_block = handle.first_block;
        let free = fs.free_blocks();

        fs.file_move("/dir1/file", "/dir2").unwrap();
        assert_eq!(fs.free_blocks(), free);
        assert_eq!(
            fs.file_open("/dir1/file", "r").unwrap_err(),
            FatError::FileNotFound
        );
        let moved = fs.file_open("/dir2/file", "r").unwrap();
        assert_eq!(moved.first_block, first_block);
    }

    #[test]
    fn move_to_a_fresh_name_renames_in_place() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.file_create("/a").unwrap();
        fs.file_move("/a", "/b").unwrap();
        assert_eq!(fs.file_open("/a", "r").unwrap_err(), FatError::FileNotFound);
        fs.file_open("/b", "r").unwrap();

        // and back again
        fs.file_move("/b", "/a").unwrap();
        fs.file_open("/a", "r").unwrap();
    }

    #[test]
    fn move_collisions_and_degenerate_paths_fail() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.file_create("/a").unwrap();
        fs.file_create("/b").unwrap();
        fs.dir_create("/d").unwrap();

        assert_eq!(fs.file_move("/a", "/a").unwrap_err(), FatError::SamePath);
        assert_eq!(
            fs.file_move("/a", "/b").unwrap_err(),
            FatError::FileAlreadyExists
        );
        assert_eq!(fs.file_move("/", "/d").unwrap_err(), FatError::InvalidPath);
        assert_eq!(fs.file_move("/d", "/d/x").unwrap_err(), FatError::InvalidPath);
    }

    #[test]
    fn copy_duplicates_a_file() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, b"copy me around").unwrap();

        fs.file_copy("/f", "/g").unwrap();
        let mut copy = fs.file_open("/g", "r").unwrap();
        assert_eq!(read_all(&fs, &mut copy), b"copy me around");

        // the original is untouched and distinct
        fs.file_seek(&mut handle, 0, SeekWhence::Set).unwrap();
        assert_eq!(read_all(&fs, &mut handle), b"copy me around");
        assert_ne!(copy.first_block, handle.first_block);
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn copy_a_tree_into_a_directory() {
        let (_dir, mut fs) = open_fs(64, 64);
        fs.dir_create("/src").unwrap();
        let mut handle = fs.file_open("/src/f", "w+").unwrap();
        fs.file_write(&mut handle, b"nested payload").unwrap();
        fs.dir_create("/dst").unwrap();

        fs.file_copy("/src", "/dst").unwrap();
        let mut copy = fs.file_open("/dst/src/f", "r").unwrap();
        assert_eq!(read_all(&fs, &mut copy), b"nested payload");
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn copy_refuses_when_the_clone_cannot_fit() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        // 14 data blocks plus the first; the clone needs more than what
        // remains afterwards
        fs.file_write(&mut handle, &[9; 32 * 14]).unwrap();
        assert_eq!(
            fs.file_copy("/f", "/g").unwrap_err(),
            FatError::NoFreeBlocks
        );
        assert_free_blocks_consistent(&fs);
    }

    #[test]
    fn an_out_of_range_first_block_is_an_invalid_block() {
        let (_dir, mut fs) = open_fs(32, 32);
        fs.file_create("/f").unwrap();
        // point the entry outside the image
        let bogus = (fs.blocks_count() as u32 + 7).to_le_bytes();
        fs.image.block_mut(0)[28..32].copy_from_slice(&bogus);

        assert_eq!(fs.file_open("/f", "r").unwrap_err(), FatError::InvalidBlock);
    }

    #[test]
    fn file_size_of_the_root_counts_the_whole_tree() {
        let (_dir, mut fs) = open_fs(32, 32);
        let mut handle = fs.file_open("/f", "w+").unwrap();
        fs.file_write(&mut handle, &[5; 20]).unwrap();

        let (bytes, blocks) = fs.file_size("/").unwrap();
        // the file's 20 bytes plus two root entry slots
        assert_eq!(bytes, 20 + 64);
        // file spans two blocks, the root chain spans two single-entry
        // blocks
        assert_eq!(blocks, 4);
    }
}
