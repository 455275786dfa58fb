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

//! Directories: ordered sequences of 32-byte entries spread across a chain
//! of blocks and terminated by an end marker in the last used slot. A
//! cursor walks slot by slot and follows the chain at block boundaries;
//! insertion writes over the end marker and re-seats it one slot further,
//! deletion swaps the last entry into the hole so directories stay dense.

use log::error;
use zerocopy::{
    little_endian::U32,
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout,
};

use fatbox_ds::{DIR_ENTRY_SIZE, FAT_EOF, ROOT_DIR_BLOCK};
use fatbox_err::{FatError, Result};

use crate::{file::FILE_HEADER_SIZE, path, FatFs, MAX_FILENAME_LENGTH};

pub(crate) const KIND_END: u8 = 0;
pub(crate) const KIND_FILE: u8 = 1;
pub(crate) const KIND_DIRECTORY: u8 = 2;

/// One slot of a directory chain, as stored on disk.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub(crate) struct RawDirEntry {
    name: [u8; MAX_FILENAME_LENGTH],
    kind: u8,
    first_block: U32,
}

impl RawDirEntry {
    fn new(name: &str, kind: u8, first_block: u32) -> Self {
        let mut entry = Self::new_zeroed();
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        entry.kind = kind;
        entry.first_block = U32::new(first_block);
        entry
    }

    pub(crate) fn kind(&self) -> u8 {
        self.kind
    }

    pub(crate) fn first_block(&self) -> u32 {
        self.first_block.get()
    }

    fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(self.name.len());
        &self.name[..end]
    }

    fn name_matches(&self, name: &str) -> bool {
        self.name_bytes() == name.as_bytes()
    }
}

/// What a directory entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryType {
    File,
    Directory,
}

impl DirEntryType {
    pub(crate) fn as_kind(self) -> u8 {
        match self {
            Self::File => KIND_FILE,
            Self::Directory => KIND_DIRECTORY,
        }
    }

    pub(crate) fn from_kind(kind: u8) -> Result<Self> {
        match kind {
            KIND_FILE => Ok(Self::File),
            KIND_DIRECTORY => Ok(Self::Directory),
            _ => {
                error!("Directory entry has kind byte {kind}");
                Err(FatError::FatBufferError)
            }
        }
    }
}

/// An entry as handed to callers: a copy, never a view into the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: DirEntryType,
    pub first_block: u32,
}

impl DirEntry {
    fn from_raw(raw: &RawDirEntry) -> Result<Self> {
        Ok(Self {
            name: String::from_utf8_lossy(raw.name_bytes()).into_owned(),
            kind: DirEntryType::from_kind(raw.kind)?,
            first_block: raw.first_block.get(),
        })
    }
}

/// Cursor over a directory: the block the cursor is in and how many
/// entries it has yielded. Holding indices instead of pointers keeps a
/// handle valid across the compaction a deletion performs.
#[derive(Debug, Clone)]
pub struct DirHandle {
    pub(crate) block: u32,
    pub(crate) count: u32,
}

impl DirHandle {
    pub(crate) fn new(block: u32) -> Self {
        Self { block, count: 0 }
    }
}

/// Position of one entry slot inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntrySlot {
    pub(crate) block: u32,
    pub(crate) index: u32,
}

impl FatFs {
    pub(crate) fn entry_at(&self, slot: EntrySlot) -> RawDirEntry {
        let offset = slot.index as usize * DIR_ENTRY_SIZE;
        RawDirEntry::read_from_bytes(&self.image.block(slot.block)[offset..offset + DIR_ENTRY_SIZE])
            .unwrap()
    }

    pub(crate) fn set_entry(&mut self, slot: EntrySlot, entry: &RawDirEntry) {
        let offset = slot.index as usize * DIR_ENTRY_SIZE;
        self.image.block_mut(slot.block)[offset..offset + DIR_ENTRY_SIZE]
            .copy_from_slice(entry.as_bytes());
    }

    /// Yields the slot under the cursor and advances. `EndOfDir` at the
    /// end marker; a full block without a successor is a structural error.
    pub(crate) fn dir_next(&self, dir: &mut DirHandle) -> Result<(EntrySlot, RawDirEntry)> {
        let entries_per_block = self.image.entries_per_block() as u32;
        let slot = EntrySlot {
            block: dir.block,
            index: dir.count % entries_per_block,
        };
        let entry = self.entry_at(slot);
        if entry.kind == KIND_END {
            return Err(FatError::EndOfDir);
        }

        dir.count += 1;
        if dir.count % entries_per_block == 0 {
            let next = self.fat_next(dir.block);
            if next == FAT_EOF {
                error!("Directory block {} is full and has no successor", dir.block);
                return Err(FatError::DirEndNotFound);
            }
            dir.block = next as u32;
        }

        Ok((slot, entry))
    }

    /// Finds the entry named `name`, or `FileNotFound`.
    pub(crate) fn dir_lookup(&self, dir_block: u32, name: &str) -> Result<(EntrySlot, RawDirEntry)> {
        let mut dir = DirHandle::new(dir_block);
        loop {
            match self.dir_next(&mut dir) {
                Ok((slot, entry)) if entry.name_matches(name) => return Ok((slot, entry)),
                Ok(_) => {}
                Err(FatError::EndOfDir) => return Err(FatError::FileNotFound),
                Err(err) => return Err(err),
            }
        }
    }

    /// Walks a canonical absolute path down from the root to the first
    /// block of the directory it names.
    pub(crate) fn dir_first_block(&self, absolute_path: &str) -> Result<u32> {
        let mut block = ROOT_DIR_BLOCK;
        for segment in absolute_path.split('/').filter(|s| !s.is_empty()) {
            let (_, entry) = self.dir_lookup(block, segment)?;
            if entry.kind != KIND_DIRECTORY {
                return Err(FatError::NotADirectory);
            }
            block = entry.first_block.get();
        }
        Ok(block)
    }

    /// Appends an entry to a directory.
    ///
    /// With `child` given (move, copy) the entry adopts that block;
    /// otherwise a fresh zeroed block is allocated for it. The entry is
    /// written over the end marker, and a new marker lands in the next
    /// slot, extending the chain by one block when the marker crosses into
    /// a block that does not exist yet. If that extension fails the child
    /// allocation is rolled back.
    pub(crate) fn dir_insert(
        &mut self,
        dir_block: u32,
        child: Option<u32>,
        kind: DirEntryType,
        name: &str,
    ) -> Result<u32> {
        if name.len() >= MAX_FILENAME_LENGTH {
            return Err(FatError::InvalidPath);
        }

        let entries_per_block = self.image.entries_per_block() as u32;
        let mut dir = DirHandle::new(dir_block);
        let slot = loop {
            match self.dir_next(&mut dir) {
                Ok((_, entry)) => {
                    if entry.name_matches(name) {
                        return Err(FatError::FileAlreadyExists);
                    }
                }
                Err(FatError::EndOfDir) => {
                    break EntrySlot {
                        block: dir.block,
                        index: dir.count % entries_per_block,
                    }
                }
                Err(err) => return Err(err),
            }
        };

        let (child_block, owns_child) = match child {
            Some(block) => (block, false),
            None => (self.alloc_block()?, true),
        };

        let marker_slot = if slot.index + 1 < entries_per_block {
            EntrySlot {
                block: slot.block,
                index: slot.index + 1,
            }
        } else {
            let next = self.fat_next(slot.block);
            let next_block = if next == FAT_EOF {
                match self.alloc_block() {
                    Ok(block) => {
                        self.fat_set_next(slot.block, block as i32);
                        block
                    }
                    Err(err) => {
                        if owns_child {
                            self.free_block(child_block);
                        }
                        return Err(err);
                    }
                }
            } else {
                next as u32
            };
            EntrySlot {
                block: next_block,
                index: 0,
            }
        };

        self.set_entry(slot, &RawDirEntry::new(name, kind.as_kind(), child_block));
        self.set_entry(marker_slot, &RawDirEntry::new_zeroed());

        Ok(child_block)
    }

    /// Removes the entry named `name` and returns its first block.
    ///
    /// The final entry is swapped into the hole and its old slot becomes
    /// the new end marker, so entry order is not preserved. When the new
    /// marker fills the last slot of its block, the chain's now-empty tail
    /// block is released.
    pub(crate) fn dir_delete(
        &mut self,
        dir_block: u32,
        expected: Option<DirEntryType>,
        name: &str,
    ) -> Result<u32> {
        let (slot, entry) = self.dir_lookup(dir_block, name)?;
        match (expected, entry.kind) {
            (Some(DirEntryType::File), KIND_DIRECTORY) => return Err(FatError::NotAFile),
            (Some(DirEntryType::Directory), KIND_FILE) => return Err(FatError::NotADirectory),
            _ => {}
        }
        let child_block = entry.first_block.get();

        let mut dir = DirHandle::new(dir_block);
        let mut final_slot = slot;
        loop {
            match self.dir_next(&mut dir) {
                Ok((current, _)) => final_slot = current,
                Err(FatError::EndOfDir) => break,
                Err(err) => return Err(err),
            }
        }

        if final_slot != slot {
            let final_entry = self.entry_at(final_slot);
            self.set_entry(slot, &final_entry);
        }
        self.set_entry(final_slot, &RawDirEntry::new_zeroed());

        let entries_per_block = self.image.entries_per_block() as u32;
        if (final_slot.index + 1) % entries_per_block == 0 {
            let tail = self.fat_next(final_slot.block);
            if tail != FAT_EOF {
                self.free_block(tail as u32);
                self.fat_set_next(final_slot.block, FAT_EOF);
            }
        }

        Ok(child_block)
    }

    /// Payload bytes and occupied blocks of a file or directory tree. A
    /// directory counts its children plus its own entry chain.
    pub(crate) fn recursive_size(&self, block: u32, kind: u8) -> Result<(u64, u64)> {
        let block_size = self.image.block_size() as u64;
        if kind == KIND_FILE {
            let size = self.file_header_at(block).size() as u64;
            return Ok((size, (size + FILE_HEADER_SIZE as u64).div_ceil(block_size)));
        }

        let mut total_bytes = 0;
        let mut total_blocks = 0;
        let mut dir = DirHandle::new(block);
        loop {
            match self.dir_next(&mut dir) {
                Ok((_, entry)) => {
                    let (bytes, blocks) =
                        self.recursive_size(entry.first_block.get(), entry.kind)?;
                    total_bytes += bytes;
                    total_blocks += blocks;
                }
                Err(FatError::EndOfDir) => break,
                Err(err) => return Err(err),
            }
        }

        let slots = dir.count as u64 + 1;
        total_bytes += slots * DIR_ENTRY_SIZE as u64;
        total_blocks += slots.div_ceil(self.image.entries_per_block() as u64);
        Ok((total_bytes, total_blocks))
    }

    /// Depth-first release of everything below a directory. The directory's
    /// own chain stays; callers unlink it themselves.
    pub(crate) fn recursive_erase(&mut self, dir_block: u32) -> Result<()> {
        let mut dir = DirHandle::new(dir_block);
        loop {
            match self.dir_next(&mut dir) {
                Ok((_, entry)) => {
                    if entry.kind == KIND_DIRECTORY {
                        self.recursive_erase(entry.first_block.get())?;
                    }
                    self.fat_unlink(entry.first_block.get() as i32);
                }
                Err(FatError::EndOfDir) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Clones a chain into freshly allocated blocks; for a directory the
    /// children are cloned too and the copied entries re-pointed at the
    /// new subtrees.
    pub(crate) fn recursive_copy(&mut self, src_block: u32, kind: u8) -> Result<u32> {
        let copy_block = self.alloc_block()?;
        let mut src = src_block;
        let mut dst = copy_block;
        loop {
            let data = self.image.block(src).to_vec();
            self.image.block_mut(dst).copy_from_slice(&data);

            let next = self.fat_next(src);
            if next == FAT_EOF {
                break;
            }
            let fresh = self.alloc_block()?;
            self.fat_set_next(dst, fresh as i32);
            src = next as u32;
            dst = fresh;
        }

        if kind != KIND_DIRECTORY {
            return Ok(copy_block);
        }

        let mut src_dir = DirHandle::new(src_block);
        let mut copy_dir = DirHandle::new(copy_block);
        loop {
            match self.dir_next(&mut src_dir) {
                Ok((_, entry)) => {
                    let (copy_slot, _) = self.dir_next(&mut copy_dir)?;
                    let child = self.recursive_copy(entry.first_block.get(), entry.kind)?;
                    let mut copied = self.entry_at(copy_slot);
                    copied.first_block = U32::new(child);
                    self.set_entry(copy_slot, &copied);
                }
                Err(FatError::EndOfDir) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(copy_block)
    }

    /// Creates an empty directory at `path`.
    pub fn dir_create(&mut self, path: &str) -> Result<()> {
        let (dir_path, name) = path::components(self.current_directory(), path)?;
        let parent = self.dir_first_block(&dir_path)?;
        self.dir_insert(parent, None, DirEntryType::Directory, &name)?;
        Ok(())
    }

    /// Erases a directory and everything below it. Erasing `/` empties the
    /// root instead of removing it.
    pub fn dir_erase(&mut self, path: &str) -> Result<()> {
        let absolute = path::absolute(self.current_directory(), path)?;
        if absolute == "/" {
            self.recursive_erase(ROOT_DIR_BLOCK)?;
            self.fat_unlink(ROOT_DIR_BLOCK as i32);
            self.bitmap_set(ROOT_DIR_BLOCK, true);
            self.image.block_mut(ROOT_DIR_BLOCK).fill(0);
            return Ok(());
        }

        let (dir_path, name) = path::components(self.current_directory(), &absolute)?;
        let dir_block = self.dir_first_block(&dir_path)?;
        let child = self.dir_delete(dir_block, Some(DirEntryType::Directory), &name)?;
        self.recursive_erase(child)?;
        self.fat_unlink(child as i32);
        Ok(())
    }

    /// Opens a directory for listing.
    pub fn dir_open(&self, path: &str) -> Result<DirHandle> {
        let absolute = path::absolute(self.current_directory(), path)?;
        Ok(DirHandle::new(self.dir_first_block(&absolute)?))
    }

    /// Copies out the entry under the cursor and advances. `EndOfDir` when
    /// the directory is exhausted.
    pub fn dir_list(&self, dir: &mut DirHandle) -> Result<DirEntry> {
        let (_, entry) = self.dir_next(dir)?;
        DirEntry::from_raw(&entry)
    }

    /// Changes the current directory.
    pub fn dir_change(&mut self, path: &str) -> Result<()> {
        let absolute = path::absolute(self.current_directory(), path)?;
        self.dir_first_block(&absolute)?;
        self.set_current_directory(absolute);
        Ok(())
    }
}
