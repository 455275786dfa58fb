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

//! A FAT-style file system stored in a single host file.
//!
//! An image holds a header, an allocation bitmap, a next-block table and a
//! data region, and is memory-mapped for in-place access. [`FatFs`] owns
//! the open image and exposes the whole operation surface: file
//! create/erase/open/read/write/seek/move/copy and directory
//! create/erase/list/change, all addressed by absolute or
//! current-directory-relative paths.
//!
//! The image is owned by one user at a time; nothing here is thread-safe
//! and nothing suspends. Handles are plain values carrying block indices
//! and cursor state, never pointers into the mapping, so they survive the
//! entry compaction a deletion performs.

use std::path::Path;

pub use fatbox_err::{FatError, Result};

use fatbox_ds::Image;

mod alloc;
mod clock;
mod dir;
mod file;
pub mod path;

pub use clock::{Clock, DateTime, SystemClock};
pub use dir::{DirEntry, DirEntryType, DirHandle};
pub use file::{FileHandle, OpenMode, SeekWhence};

/// Room for a name in a directory entry, terminator included.
pub const MAX_FILENAME_LENGTH: usize = 27;
/// Upper bound on a canonical absolute path.
pub const MAX_PATH_LENGTH: usize = 512;

/// An open image plus the session state of the user driving it.
pub struct FatFs {
    pub(crate) image: Image,
    current_directory: String,
    clock: Box<dyn Clock>,
}

impl FatFs {
    /// Creates a new image file. Both geometry parameters must be positive
    /// multiples of 32.
    pub fn init(path: &Path, block_size: u32, blocks_count: u32) -> Result<()> {
        Image::create(path, block_size, blocks_count)
    }

    /// Opens an image, with the current directory at the root.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            image: Image::open(path)?,
            current_directory: String::from("/"),
            clock: Box::new(SystemClock),
        })
    }

    /// Flushes and unmaps the image.
    pub fn close(self) -> Result<()> {
        self.image.close()
    }

    /// Replaces the wall clock used for date stamps.
    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn current_directory(&self) -> &str {
        &self.current_directory
    }

    pub(crate) fn now(&self) -> DateTime {
        self.clock.now()
    }

    pub(crate) fn set_current_directory(&mut self, path: String) {
        self.current_directory = path;
    }

    pub fn block_size(&self) -> usize {
        self.image.block_size()
    }

    pub fn blocks_count(&self) -> usize {
        self.image.blocks_count()
    }

    pub fn free_blocks(&self) -> u32 {
        self.image.free_blocks()
    }

    /// Read-only view of the underlying image, for inspection and tests.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Resolves a path against the current directory into its canonical
    /// absolute form.
    pub fn absolute_path(&self, path: &str) -> Result<String> {
        path::absolute(&self.current_directory, path)
    }
}
