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

//! Block allocation: the bitmap says which blocks are taken, the FAT says
//! which block follows which. Every space change in the file system goes
//! through here so `free_blocks` stays equal to the number of clear bits.

use zerocopy::little_endian::I32;

use fatbox_ds::FAT_EOF;
use fatbox_err::{FatError, Result};

use crate::FatFs;

impl FatFs {
    pub(crate) fn bitmap_get(&self, block: u32) -> bool {
        (self.image.bitmap()[block as usize / 8] >> (block % 8)) & 1 == 1
    }

    /// Sets one bitmap bit, adjusting `free_blocks` by the difference to
    /// its previous value. Re-setting a bit to the value it already has
    /// leaves the accounting untouched.
    pub(crate) fn bitmap_set(&mut self, block: u32, value: bool) {
        let free_blocks = match (self.bitmap_get(block), value) {
            (false, true) => self.image.free_blocks() - 1,
            (true, false) => self.image.free_blocks() + 1,
            _ => self.image.free_blocks(),
        };
        self.image.set_free_blocks(free_blocks);

        let byte = &mut self.image.bitmap_mut()[block as usize / 8];
        if value {
            *byte |= 1 << (block % 8);
        } else {
            *byte &= !(1 << (block % 8));
        }
    }

    /// Lowest free block index, if any.
    pub(crate) fn bitmap_first_free(&self) -> Option<u32> {
        self.image
            .bitmap()
            .iter()
            .enumerate()
            .find(|(_, &byte)| byte != 0xFF)
            .map(|(index, byte)| index as u32 * 8 + byte.trailing_ones())
    }

    pub(crate) fn fat_next(&self, block: u32) -> i32 {
        self.image.fat()[block as usize].get()
    }

    pub(crate) fn fat_set_next(&mut self, block: u32, next: i32) {
        self.image.fat_mut()[block as usize] = I32::new(next);
    }

    /// Releases every block chained from `start`, clearing bitmap bits and
    /// resetting the FAT entries. A `FAT_EOF` start releases nothing.
    pub(crate) fn fat_unlink(&mut self, start: i32) {
        let mut block = start;
        while block != FAT_EOF {
            let next = self.fat_next(block as u32);
            self.free_block(block as u32);
            block = next;
        }
    }

    pub(crate) fn free_block(&mut self, block: u32) {
        self.bitmap_set(block, false);
        self.fat_set_next(block, FAT_EOF);
    }

    /// Claims the lowest free block as a fresh chain tail. The block's
    /// data is zeroed: stale bytes from its previous life must not leak
    /// into a new directory or file header.
    pub(crate) fn alloc_block(&mut self) -> Result<u32> {
        let block = self.bitmap_first_free().ok_or(FatError::NoFreeBlocks)?;
        self.bitmap_set(block, true);
        self.fat_set_next(block, FAT_EOF);
        self.image.block_mut(block).fill(0);
        Ok(block)
    }
}
