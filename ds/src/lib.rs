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

use std::{
    fs::OpenOptions,
    mem::size_of,
    os::unix::fs::FileExt,
    path::Path,
};

use log::error;
use memmap2::MmapMut;
use zerocopy::{
    little_endian::{I32, U32},
    FromBytes, Immutable, IntoBytes, KnownLayout,
};

use fatbox_err::{FatError, Result};

/// First four bytes of every valid image.
pub const FAT_MAGIC: u32 = 0xFA7F_50C0;

/// Chain terminator in the FAT table. A freshly created image holds it in
/// every entry, so the whole table is 0xFF bytes.
pub const FAT_EOF: i32 = -1;

/// The root directory always occupies block 0 and its bitmap bit is never
/// cleared.
pub const ROOT_DIR_BLOCK: u32 = 0;

/// Size of one directory entry. `block_size` is a multiple of 32, so
/// entries never straddle a block boundary.
pub const DIR_ENTRY_SIZE: usize = 32;

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FatHeader {
    /// Identifies the backing file as a fatbox image. Always `FAT_MAGIC`.
    pub magic: U32,
    /// Bytes per data block. A positive multiple of 32.
    pub block_size: U32,
    /// Number of data blocks; also the number of bitmap bits and of FAT
    /// entries. A positive multiple of 32, so the bitmap is a whole number
    /// of bytes.
    pub blocks_count: U32,
    /// Count of blocks whose bitmap bit is clear. The allocator keeps this
    /// in sync with the bitmap on every mutation.
    pub free_blocks: U32,
}

/// A fatbox image mapped read-write into memory.
///
/// The backing file holds four contiguous regions:
///
/// ```text
/// [ FatHeader | Bitmap | FAT | Data ]
///   16 bytes    N/8 B    N*4B  N*S bytes
/// ```
///
/// where `N = blocks_count` and `S = block_size`. All mutations go through
/// the mapping and become durable via ordinary write-back; there is no
/// explicit flush until `close`.
pub struct Image {
    map: MmapMut,
    block_size: usize,
    blocks_count: usize,
    fat_offset: usize,
    data_offset: usize,
}

impl Image {
    /// Creates a new image file with an empty root directory.
    ///
    /// Both geometry parameters must be positive multiples of 32. The FAT
    /// region is filled with `FAT_EOF` and everything else past the header
    /// is zero, which doubles as the root's directory end entry.
    pub fn create(path: &Path, block_size: u32, blocks_count: u32) -> Result<()> {
        if blocks_count == 0 || blocks_count % 32 != 0 {
            return Err(FatError::InvalidBlocksCount);
        }
        if block_size == 0 || block_size % 32 != 0 {
            return Err(FatError::InvalidBlockSize);
        }

        let bitmap_len = blocks_count as usize / 8;
        let fat_len = blocks_count as usize * size_of::<I32>();
        let data_len = blocks_count as usize * block_size as usize;
        let total = size_of::<FatHeader>() + bitmap_len + fat_len + data_len;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|err| {
                error!("Cannot create image {}: {err}", path.display());
                FatError::FatBufferError
            })?;
        file.set_len(total as u64)
            .map_err(|_| FatError::FatBufferError)?;

        let header = FatHeader {
            magic: U32::new(FAT_MAGIC),
            block_size: U32::new(block_size),
            blocks_count: U32::new(blocks_count),
            free_blocks: U32::new(blocks_count - 1),
        };
        file.write_all_at(header.as_bytes(), 0)
            .map_err(|_| FatError::FatBufferError)?;
        // Block 0 is reserved for the root directory.
        file.write_all_at(&[0x01], size_of::<FatHeader>() as u64)
            .map_err(|_| FatError::FatBufferError)?;
        file.write_all_at(
            &vec![0xFF; fat_len],
            (size_of::<FatHeader>() + bitmap_len) as u64,
        )
        .map_err(|_| FatError::FatBufferError)?;

        Ok(())
    }

    /// Maps an existing image read-write and validates it against the
    /// header: the magic must match and the file must be exactly as long
    /// as the header-derived layout.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|err| {
                error!("Cannot open image {}: {err}", path.display());
                FatError::FatBufferError
            })?;
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|err| {
            error!("Cannot map image {}: {err}", path.display());
            FatError::FatOpenError
        })?;

        if map.len() < size_of::<FatHeader>() {
            error!("Image {} is shorter than a header", path.display());
            return Err(FatError::FatOpenError);
        }
        let header = FatHeader::ref_from_bytes(&map[..size_of::<FatHeader>()])
            .map_err(|_| FatError::FatOpenError)?;
        if header.magic.get() != FAT_MAGIC {
            error!(
                "Image {} has magic {:#010x}, expected {FAT_MAGIC:#010x}",
                path.display(),
                header.magic.get()
            );
            return Err(FatError::FatOpenError);
        }

        let block_size = header.block_size.get() as usize;
        let blocks_count = header.blocks_count.get() as usize;
        if block_size == 0 || block_size % 32 != 0 || blocks_count == 0 || blocks_count % 32 != 0 {
            error!("Image {} has an inconsistent geometry", path.display());
            return Err(FatError::FatOpenError);
        }
        let bitmap_offset = size_of::<FatHeader>();
        let fat_offset = bitmap_offset + blocks_count / 8;
        let data_offset = fat_offset + blocks_count * size_of::<I32>();
        if map.len() != data_offset + blocks_count * block_size {
            error!(
                "Image {} is {} bytes, the header implies {}",
                path.display(),
                map.len(),
                data_offset + blocks_count * block_size
            );
            return Err(FatError::FatOpenError);
        }

        Ok(Self {
            map,
            block_size,
            blocks_count,
            fat_offset,
            data_offset,
        })
    }

    /// Flushes the mapping and drops it. The map also unmaps on an early
    /// drop; closing only adds the explicit flush.
    pub fn close(self) -> Result<()> {
        self.map.flush().map_err(|err| {
            error!("Cannot flush image: {err}");
            FatError::FatCloseError
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn blocks_count(&self) -> usize {
        self.blocks_count
    }

    pub fn entries_per_block(&self) -> usize {
        self.block_size / DIR_ENTRY_SIZE
    }

    pub fn free_blocks(&self) -> u32 {
        self.header().free_blocks.get()
    }

    pub fn set_free_blocks(&mut self, free_blocks: u32) {
        self.header_mut().free_blocks = U32::new(free_blocks);
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.map[size_of::<FatHeader>()..self.fat_offset]
    }

    pub fn bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.map[size_of::<FatHeader>()..self.fat_offset]
    }

    pub fn fat(&self) -> &[I32] {
        <[I32]>::ref_from_bytes(&self.map[self.fat_offset..self.data_offset]).unwrap()
    }

    pub fn fat_mut(&mut self) -> &mut [I32] {
        <[I32]>::mut_from_bytes(&mut self.map[self.fat_offset..self.data_offset]).unwrap()
    }

    pub fn block(&self, block: u32) -> &[u8] {
        let offset = self.data_offset + block as usize * self.block_size;
        &self.map[offset..offset + self.block_size]
    }

    pub fn block_mut(&mut self, block: u32) -> &mut [u8] {
        let offset = self.data_offset + block as usize * self.block_size;
        &mut self.map[offset..offset + self.block_size]
    }

    fn header(&self) -> &FatHeader {
        FatHeader::ref_from_bytes(&self.map[..size_of::<FatHeader>()]).unwrap()
    }

    fn header_mut(&mut self) -> &mut FatHeader {
        FatHeader::mut_from_bytes(&mut self.map[..size_of::<FatHeader>()]).unwrap()
    }
}
