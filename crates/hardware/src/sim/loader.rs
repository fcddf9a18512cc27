//! Guest executable loading.
//!
//! Loads a 64-bit ELF executable's LOAD segments into a flat process
//! image and derives the initial process layout: entry point, stack at
//! the top of the image, heap after the highest loaded segment. The core
//! sees byte-addressable memory only; no address translation is applied.

use std::path::Path;

use object::{Object, ObjectSegment};

use crate::common::error::LoadError;
use crate::isa::ProcessInfo;

/// Gap kept between the image top and the initial stack pointer.
const STACK_HEADROOM: u64 = 64;

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Loads an ELF executable into a fresh process image of `image_size`
/// bytes, returning the image and the derived process layout.
pub fn load_elf(path: &Path, image_size: usize) -> Result<(Vec<u8>, ProcessInfo), LoadError> {
    let data = std::fs::read(path)?;
    let file = object::File::parse(&*data)?;

    let mut image = vec![0u8; image_size];
    let mut highest_end = 0u64;

    for segment in file.segments() {
        let address = segment.address();
        let size = segment.size();
        if size == 0 {
            continue;
        }
        if address + size > image_size as u64 {
            return Err(LoadError::SegmentOutOfRange {
                address,
                size,
                image_size: image_size as u64,
            });
        }
        let bytes = segment.data()?;
        image[address as usize..address as usize + bytes.len()].copy_from_slice(bytes);
        highest_end = highest_end.max(address + size);
    }

    let info = ProcessInfo {
        entry_point: file.entry(),
        stack_pointer: (image_size as u64 - STACK_HEADROOM) & !15,
        heap_start: align_up(highest_end, 16),
        image_size: image_size as u64,
    };
    Ok((image, info))
}

/// Places raw little-endian instruction words at `load_address` in a
/// fresh image, for directly assembled programs.
pub fn load_encodings(
    encodings: &[u32],
    load_address: u64,
    image_size: usize,
) -> (Vec<u8>, ProcessInfo) {
    let mut image = vec![0u8; image_size];
    for (index, encoding) in encodings.iter().enumerate() {
        let offset = load_address as usize + index * 4;
        image[offset..offset + 4].copy_from_slice(&encoding.to_le_bytes());
    }
    let end = load_address + encodings.len() as u64 * 4;
    let info = ProcessInfo {
        entry_point: load_address,
        stack_pointer: (image_size as u64 - STACK_HEADROOM) & !15,
        heap_start: align_up(end, 16),
        image_size: image_size as u64,
    };
    (image, info)
}
