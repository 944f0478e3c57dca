//! Just enough ELF to read the `DT_NEEDED` entries of a binary.
//!
//! Walks the section headers for `SHT_DYNAMIC`, then reads its entries up to
//! `DT_NULL`, resolving names through the string table the section links to.
//! Both classes and both byte orders are supported.

use thiserror::Error;

const SHT_DYNAMIC: u32 = 6;
const DT_NULL: u64 = 0;
const DT_NEEDED: u64 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElfError {
  #[error("file too short to be an ELF")]
  TooShort,

  #[error("invalid ELF magic")]
  InvalidMagic,

  #[error("unknown ELF class {0}")]
  InvalidClass(u8),

  #[error("unknown ELF data encoding {0}")]
  InvalidEncoding(u8),

  #[error("ELF structure points outside the file")]
  Truncated,
}

#[derive(Debug, Clone, Copy)]
struct Reader<'a> {
  data: &'a [u8],
  class64: bool,
  little_endian: bool,
}

impl<'a> Reader<'a> {
  fn uint(&self, offset: u64, width: usize) -> Result<u64, ElfError> {
    let start = usize::try_from(offset).map_err(|_| ElfError::Truncated)?;
    let end = start.checked_add(width).ok_or(ElfError::Truncated)?;
    let bytes = self.data.get(start..end).ok_or(ElfError::Truncated)?;

    let mut value = 0u64;
    if self.little_endian {
      for byte in bytes.iter().rev() {
        value = (value << 8) | u64::from(*byte);
      }
    } else {
      for byte in bytes {
        value = (value << 8) | u64::from(*byte);
      }
    }
    Ok(value)
  }

  fn u16(&self, offset: u64) -> Result<u64, ElfError> {
    self.uint(offset, 2)
  }

  fn u32(&self, offset: u64) -> Result<u64, ElfError> {
    self.uint(offset, 4)
  }

  /// An address-sized field.
  fn word(&self, offset: u64) -> Result<u64, ElfError> {
    self.uint(offset, if self.class64 { 8 } else { 4 })
  }

  fn c_string(&self, offset: u64) -> Result<&'a str, ElfError> {
    let start = usize::try_from(offset).map_err(|_| ElfError::Truncated)?;
    let rest = self.data.get(start..).ok_or(ElfError::Truncated)?;
    let len = rest.iter().position(|b| *b == 0).ok_or(ElfError::Truncated)?;
    std::str::from_utf8(&rest[..len]).map_err(|_| ElfError::Truncated)
  }
}

/// `base + delta`, failing when the sum leaves the address space.
fn offset(base: u64, delta: u64) -> Result<u64, ElfError> {
  base.checked_add(delta).ok_or(ElfError::Truncated)
}

struct Section {
  kind: u64,
  offset: u64,
  size: u64,
  link: u64,
}

/// Libraries `data` declares as `DT_NEEDED`, in declaration order.
///
/// A valid ELF without a dynamic section needs nothing. Anything that is not
/// an ELF is an error.
pub fn needed_libraries(data: &[u8]) -> Result<Vec<String>, ElfError> {
  if data.len() < 16 {
    return Err(ElfError::TooShort);
  }
  if data[..4] != [0x7f, b'E', b'L', b'F'] {
    return Err(ElfError::InvalidMagic);
  }
  let class64 = match data[4] {
    1 => false,
    2 => true,
    other => return Err(ElfError::InvalidClass(other)),
  };
  let little_endian = match data[5] {
    1 => true,
    2 => false,
    other => return Err(ElfError::InvalidEncoding(other)),
  };
  let reader = Reader {
    data,
    class64,
    little_endian,
  };

  let (shoff, shentsize, shnum) = if class64 {
    (reader.word(0x28)?, reader.u16(0x3a)?, reader.u16(0x3c)?)
  } else {
    (reader.word(0x20)?, reader.u16(0x2e)?, reader.u16(0x30)?)
  };

  let sections = (0..shnum)
    .map(|index| {
      let at = index.checked_mul(shentsize).ok_or(ElfError::Truncated)?;
      section_header(&reader, offset(shoff, at)?)
    })
    .collect::<Result<Vec<_>, _>>()?;

  let Some(dynamic) = sections.iter().find(|s| s.kind == u64::from(SHT_DYNAMIC)) else {
    return Ok(Vec::new());
  };
  let strtab = usize::try_from(dynamic.link)
    .ok()
    .and_then(|link| sections.get(link))
    .ok_or(ElfError::Truncated)?;

  let entry_size = if class64 { 16 } else { 8 };
  let mut needed = Vec::new();
  let end = offset(dynamic.offset, dynamic.size)?;
  let mut entry = dynamic.offset;
  while offset(entry, entry_size)? <= end {
    let tag = reader.word(entry)?;
    let value = reader.word(offset(entry, entry_size / 2)?)?;
    match tag {
      DT_NULL => break,
      DT_NEEDED => needed.push(reader.c_string(offset(strtab.offset, value)?)?.to_string()),
      _ => {}
    }
    entry = offset(entry, entry_size)?;
  }

  Ok(needed)
}

fn section_header(reader: &Reader<'_>, at: u64) -> Result<Section, ElfError> {
  let (offset_field, size_field, link_field) = if reader.class64 {
    (0x18, 0x20, 0x28)
  } else {
    (0x10, 0x14, 0x18)
  };
  Ok(Section {
    kind: reader.u32(offset(at, 0x04)?)?,
    offset: reader.word(offset(at, offset_field)?)?,
    size: reader.word(offset(at, size_field)?)?,
    link: reader.u32(offset(at, link_field)?)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::build_elf;

  #[test]
  fn reads_needed_in_every_layout() {
    for class64 in [true, false] {
      for little_endian in [true, false] {
        let image = build_elf(class64, little_endian, &["libc.so.6", "libm.so.6"]);
        assert_eq!(
          needed_libraries(&image).unwrap(),
          vec!["libc.so.6", "libm.so.6"],
          "class64={class64} little_endian={little_endian}"
        );
      }
    }
  }

  #[test]
  fn no_needed_entries() {
    let image = build_elf(true, true, &[]);
    assert!(needed_libraries(&image).unwrap().is_empty());
  }

  #[test]
  fn stops_at_dt_null() {
    let mut image = build_elf(true, true, &["liba.so", "libb.so"]);
    // Overwrite the second DT_NEEDED tag (dynstr is 17 bytes after the 64-byte header).
    let second_tag = 64 + 17 + 16;
    image[second_tag..second_tag + 8].copy_from_slice(&0u64.to_le_bytes());
    assert_eq!(needed_libraries(&image).unwrap(), vec!["liba.so"]);
  }

  #[test]
  fn rejects_non_elf() {
    assert_eq!(needed_libraries(b"#!/bin/sh\necho hello\n"), Err(ElfError::InvalidMagic));
    assert_eq!(needed_libraries(b"\x7fELF"), Err(ElfError::TooShort));

    let mut image = build_elf(true, true, &[]);
    image[4] = 7;
    assert_eq!(needed_libraries(&image), Err(ElfError::InvalidClass(7)));
  }

  #[test]
  fn truncated_file_is_error() {
    let image = build_elf(true, true, &["libc.so.6"]);
    assert_eq!(needed_libraries(&image[..80]), Err(ElfError::Truncated));
  }

  mod malformed_headers {
    use super::*;

    // ELF64 LE with one needed library: dynstr is 11 bytes at 64, the dynamic
    // section 32 bytes at 75, section headers at 107.
    const DYNAMIC_ENTRIES: usize = 75;
    const DYNAMIC_HEADER: usize = 107 + 2 * 64;

    fn image() -> Vec<u8> {
      build_elf(true, true, &["libc.so.6"])
    }

    fn patch(image: &mut [u8], at: usize, value: u64, width: usize) {
      image[at..at + width].copy_from_slice(&value.to_le_bytes()[..width]);
    }

    #[test]
    fn fixture_layout_is_as_expected() {
      let image = image();
      assert_eq!(image.len(), 107 + 3 * 64);
      assert_eq!(&image[65..74], b"libc.so.6");
    }

    #[test]
    fn section_table_offset_near_address_space_end() {
      let mut image = image();
      patch(&mut image, 0x28, u64::MAX - 2, 8);
      patch(&mut image, 0x3a, 64, 2);
      patch(&mut image, 0x3c, 1, 2);
      assert_eq!(needed_libraries(&image[..64]), Err(ElfError::Truncated));
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn section_table_past_end_of_file() {
      let mut image = image();
      patch(&mut image, 0x28, 1 << 20, 8);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn section_count_past_end_of_file() {
      let mut image = image();
      patch(&mut image, 0x3c, 0xffff, 2);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn dynamic_offset_overflows() {
      let mut image = image();
      patch(&mut image, DYNAMIC_HEADER + 0x18, u64::MAX - 8, 8);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn dynamic_size_overflows() {
      let mut image = image();
      patch(&mut image, DYNAMIC_HEADER + 0x20, u64::MAX, 8);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn dynamic_offset_past_end_of_file() {
      let mut image = image();
      patch(&mut image, DYNAMIC_HEADER + 0x18, 10_000, 8);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn string_table_link_out_of_range() {
      let mut image = image();
      patch(&mut image, DYNAMIC_HEADER + 0x28, 9, 4);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn needed_name_offset_overflows() {
      let mut image = image();
      patch(&mut image, DYNAMIC_ENTRIES + 8, u64::MAX - 16, 8);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }

    #[test]
    fn needed_name_offset_past_end_of_file() {
      let mut image = image();
      patch(&mut image, DYNAMIC_ENTRIES + 8, 1 << 20, 8);
      assert_eq!(needed_libraries(&image), Err(ElfError::Truncated));
    }
  }
}
