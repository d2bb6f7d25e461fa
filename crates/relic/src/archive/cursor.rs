// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte cursors for archive buffers.
//!
//! The writer owns a growable buffer; the reader borrows a finished one.
//! Both honor the `swap_bytes` option so one code path serves native and
//! swapped wire order. Signed counts and object indices use the compact
//! index encoding (sign bit + 6 payload bits in the first byte, 7 payload
//! bits per continuation byte).

use crate::archive::{ArchiveError, ArchiveOptions, ArchiveResult};

/// Generate write methods for primitive types.
///
/// Each generated method converts via `to_le_bytes()`/`to_be_bytes()` per
/// the swap flag, appends to the buffer and advances the cursor.
macro_rules! impl_write_prim {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) {
            if self.options.swap_bytes {
                self.buffer.extend_from_slice(&value.to_be_bytes());
            } else {
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
        }
    };
}

/// Generate read methods for primitive types.
///
/// Each generated method checks bounds (returns `ArchiveError::Corrupt` on
/// overrun), converts per the swap flag and advances the cursor.
macro_rules! impl_read_prim {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> ArchiveResult<$type> {
            if self.offset + $size > self.buffer.len() {
                return Err(ArchiveError::Corrupt {
                    offset: self.offset,
                    reason: "unexpected end of stream".into(),
                });
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buffer[self.offset..self.offset + $size]);
            self.offset += $size;
            if self.options.swap_bytes {
                Ok(<$type>::from_be_bytes(bytes))
            } else {
                Ok(<$type>::from_le_bytes(bytes))
            }
        }
    };
}

/// Growable write cursor.
pub struct Writer {
    buffer: Vec<u8>,
    options: ArchiveOptions,
}

impl Writer {
    /// Fresh empty buffer.
    #[must_use]
    pub fn new(options: ArchiveOptions) -> Self {
        Self {
            buffer: Vec::new(),
            options,
        }
    }

    /// Current write position (equals bytes written so far).
    #[must_use]
    pub fn tell(&self) -> usize {
        self.buffer.len()
    }

    /// Mode flags in effect.
    #[must_use]
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    impl_write_prim!(write_u8, u8);
    impl_write_prim!(write_u16, u16);
    impl_write_prim!(write_u32, u32);
    impl_write_prim!(write_u64, u64);
    impl_write_prim!(write_i32, i32);

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Length-prefixed UTF-8 string (compact-index byte count).
    pub fn write_string(&mut self, text: &str) {
        self.write_compact_index(text.len() as i32);
        self.buffer.extend_from_slice(text.as_bytes());
    }

    /// Compact signed index: first byte carries sign (0x80) and 6 payload
    /// bits with a 0x40 continuation flag; later bytes carry 7 payload bits
    /// with a 0x80 continuation flag.
    pub fn write_compact_index(&mut self, value: i32) {
        let mut v = i64::from(value).unsigned_abs();
        let mut byte = if value < 0 { 0x80u8 } else { 0 } | (v & 0x3F) as u8;
        v >>= 6;
        if v != 0 {
            byte |= 0x40;
        }
        self.buffer.push(byte);
        while v != 0 {
            let mut byte = (v & 0x7F) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.buffer.push(byte);
        }
    }

    /// Overwrite 4 already-written bytes (table-of-contents back-patching).
    pub fn patch_u32(&mut self, offset: usize, value: u32) -> ArchiveResult<()> {
        if offset + 4 > self.buffer.len() {
            return Err(ArchiveError::WriteFailed {
                offset,
                reason: "patch beyond written bytes".into(),
            });
        }
        let bytes = if self.options.swap_bytes {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        };
        self.buffer[offset..offset + 4].copy_from_slice(&bytes);
        Ok(())
    }

    /// Finish and take the buffer.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Written bytes so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
}

/// Bounds-checked read cursor.
pub struct Reader<'a> {
    buffer: &'a [u8],
    offset: usize,
    options: ArchiveOptions,
}

impl<'a> Reader<'a> {
    /// Cursor at the start of `buffer`.
    #[must_use]
    pub fn new(buffer: &'a [u8], options: ArchiveOptions) -> Self {
        Self {
            buffer,
            offset: 0,
            options,
        }
    }

    /// Current read position.
    #[must_use]
    pub fn tell(&self) -> usize {
        self.offset
    }

    /// Total stream length.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    /// True once the cursor has consumed the whole stream.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }

    /// Mode flags in effect.
    #[must_use]
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Mutable access so load-side code can flip gates mid-stream (the
    /// package header decides the swap flag for the rest of the file).
    pub fn options_mut(&mut self) -> &mut ArchiveOptions {
        &mut self.options
    }

    impl_read_prim!(read_u8, u8, 1);
    impl_read_prim!(read_u16, u16, 2);
    impl_read_prim!(read_u32, u32, 4);
    impl_read_prim!(read_u64, u64, 8);
    impl_read_prim!(read_i32, i32, 4);

    pub fn read_f32(&mut self) -> ArchiveResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> ArchiveResult<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(ArchiveError::Corrupt {
                offset: self.offset,
                reason: "unexpected end of stream".into(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> ArchiveResult<String> {
        let start = self.offset;
        let len = self.read_compact_index()?;
        if len < 0 || len as usize > self.remaining() {
            return Err(ArchiveError::Corrupt {
                offset: start,
                reason: format!("string length {} exceeds stream", len),
            });
        }
        let bytes = self.read_bytes(len as usize)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ArchiveError::Corrupt {
            offset: start,
            reason: "string is not valid UTF-8".into(),
        })
    }

    /// Compact signed index; see [`Writer::write_compact_index`].
    pub fn read_compact_index(&mut self) -> ArchiveResult<i32> {
        let start = self.offset;
        let first = self.read_u8()?;
        let negative = first & 0x80 != 0;
        let mut value = i64::from(first & 0x3F);
        if first & 0x40 != 0 {
            let mut shift = 6u32;
            loop {
                let byte = self.read_u8()?;
                value |= i64::from(byte & 0x7F) << shift;
                if byte & 0x80 == 0 {
                    break;
                }
                shift += 7;
                if shift > 32 {
                    return Err(ArchiveError::Corrupt {
                        offset: start,
                        reason: "compact index does not terminate".into(),
                    });
                }
            }
        }
        if negative {
            value = -value;
        }
        i32::try_from(value).map_err(|_| ArchiveError::Corrupt {
            offset: start,
            reason: "compact index overflows i32".into(),
        })
    }

    /// Jump to an absolute position (table-of-contents offsets).
    pub fn seek(&mut self, offset: usize) -> ArchiveResult<()> {
        if offset > self.buffer.len() {
            return Err(ArchiveError::Corrupt {
                offset,
                reason: "seek beyond end of stream".into(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Skip `len` bytes (unknown-property payloads).
    pub fn skip(&mut self, len: usize) -> ArchiveResult<()> {
        self.read_bytes(len).map(|_| ())
    }
}
