//! Binary chunk format.
//!
//! All fields are big-endian:
//!
//! ```text
//! "ZBC" version:u8
//! globals:u16 arrays:u16
//! constants:u16 { tag:u8 (1 = f64 | 2 = len:u16 bytes) }*
//! code_len:u32 code:[u8]
//! lines_len:u32 lines:[u32]
//! ```

use std::io::{self, Read, Write};

use tracing::debug;

use crate::bytecode::chunk::{Chunk, Constant};
use crate::error::{DecodeError, EncodeError};

pub const MAGIC: [u8; 3] = *b"ZBC";

pub const FORMAT_VERSION: u8 = 1;

const TAG_NUMBER: u8 = 1;
const TAG_STRING: u8 = 2;

fn wr_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn wr_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

fn wr_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

fn rd_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn rd_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_be_bytes(b))
}

fn rd_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn rd_bytes<R: Read>(r: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, found {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

fn count_u16(what: &'static str, count: usize) -> Result<u16, EncodeError> {
    u16::try_from(count).map_err(|_| EncodeError::CountOverflow { what, count })
}

fn count_u32(what: &'static str, count: usize) -> Result<u32, EncodeError> {
    u32::try_from(count).map_err(|_| EncodeError::CountOverflow { what, count })
}

impl Chunk {
    /// Encode the chunk to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), EncodeError> {
        w.write_all(&MAGIC)?;
        wr_u8(w, FORMAT_VERSION)?;
        wr_u16(w, count_u16("global", self.global_count)?)?;
        wr_u16(w, count_u16("array", self.array_count)?)?;

        wr_u16(w, count_u16("constant", self.constants.len())?)?;
        for (index, constant) in self.constants.iter().enumerate() {
            match constant {
                Constant::Number(n) => {
                    wr_u8(w, TAG_NUMBER)?;
                    w.write_all(&n.to_be_bytes())?;
                }
                Constant::String(s) => {
                    let len = u16::try_from(s.len())
                        .map_err(|_| EncodeError::StringTooLong { index, len: s.len() })?;
                    wr_u8(w, TAG_STRING)?;
                    wr_u16(w, len)?;
                    w.write_all(s.as_bytes())?;
                }
            }
        }

        wr_u32(w, count_u32("code byte", self.code.len())?)?;
        w.write_all(&self.code)?;

        wr_u32(w, count_u32("line entry", self.lines.len())?)?;
        for line in &self.lines {
            wr_u32(w, *line)?;
        }

        debug!(
            code = self.code.len(),
            constants = self.constants.len(),
            "chunk encoded"
        );
        Ok(())
    }

    /// Decode a chunk from `r`.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Chunk, DecodeError> {
        let mut magic = [0u8; 3];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }
        let version = rd_u8(r)?;
        if version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }

        let global_count = rd_u16(r)? as usize;
        let array_count = rd_u16(r)? as usize;

        let constant_count = rd_u16(r)? as usize;
        let mut constants = Vec::with_capacity(constant_count);
        for index in 0..constant_count {
            let constant = match rd_u8(r)? {
                TAG_NUMBER => {
                    let mut b = [0u8; 8];
                    r.read_exact(&mut b)?;
                    Constant::Number(f64::from_be_bytes(b))
                }
                TAG_STRING => {
                    let len = rd_u16(r)? as usize;
                    let bytes = rd_bytes(r, len)?;
                    let s = String::from_utf8(bytes)
                        .map_err(|_| DecodeError::InvalidUtf8 { index })?;
                    Constant::String(s)
                }
                tag => return Err(DecodeError::UnknownConstantTag { tag, index }),
            };
            constants.push(constant);
        }

        let code_len = rd_u32(r)? as usize;
        let code = rd_bytes(r, code_len)?;

        let line_count = rd_u32(r)? as usize;
        if line_count != code_len {
            return Err(DecodeError::LineTableMismatch {
                code: code_len,
                lines: line_count,
            });
        }
        let raw = rd_bytes(r, line_count * 4)?;
        let lines = raw
            .chunks_exact(4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        debug!(code = code_len, constants = constant_count, "chunk decoded");
        Ok(Chunk {
            code,
            constants,
            lines,
            global_count,
            array_count,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Chunk, DecodeError> {
        Chunk::read_from(&mut bytes)
    }
}
