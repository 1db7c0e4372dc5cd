//! Big-endian byte buffers
//!
//! Every binary format in the crate is built on these two types:
//! - `Output` appends fixed-width integers, floats and length-prefixed slices
//! - `Input` reads them back from a borrowed slice, failing on truncation
//!
//! All integers are big-endian so that encoded keys sort the same way
//! bytewise as they do numerically.

mod errors;

pub use errors::{CodecError, CodecResult};

/// Growable output buffer.
#[derive(Debug, Default, Clone)]
pub struct Output {
    buf: Vec<u8>,
}

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    /// Append raw bytes without a prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append `u32 len` followed by the bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| CodecError::LengthOverflow(bytes.len()))?;
        self.write_u32(len);
        self.write_raw(bytes);
        Ok(())
    }

    /// Append `i32 len` followed by the bytes (payload framing).
    pub fn write_block(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let len = i32::try_from(bytes.len()).map_err(|_| CodecError::LengthOverflow(bytes.len()))?;
        self.write_i32(len);
        self.write_raw(bytes);
        Ok(())
    }

    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        self.write_bytes(value.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct Input<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(CodecError::InvalidTag { what: "bool", tag }),
        }
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_raw(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.take(n)
    }

    /// Read a `u32`-prefixed slice.
    pub fn read_bytes(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    /// Read an `i32`-prefixed slice (payload framing).
    pub fn read_block(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_count()?;
        self.take(len)
    }

    /// Read a non-negative `i32` count.
    pub fn read_count(&mut self) -> CodecResult<usize> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| CodecError::NegativeLength(len))
    }

    pub fn read_string(&mut self) -> CodecResult<String> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Fail if any bytes are left unread.
    pub fn finish(&self) -> CodecResult<()> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}
