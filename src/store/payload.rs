//! Payload framing
//!
//! Frame: `i32 payloadCount`, then per payload `i32 byteLength` + bytes.
//! Payload bytes: repeated `(i32 keyLen, key, i32 valLen, value)` tuples.

use crate::codec::{CodecResult, Input, Output};

/// Accumulates key/value tuples for one payload, optionally bounded in bytes.
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    out: Output,
    limit: Option<usize>,
    rows: usize,
}

impl PayloadBuilder {
    /// `limit` of `None` or zero is unbounded.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            out: Output::new(),
            limit: limit.filter(|l| *l > 0),
            rows: 0,
        }
    }

    pub fn has_room(&self) -> bool {
        self.limit.map_or(true, |limit| self.out.len() < limit)
    }

    pub fn push(&mut self, key: &[u8], value: &[u8]) -> CodecResult<()> {
        self.out.write_block(key)?;
        self.out.write_block(value)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}

pub fn write_frame(out: &mut Output, payloads: &[Vec<u8>]) -> CodecResult<()> {
    let count = i32::try_from(payloads.len()).map_err(|_| crate::codec::CodecError::LengthOverflow(payloads.len()))?;
    out.write_i32(count);
    for payload in payloads {
        out.write_block(payload)?;
    }
    Ok(())
}

pub fn read_frame<'a>(input: &mut Input<'a>) -> CodecResult<Vec<&'a [u8]>> {
    let count = input.read_count()?;
    let mut payloads = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        payloads.push(input.read_block()?);
    }
    Ok(payloads)
}

/// Iterates the `(key, value)` tuples of one payload.
pub struct PayloadRows<'a> {
    input: Input<'a>,
}

impl<'a> PayloadRows<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        Self {
            input: Input::new(payload),
        }
    }
}

impl<'a> Iterator for PayloadRows<'a> {
    type Item = CodecResult<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }
        let row = self
            .input
            .read_block()
            .and_then(|key| Ok((key, self.input.read_block()?)));
        if row.is_err() {
            // Stop after the first malformed tuple.
            self.input = Input::new(&[]);
        }
        Some(row)
    }
}
