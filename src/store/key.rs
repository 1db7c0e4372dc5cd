//! Hierarchical grouping keys
//!
//! A key is a path from the root, one part per depth. Grouped parts carry
//! the group values for that depth; ungrouped leaves carry a process-unique
//! sequence number so that every detail row is distinct.
//!
//! Byte layout: `u32 partCount`, then per part a tag byte (`1` grouped:
//! `u32 valueCount` + values, `0` ungrouped: `u64 id`).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::codec::{CodecError, CodecResult, Input, Output};
use crate::expression::Val;

use super::errors::{StoreError, StoreResult};

const PART_UNGROUPED: u8 = 0;
const PART_GROUPED: u8 = 1;

static UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Next process-unique sequence number.
pub fn next_unique_id() -> u64 {
    UNIQUE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Grouped(Vec<Val>),
    Ungrouped(u64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Key {
    parts: Vec<KeyPart>,
}

impl Key {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of parts. Children of this key live at this depth.
    pub fn depth(&self) -> usize {
        self.parts.len()
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    pub fn resolve_grouped(&self, values: Vec<Val>) -> Key {
        self.child(KeyPart::Grouped(values))
    }

    pub fn resolve_ungrouped(&self, id: u64) -> Key {
        self.child(KeyPart::Ungrouped(id))
    }

    fn child(&self, part: KeyPart) -> Key {
        let mut parts = Vec::with_capacity(self.parts.len() + 1);
        parts.extend_from_slice(&self.parts);
        parts.push(part);
        Key { parts }
    }

    /// `None` for the root.
    pub fn parent(&self) -> Option<Key> {
        let (_, init) = self.parts.split_last()?;
        Some(Key { parts: init.to_vec() })
    }

    /// True when the last part is a group. The root counts as grouped.
    pub fn is_grouped(&self) -> bool {
        !matches!(self.parts.last(), Some(KeyPart::Ungrouped(_)))
    }

    /// Replace the id of an ungrouped leaf. Grouped keys are returned unchanged.
    pub fn with_unique_id(&self, id: u64) -> Key {
        let mut key = self.clone();
        if let Some(last) = key.parts.last_mut() {
            if matches!(last, KeyPart::Ungrouped(_)) {
                *last = KeyPart::Ungrouped(id);
            }
        }
        key
    }

    pub fn write(&self, out: &mut Output) -> CodecResult<()> {
        out.write_u32(len_u32(self.parts.len())?);
        for part in &self.parts {
            match part {
                KeyPart::Grouped(values) => {
                    out.write_u8(PART_GROUPED);
                    out.write_u32(len_u32(values.len())?);
                    for value in values {
                        value.write(out)?;
                    }
                }
                KeyPart::Ungrouped(id) => {
                    out.write_u8(PART_UNGROUPED);
                    out.write_u64(*id);
                }
            }
        }
        Ok(())
    }

    pub fn read(input: &mut Input<'_>) -> CodecResult<Key> {
        let count = input.read_u32()? as usize;
        let mut parts = Vec::with_capacity(count.min(64));
        for _ in 0..count {
            match input.read_u8()? {
                PART_GROUPED => {
                    let len = input.read_u32()? as usize;
                    let mut values = Vec::with_capacity(len.min(64));
                    for _ in 0..len {
                        values.push(Val::read(input)?);
                    }
                    parts.push(KeyPart::Grouped(values));
                }
                PART_UNGROUPED => parts.push(KeyPart::Ungrouped(input.read_u64()?)),
                tag => return Err(CodecError::InvalidTag { what: "key part", tag }),
            }
        }
        Ok(Key { parts })
    }

    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut out = Output::with_capacity(16 * (self.parts.len() + 1));
        self.write(&mut out)?;
        Ok(out.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Key> {
        let mut input = Input::new(bytes);
        let key = Key::read(&mut input)?;
        input.finish()?;
        Ok(key)
    }

    /// Opaque string form handed to clients for open-group requests.
    pub fn to_encoded_string(&self) -> CodecResult<String> {
        Ok(URL_SAFE_NO_PAD.encode(self.to_bytes()?))
    }

    pub fn from_encoded_string(encoded: &str) -> StoreResult<Key> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| StoreError::InvalidGroupKey(format!("{}: {}", encoded, e)))?;
        Ok(Key::from_bytes(&bytes)?)
    }
}

fn len_u32(len: usize) -> CodecResult<u32> {
    u32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return f.write_str("/");
        }
        for part in &self.parts {
            f.write_str("/")?;
            match part {
                KeyPart::Grouped(values) => {
                    let rendered: Vec<String> = values.iter().map(Val::to_string).collect();
                    f.write_str(&rendered.join("|"))?;
                }
                KeyPart::Ungrouped(id) => write!(f, "#{}", id)?,
            }
        }
        Ok(())
    }
}
