//! Row key and row value layouts
//!
//! Row key, big-endian so byte order is `(depth, parent, discriminator)`:
//!
//! ```text
//! u32 depth | u32 crc32(parent key bytes) | u8 grouped | u32 crc32(key bytes)   (grouped)
//! u32 depth | u32 crc32(parent key bytes) | u8 grouped | u64 unique id         (ungrouped)
//! ```
//!
//! Row value: one or more entries, more than one only when distinct grouped
//! keys hash to the same row key:
//!
//! ```text
//! u32 entryLen | u64 arrival sequence | u32 keyLen | key bytes | generator set
//! ```

use std::sync::Arc;

use crate::codec::{CodecResult, Input, Output};
use crate::expression::{merge_generators, read_generators, write_generators, Expression};
use crate::store::{next_unique_id, Key};

use super::errors::{LmdbError, LmdbResult};

pub const PREFIX_LEN: usize = 8;
const GROUPED_KEY_LEN: usize = PREFIX_LEN + 1 + 4;
const UNGROUPED_KEY_LEN: usize = PREFIX_LEN + 1 + 8;

fn hash(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

fn depth_u32(depth: usize) -> CodecResult<u32> {
    u32::try_from(depth).map_err(|_| crate::codec::CodecError::LengthOverflow(depth))
}

/// Scan prefix shared by every row key beneath `parent`.
pub fn child_prefix(parent: &Key) -> CodecResult<[u8; PREFIX_LEN]> {
    let mut prefix = [0u8; PREFIX_LEN];
    prefix[..4].copy_from_slice(&depth_u32(parent.depth())?.to_be_bytes());
    prefix[4..].copy_from_slice(&hash(&parent.to_bytes()?).to_be_bytes());
    Ok(prefix)
}

/// Row key for an item with `key` beneath `parent`.
pub fn row_key(parent: &Key, key: &Key, key_bytes: &[u8]) -> CodecResult<Vec<u8>> {
    let mut out = Output::with_capacity(UNGROUPED_KEY_LEN);
    out.write_raw(&child_prefix(parent)?);
    match key.parts().last() {
        Some(crate::store::KeyPart::Ungrouped(id)) => {
            out.write_bool(false);
            out.write_u64(*id);
        }
        _ => {
            out.write_bool(true);
            out.write_u32(hash(key_bytes));
        }
    }
    Ok(out.into_bytes())
}

pub fn is_grouped_row(row_key: &[u8]) -> LmdbResult<bool> {
    match row_key.len() {
        GROUPED_KEY_LEN if row_key[PREFIX_LEN] == 1 => Ok(true),
        UNGROUPED_KEY_LEN if row_key[PREFIX_LEN] == 0 => Ok(false),
        len => Err(LmdbError::MalformedRowKey(len)),
    }
}

/// Replace the unique id suffix of an ungrouped row key.
pub fn with_unique_id(row_key: &[u8], id: u64) -> LmdbResult<Vec<u8>> {
    if is_grouped_row(row_key)? {
        return Ok(row_key.to_vec());
    }
    let mut out = row_key[..PREFIX_LEN + 1].to_vec();
    out.extend_from_slice(&id.to_be_bytes());
    Ok(out)
}

/// One decoded row value entry, borrowing from the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub sequence: u64,
    pub key: &'a [u8],
    pub generators: &'a [u8],
}

pub fn write_entry(out: &mut Output, sequence: u64, key: &[u8], generators: &[u8]) -> CodecResult<()> {
    let len = 8 + 4 + key.len() + generators.len();
    let len = u32::try_from(len).map_err(|_| crate::codec::CodecError::LengthOverflow(len))?;
    out.write_u32(len);
    out.write_u64(sequence);
    out.write_bytes(key)?;
    out.write_raw(generators);
    Ok(())
}

/// Encode a single-entry row value for a freshly ingested item.
pub fn single_entry(sequence: u64, key_bytes: &[u8], generators: &[Option<crate::expression::Generator>]) -> CodecResult<Vec<u8>> {
    let mut encoded = Output::new();
    write_generators(&mut encoded, generators)?;
    let mut out = Output::with_capacity(16 + key_bytes.len() + encoded.len());
    write_entry(&mut out, sequence, key_bytes, encoded.as_slice())?;
    Ok(out.into_bytes())
}

pub struct Entries<'a> {
    input: Input<'a>,
}

impl<'a> Entries<'a> {
    pub fn new(blob: &'a [u8]) -> Self {
        Self {
            input: Input::new(blob),
        }
    }
}

impl<'a> Iterator for Entries<'a> {
    type Item = CodecResult<Entry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }
        let entry = read_entry(&mut self.input);
        if entry.is_err() {
            self.input = Input::new(&[]);
        }
        Some(entry)
    }
}

fn read_entry<'a>(input: &mut Input<'a>) -> CodecResult<Entry<'a>> {
    let body = input.read_bytes()?;
    let mut body = Input::new(body);
    let sequence = body.read_u64()?;
    let key = body.read_bytes()?;
    let generators = body.read_raw(body.remaining())?;
    Ok(Entry {
        sequence,
        key,
        generators,
    })
}

/// Merge the entries of `incoming` into `existing`.
///
/// Entries with identical key bytes have their generators merged and keep
/// the earlier arrival sequence; the rest are appended. Returns the new
/// value and the number of appended entries.
pub fn merge_entries(
    existing: &[u8],
    incoming: &[u8],
    expressions: &[Option<Arc<Expression>>],
) -> CodecResult<(Vec<u8>, usize)> {
    let mut pending: Vec<Option<Entry<'_>>> = Entries::new(incoming).map(|e| e.map(Some)).collect::<CodecResult<_>>()?;
    let mut out = Output::with_capacity(existing.len() + incoming.len());

    for entry in Entries::new(existing) {
        let entry = entry?;
        let matching = pending
            .iter_mut()
            .find(|p| p.is_some_and(|p| p.key == entry.key))
            .and_then(Option::take);

        match matching {
            Some(other) => {
                let mut merged = read_generators(&mut Input::new(entry.generators), expressions)?;
                let incoming_generators = read_generators(&mut Input::new(other.generators), expressions)?;
                merge_generators(&mut merged, &incoming_generators);
                let mut encoded = Output::new();
                write_generators(&mut encoded, &merged)?;
                write_entry(&mut out, entry.sequence.min(other.sequence), entry.key, encoded.as_slice())?;
            }
            None => write_entry(&mut out, entry.sequence, entry.key, entry.generators)?,
        }
    }

    let mut appended = 0;
    for entry in pending.into_iter().flatten() {
        write_entry(&mut out, entry.sequence, entry.key, entry.generators)?;
        appended += 1;
    }
    Ok((out.into_bytes(), appended))
}

/// Give every entry a local arrival sequence, and when `unique_id` is set,
/// rewrite each entry's ungrouped key part to it.
pub fn relocalize(blob: &[u8], unique_id: Option<u64>) -> CodecResult<Vec<u8>> {
    let mut out = Output::with_capacity(blob.len());
    for entry in Entries::new(blob) {
        let entry = entry?;
        match unique_id {
            Some(id) => {
                let key = Key::from_bytes(entry.key)?.with_unique_id(id).to_bytes()?;
                write_entry(&mut out, next_unique_id(), &key, entry.generators)?;
            }
            None => write_entry(&mut out, next_unique_id(), entry.key, entry.generators)?,
        }
    }
    Ok(out.into_bytes())
}

pub fn count_entries(blob: &[u8]) -> usize {
    Entries::new(blob).filter(Result::is_ok).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Generator, Val};

    fn group(name: &str) -> Key {
        Key::root().resolve_grouped(vec![Val::from(name)])
    }

    fn count_generators(n: i64) -> Vec<Option<Generator>> {
        let mut g = Generator::new(Arc::new(Expression::count()));
        g.set(&[]);
        let mut acc = g.clone();
        for _ in 1..n {
            acc.merge(&g);
        }
        vec![Some(acc)]
    }

    fn expressions() -> Vec<Option<Arc<Expression>>> {
        vec![Some(Arc::new(Expression::count()))]
    }

    #[test]
    fn test_row_keys_sort_by_depth_then_parent() {
        let a = group("A");
        let depth0 = row_key(&Key::root(), &a, &a.to_bytes().unwrap()).unwrap();
        let leaf = a.resolve_ungrouped(1);
        let depth1 = row_key(&a, &leaf, &leaf.to_bytes().unwrap()).unwrap();
        assert!(depth0 < depth1);
        assert!(depth1.starts_with(&child_prefix(&a).unwrap()));
        assert!(depth0.starts_with(&child_prefix(&Key::root()).unwrap()));
    }

    #[test]
    fn test_ungrouped_keys_follow_arrival() {
        let a = group("A");
        let first = row_key(&a, &a.resolve_ungrouped(5), &[]).unwrap();
        let second = row_key(&a, &a.resolve_ungrouped(6), &[]).unwrap();
        assert!(first < second);
        assert!(!is_grouped_row(&first).unwrap());
    }

    #[test]
    fn test_with_unique_id() {
        let a = group("A");
        let key = row_key(&a, &a.resolve_ungrouped(5), &[]).unwrap();
        let replaced = with_unique_id(&key, 77).unwrap();
        assert_eq!(replaced, row_key(&a, &a.resolve_ungrouped(77), &[]).unwrap());
        assert!(matches!(with_unique_id(&[1, 2], 3), Err(LmdbError::MalformedRowKey(2))));
    }

    #[test]
    fn test_merge_same_key() {
        let a = group("A").to_bytes().unwrap();
        let existing = single_entry(10, &a, &count_generators(2)).unwrap();
        let incoming = single_entry(4, &a, &count_generators(3)).unwrap();
        let (merged, appended) = merge_entries(&existing, &incoming, &expressions()).unwrap();
        assert_eq!(appended, 0);

        let entries: Vec<Entry> = Entries::new(&merged).map(Result::unwrap).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sequence, 4);
        let generators = read_generators(&mut Input::new(entries[0].generators), &expressions()).unwrap();
        assert_eq!(generators[0].as_ref().unwrap().eval(), Val::Integer(5));
    }

    #[test]
    fn test_merge_collision_appends() {
        let a = group("A").to_bytes().unwrap();
        let b = group("B").to_bytes().unwrap();
        let existing = single_entry(1, &a, &count_generators(1)).unwrap();
        let incoming = single_entry(2, &b, &count_generators(1)).unwrap();
        let (merged, appended) = merge_entries(&existing, &incoming, &expressions()).unwrap();
        assert_eq!(appended, 1);
        assert_eq!(count_entries(&merged), 2);
    }

    #[test]
    fn test_relocalize_rewrites_leaf_ids() {
        let leaf = group("A").resolve_ungrouped(3);
        let blob = single_entry(1, &leaf.to_bytes().unwrap(), &count_generators(1)).unwrap();
        let rewritten = relocalize(&blob, Some(99)).unwrap();
        let entry = Entries::new(&rewritten).next().unwrap().unwrap();
        assert_eq!(Key::from_bytes(entry.key).unwrap(), group("A").resolve_ungrouped(99));
        assert_ne!(entry.sequence, 1);
    }
}
