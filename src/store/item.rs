use crate::expression::{Generator, Selection, Val};

use super::errors::StoreResult;
use super::key::Key;
use super::DataStore;

/// One stored row: its key and one generator per output field.
#[derive(Debug, Clone)]
pub struct Item {
    key: Key,
    generators: Vec<Option<Generator>>,
}

impl Item {
    pub fn new(key: Key, generators: Vec<Option<Generator>>) -> Self {
        Self { key, generators }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Depth of the level this item sits at (root children are depth 0).
    pub fn depth(&self) -> usize {
        self.key.depth().saturating_sub(1)
    }

    pub fn generators(&self) -> &[Option<Generator>] {
        &self.generators
    }

    pub(crate) fn generators_mut(&mut self) -> &mut [Option<Generator>] {
        &mut self.generators
    }

    pub fn into_parts(self) -> (Key, Vec<Option<Generator>>) {
        (self.key, self.generators)
    }

    /// Resolve the value of field `index`.
    ///
    /// Selector fields on grouped items pick from the rows directly beneath
    /// this item, fetched from `store`; with no such rows they fall back to
    /// this item's own value.
    pub fn value(&self, index: usize, store: &dyn DataStore) -> StoreResult<Val> {
        let generator = match self.generators.get(index).and_then(Option::as_ref) {
            Some(generator) => generator,
            None => return Ok(Val::Null),
        };

        let selector = match generator.expression().selector() {
            Some(selector) if self.key.is_grouped() => selector,
            _ => return Ok(generator.eval()),
        };

        let children = store.child_items(&self.key, selector.hint())?;
        if children.is_empty() {
            return Ok(generator.eval());
        }

        Ok(generator.select(&ChildSelection {
            items: &children,
            index,
            store,
        }))
    }
}

struct ChildSelection<'a> {
    items: &'a [Item],
    index: usize,
    store: &'a dyn DataStore,
}

impl Selection for ChildSelection<'_> {
    fn size(&self) -> usize {
        self.items.len()
    }

    fn get(&self, pos: usize) -> Val {
        self.items
            .get(pos)
            .map(|item| item.value(self.index, self.store).unwrap_or_default())
            .unwrap_or_default()
    }
}

/// Ordered, bounded children of one parent key.
#[derive(Debug, Clone, Default)]
pub struct Items {
    items: Vec<Item>,
}

impl Items {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Item] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Item> {
        self.items
    }
}

impl IntoIterator for Items {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Items {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
