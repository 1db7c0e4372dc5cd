use serde::{Deserialize, Serialize};

/// Per-depth maximum child counts.
///
/// The last configured value repeats for deeper levels. An empty list is
/// unbounded at every depth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sizes(Vec<usize>);

impl Sizes {
    pub fn new(sizes: Vec<usize>) -> Self {
        Self(sizes)
    }

    pub fn unlimited() -> Self {
        Self(Vec::new())
    }

    pub fn size(&self, depth: usize) -> usize {
        match self.0.last() {
            None => usize::MAX,
            Some(last) => *self.0.get(depth).unwrap_or(last),
        }
    }

    /// Element-wise minimum of two size lists.
    pub fn min(a: &Sizes, b: &Sizes) -> Sizes {
        let len = a.0.len().max(b.0.len());
        Sizes((0..len).map(|depth| a.size(depth).min(b.size(depth))).collect())
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Sizes {
    fn from(sizes: Vec<usize>) -> Self {
        Self(sizes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_value_repeats() {
        let sizes = Sizes::new(vec![10, 5]);
        assert_eq!(sizes.size(0), 10);
        assert_eq!(sizes.size(1), 5);
        assert_eq!(sizes.size(7), 5);
    }

    #[test]
    fn test_empty_is_unlimited() {
        assert_eq!(Sizes::unlimited().size(0), usize::MAX);
    }

    #[test]
    fn test_min() {
        let user = Sizes::new(vec![3]);
        let defaults = Sizes::new(vec![100, 2, 1]);
        let min = Sizes::min(&user, &defaults);
        assert_eq!(min.as_slice(), &[3, 2, 1]);
        assert_eq!(min.size(9), 1);
    }

    #[test]
    fn test_min_with_unlimited() {
        let min = Sizes::min(&Sizes::unlimited(), &Sizes::new(vec![4]));
        assert_eq!(min.as_slice(), &[4]);
        assert!(Sizes::min(&Sizes::unlimited(), &Sizes::unlimited()).as_slice().is_empty());
    }
}
