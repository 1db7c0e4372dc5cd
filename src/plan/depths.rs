//! Grouping layout by depth
//!
//! Depth `d` is grouped when `d <= max_group_depth`; its key segment is
//! built from the fields whose group depth is exactly `d` (possibly none,
//! which puts every row in one group). The optional detail level sits
//! one below the deepest group and holds ungrouped rows.

use super::fields::CompiledField;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledDepths {
    group_indices: Vec<Vec<usize>>,
    max_group_depth: Option<usize>,
    max_depth: usize,
}

impl CompiledDepths {
    pub fn new(fields: &[CompiledField], show_detail: bool) -> Self {
        let max_group_depth = fields.iter().filter_map(|f| f.group_depth).max();

        let mut group_indices = vec![Vec::new(); max_group_depth.map_or(0, |d| d + 1)];
        for (index, field) in fields.iter().enumerate() {
            if let Some(depth) = field.group_depth {
                group_indices[depth].push(index);
            }
        }

        let max_depth = match max_group_depth {
            None => 0,
            Some(d) if show_detail => d + 1,
            Some(d) => d,
        };

        Self {
            group_indices,
            max_group_depth,
            max_depth,
        }
    }

    pub fn is_grouped(&self, depth: usize) -> bool {
        self.max_group_depth.is_some_and(|max| depth <= max)
    }

    /// Indexes of fields contributing to the key segment at `depth`.
    pub fn group_indices(&self, depth: usize) -> &[usize] {
        self.group_indices.get(depth).map_or(&[], Vec::as_slice)
    }

    pub fn max_group_depth(&self) -> Option<usize> {
        self.max_group_depth
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn has_group(&self) -> bool {
        self.max_group_depth.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::plan::settings::FieldSettings;

    fn field(group: Option<usize>) -> CompiledField {
        let mut settings = FieldSettings::new("f", Expression::field(0));
        settings.group = group;
        CompiledField::compile(&settings).unwrap()
    }

    #[test]
    fn test_no_groups_is_single_detail_level() {
        let depths = CompiledDepths::new(&[field(None), field(None)], true);
        assert_eq!(depths.max_depth(), 0);
        assert!(!depths.is_grouped(0));
        assert!(!depths.has_group());
    }

    #[test]
    fn test_group_with_detail() {
        let depths = CompiledDepths::new(&[field(Some(0)), field(None)], true);
        assert_eq!(depths.max_group_depth(), Some(0));
        assert_eq!(depths.max_depth(), 1);
        assert!(depths.is_grouped(0));
        assert!(!depths.is_grouped(1));
        assert_eq!(depths.group_indices(0), &[0]);
        assert!(depths.group_indices(1).is_empty());
    }

    #[test]
    fn test_group_without_detail() {
        let depths = CompiledDepths::new(&[field(Some(1)), field(Some(0))], false);
        assert_eq!(depths.max_depth(), 1);
        assert_eq!(depths.group_indices(0), &[1]);
        assert_eq!(depths.group_indices(1), &[0]);
    }

    #[test]
    fn test_gap_depth_is_grouped_with_no_fields() {
        let depths = CompiledDepths::new(&[field(Some(2))], false);
        assert!(depths.is_grouped(1));
        assert!(depths.group_indices(1).is_empty());
    }
}
