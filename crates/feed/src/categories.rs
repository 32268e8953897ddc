// ABOUTME: Category taxonomy resolution for Torznab items.
// ABOUTME: Splits raw ids into standard and specific families and picks a primary id for each.

/// Inclusive range of the standard (coarse, shared) category family.
pub const STANDARD_RANGE: std::ops::RangeInclusive<i64> = 1000..=8999;

/// First id of the specific (indexer-defined) category family.
pub const SPECIFIC_MIN: i64 = 10_000;

/// Which numbering family a category id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryFamily {
    Standard,
    Specific,
}

impl CategoryFamily {
    pub fn of(id: i64) -> Option<Self> {
        if STANDARD_RANGE.contains(&id) {
            Some(CategoryFamily::Standard)
        } else if id >= SPECIFIC_MIN {
            Some(CategoryFamily::Specific)
        } else {
            None
        }
    }
}

/// Parent ids are whole thousands; anything else in a family is a child.
pub fn is_parent(id: i64) -> bool {
    id % 1000 == 0
}

/// Result of classifying an item's raw category ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorySelection {
    pub primary_standard: Option<i64>,
    pub primary_specific: Option<i64>,
    /// Specific winner, else standard winner, else the first raw id.
    pub display: Option<i64>,
}

#[derive(Debug, Default)]
struct Candidates {
    parent: Option<i64>,
    child: Option<i64>,
}

impl Candidates {
    fn offer(&mut self, id: i64) {
        let slot = if is_parent(id) {
            &mut self.parent
        } else {
            &mut self.child
        };
        if slot.is_none() {
            *slot = Some(id);
        }
    }

    fn winner(&self) -> Option<i64> {
        self.child.or(self.parent)
    }
}

/// Picks primary ids from raw category ids given in first-seen order.
///
/// Within a family the first parent and first child are kept and the child wins.
/// When several children appear, the earliest one is the primary.
pub fn classify(ids: &[i64]) -> CategorySelection {
    let mut standard = Candidates::default();
    let mut specific = Candidates::default();

    for &id in ids {
        match CategoryFamily::of(id) {
            Some(CategoryFamily::Standard) => standard.offer(id),
            Some(CategoryFamily::Specific) => specific.offer(id),
            None => {}
        }
    }

    let primary_standard = standard.winner();
    let primary_specific = specific.winner();

    CategorySelection {
        primary_standard,
        primary_specific,
        display: primary_specific
            .or(primary_standard)
            .or_else(|| ids.first().copied()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specific_child_beats_specific_parent() {
        let sel = classify(&[100000, 100314]);
        assert_eq!(sel.primary_specific, Some(100314));
        assert_eq!(sel.primary_standard, None);
        assert_eq!(sel.display, Some(100314));
    }

    #[test]
    fn standard_child_alone() {
        let sel = classify(&[2040]);
        assert_eq!(sel.primary_standard, Some(2040));
        assert_eq!(sel.display, Some(2040));
    }

    #[test]
    fn standard_child_beats_parent_regardless_of_order() {
        assert_eq!(classify(&[5000, 5040]).primary_standard, Some(5040));
        assert_eq!(classify(&[5040, 5000]).primary_standard, Some(5040));
    }

    #[test]
    fn parent_only_is_kept() {
        let sel = classify(&[2000]);
        assert_eq!(sel.primary_standard, Some(2000));
    }

    #[test]
    fn first_child_wins_among_children() {
        let sel = classify(&[5040, 5030]);
        assert_eq!(sel.primary_standard, Some(5040));
    }

    #[test]
    fn display_prefers_specific_over_standard() {
        let sel = classify(&[5040, 105040]);
        assert_eq!(sel.primary_standard, Some(5040));
        assert_eq!(sel.primary_specific, Some(105040));
        assert_eq!(sel.display, Some(105040));
    }

    #[test]
    fn display_falls_back_to_first_raw_id() {
        let sel = classify(&[42, 9500]);
        assert_eq!(sel.primary_standard, None);
        assert_eq!(sel.primary_specific, None);
        assert_eq!(sel.display, Some(42));
        assert_eq!(classify(&[]).display, None);
    }

    #[test]
    fn family_boundaries() {
        assert_eq!(CategoryFamily::of(999), None);
        assert_eq!(CategoryFamily::of(1000), Some(CategoryFamily::Standard));
        assert_eq!(CategoryFamily::of(8999), Some(CategoryFamily::Standard));
        assert_eq!(CategoryFamily::of(9000), None);
        assert_eq!(CategoryFamily::of(10000), Some(CategoryFamily::Specific));
    }
}
