//! Case-insensitive registry search

use crate::property::Property;

/// Filter a view by a free-text term
///
/// Matches the presentation id, address, status label or any feature. An
/// empty term returns the whole view.
#[must_use]
pub fn search<'a>(view: &'a [Property], term: &str, id_prefix: &str) -> Vec<&'a Property> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return view.iter().collect();
    }
    view.iter()
        .filter(|p| {
            p.display_id(id_prefix).to_lowercase().contains(&needle)
                || p.address.to_lowercase().contains(&needle)
                || p.status_kind().label().to_lowercase().contains(&needle)
                || p.features.iter().any(|f| f.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin_catalog;
    use crate::id::DEFAULT_ID_PREFIX;

    #[test]
    fn search_by_prefixed_id() {
        let view = builtin_catalog();
        let hits = search(&view, "#h1235", DEFAULT_ID_PREFIX);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "H1235");
    }

    #[test]
    fn search_by_status_and_feature() {
        let view = builtin_catalog();
        let occupied = search(&view, "occupied", DEFAULT_ID_PREFIX);
        assert!(occupied.iter().all(|p| p.occupant().is_some()));
        assert_eq!(occupied.len(), 2);

        let pets = search(&view, "PET FRIENDLY", DEFAULT_ID_PREFIX);
        assert_eq!(pets.len(), 1);
        assert_eq!(pets[0].id.as_str(), "H1240");
    }

    #[test]
    fn empty_term_returns_everything() {
        let view = builtin_catalog();
        assert_eq!(search(&view, "  ", DEFAULT_ID_PREFIX).len(), view.len());
    }
}
