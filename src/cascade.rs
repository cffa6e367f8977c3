//! Term → course → student dropdown dependency.
//!
//! Each level narrows the next one. A selection that is no longer offered by
//! its dropdown falls back to "nothing selected", and everything below it
//! follows.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub term: Option<String>,
    pub course_id: Option<String>,
}

impl FilterSelection {
    pub fn new(term: Option<String>, course_id: Option<String>) -> Self {
        FilterSelection { term, course_id }
    }

    /// Both levels resolved, so the student list can be shown.
    pub fn roster_key(&self) -> Option<(&str, &str)> {
        match (self.term.as_deref(), self.course_id.as_deref()) {
            (Some(t), Some(c)) => Some((t, c)),
            _ => None,
        }
    }
}

/// Drops a term that is not among `terms`. Dropping the term also drops the course.
pub fn resolve_term(selection: FilterSelection, terms: &[String]) -> FilterSelection {
    match selection.term {
        Some(t) if terms.contains(&t) => FilterSelection {
            term: Some(t),
            course_id: selection.course_id,
        },
        _ => FilterSelection::default(),
    }
}

/// Drops a course id that the selected term does not offer.
pub fn resolve_course(selection: FilterSelection, course_ids: &[String]) -> FilterSelection {
    if selection.term.is_none() {
        return FilterSelection::default();
    }
    let course_id = selection.course_id.filter(|c| course_ids.contains(c));
    FilterSelection {
        term: selection.term,
        course_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn known_term_and_course_survive() {
        let sel = FilterSelection::new(Some("Fall".into()), Some("c1".into()));
        let sel = resolve_term(sel, &strs(&["Fall", "Spring"]));
        let sel = resolve_course(sel, &strs(&["c1", "c2"]));
        assert_eq!(sel.roster_key(), Some(("Fall", "c1")));
    }

    #[test]
    fn unknown_term_clears_course_too() {
        let sel = FilterSelection::new(Some("Winter".into()), Some("c1".into()));
        let sel = resolve_term(sel, &strs(&["Fall"]));
        assert_eq!(sel, FilterSelection::default());
        let sel = resolve_course(sel, &strs(&["c1"]));
        assert_eq!(sel.roster_key(), None);
    }

    #[test]
    fn course_not_offered_in_term_is_cleared() {
        let sel = FilterSelection::new(Some("Fall".into()), Some("c9".into()));
        let sel = resolve_term(sel, &strs(&["Fall"]));
        let sel = resolve_course(sel, &strs(&["c1"]));
        assert_eq!(sel.term.as_deref(), Some("Fall"));
        assert_eq!(sel.course_id, None);
        assert_eq!(sel.roster_key(), None);
    }

    #[test]
    fn course_without_term_is_cleared() {
        let sel = FilterSelection::new(None, Some("c1".into()));
        let sel = resolve_course(sel, &strs(&["c1"]));
        assert_eq!(sel, FilterSelection::default());
    }
}
