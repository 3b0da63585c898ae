//! Search filter built from caller input.

/// Name, city and tag constraints of a directory search. `None` means "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub name: Option<String>,
    pub city: Option<String>,
    pub tag: Option<String>,
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Escape LIKE wildcards and wrap the value for a substring match.
fn substring_pattern(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    pattern.push('%');
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl SearchFilter {
    /// Build a filter from raw query values. Blank values are dropped.
    pub fn new(name: &str, city: &str, tag: &str) -> Self {
        Self {
            name: non_blank(name),
            city: non_blank(city),
            tag: non_blank(tag),
        }
    }

    pub fn with_tag(tag: &str) -> Self {
        Self::new("", "", tag)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.city.is_none() && self.tag.is_none()
    }

    /// Case-insensitive substring pattern for the entry name.
    pub fn name_pattern(&self) -> Option<String> {
        self.name.as_deref().map(substring_pattern)
    }

    /// Case-insensitive substring pattern for the city of the first address.
    pub fn city_pattern(&self) -> Option<String> {
        self.city.as_deref().map(substring_pattern)
    }

    /// Exact entity type or specialty.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_values_mean_no_filter() {
        let filter = SearchFilter::new("  ", "", "\t");
        assert!(filter.is_empty());
        assert_eq!(filter.name_pattern(), None);
        assert_eq!(filter.tag(), None);
    }

    #[test]
    fn test_patterns_are_trimmed_and_wrapped() {
        let filter = SearchFilter::new(" Sol ", "Madrid", " CLINIC ");
        assert_eq!(filter.name_pattern().as_deref(), Some("%Sol%"));
        assert_eq!(filter.city_pattern().as_deref(), Some("%Madrid%"));
        assert_eq!(filter.tag(), Some("CLINIC"));
    }

    #[test]
    fn test_wildcards_are_escaped() {
        let filter = SearchFilter::new("100%_vet\\", "", "");
        assert_eq!(filter.name_pattern().as_deref(), Some("%100\\%\\_vet\\\\%"));
    }
}
