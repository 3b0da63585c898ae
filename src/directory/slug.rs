//! URL-safe identifiers for directory entries.

/// Map the accented letters common in Spanish and Catalan names to plain ASCII.
fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        _ => c,
    }
}

/// Lowercase, fold accents and collapse every run of other characters into one hyphen.
pub fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(fold_accent)
        .map(|c| match c {
            'a'..='z' | '0'..='9' => c,
            _ => '-',
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Slug for an entry: `name-city` for imported entries, `name` alone otherwise.
pub fn slug_for(name: &str, city: Option<&str>) -> String {
    match city.map(str::trim).filter(|c| !c.is_empty()) {
        Some(city) => slugify(&format!("{} {}", name, city)),
        None => slugify(name),
    }
}
