//! Translation between the category labels used by clients and the stored
//! entity types.
//!
//! Clients (the map UI and the imported datasets) name categories after their
//! own collections, e.g. `fichas_clinicas`. Every entry point goes through this
//! table instead of carrying its own copy of the mapping.

use super::EntityType;

const LABELS: &[(&str, EntityType)] = &[
    ("fichas_clinicas", EntityType::Clinic),
    ("fichas_hospitales", EntityType::Hospital),
    ("fichas_veterinarios", EntityType::HomeVet),
    ("fichas_profesionales", EntityType::Individual),
    ("clinics", EntityType::Clinic),
    ("hospitals", EntityType::Hospital),
    ("home_vets", EntityType::HomeVet),
    ("individuals", EntityType::Individual),
];

/// Resolve a client label, or an internal name such as `HOME_VET`, to an entity type.
pub fn entity_type_for_label(label: &str) -> Option<EntityType> {
    let label = label.trim();
    LABELS
        .iter()
        .find(|(l, _)| l.eq_ignore_ascii_case(label))
        .map(|(_, ty)| *ty)
        .or_else(|| EntityType::from_str(label))
}

/// The primary client label of an entity type.
pub fn label_for_entity_type(ty: EntityType) -> &'static str {
    LABELS
        .iter()
        .find(|(_, t)| *t == ty)
        .map(|(l, _)| *l)
        .unwrap_or_else(|| ty.as_str())
}

/// Build the single search tag for a map query.
///
/// Known labels become entity type names and unknown ones pass through untouched.
/// The individual-professional category is too broad on its own, so a specialty
/// replaces it when one is given; a specialty without any category is used as is.
pub fn map_search_tag(category: &str, specialty: &str) -> String {
    let category = category.trim();
    let specialty = specialty.trim();

    let resolved = match entity_type_for_label(category) {
        Some(ty) => Some(ty),
        None if category.is_empty() => None,
        None => return category.to_string(),
    };

    match resolved {
        Some(EntityType::Individual) if !specialty.is_empty() => specialty.to_string(),
        Some(ty) => ty.as_str().to_string(),
        None => specialty.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_labels_resolve() {
        assert_eq!(entity_type_for_label("fichas_clinicas"), Some(EntityType::Clinic));
        assert_eq!(entity_type_for_label("fichas_hospitales"), Some(EntityType::Hospital));
        assert_eq!(entity_type_for_label("fichas_veterinarios"), Some(EntityType::HomeVet));
        assert_eq!(entity_type_for_label("Home_Vets"), Some(EntityType::HomeVet));
        assert_eq!(entity_type_for_label("INDIVIDUAL"), Some(EntityType::Individual));
        assert_eq!(entity_type_for_label("exotic"), None);
    }

    #[test]
    fn test_every_entity_type_has_a_label() {
        for ty in EntityType::ALL {
            let label = label_for_entity_type(ty);
            assert_eq!(entity_type_for_label(label), Some(ty));
        }
    }

    #[test]
    fn test_map_search_tag() {
        assert_eq!(map_search_tag("fichas_clinicas", ""), "CLINIC");
        assert_eq!(map_search_tag("fichas_clinicas", "cardiology"), "CLINIC");
        assert_eq!(map_search_tag("INDIVIDUAL", ""), "INDIVIDUAL");
        assert_eq!(map_search_tag("INDIVIDUAL", "cardiology"), "cardiology");
        assert_eq!(map_search_tag("", "dermatology"), "dermatology");
        assert_eq!(map_search_tag("", ""), "");
        assert_eq!(map_search_tag("exotics", "cardiology"), "exotics");
    }
}
