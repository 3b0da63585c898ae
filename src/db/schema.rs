pub const SCHEMA: &str = r#"
-- Directory entries: clinics, hospitals and individual professionals
CREATE TABLE IF NOT EXISTS professional_entities (
    id TEXT PRIMARY KEY,
    user_id TEXT UNIQUE,
    entity_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PROSPECT',
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,

    -- Typed profile document (addresses, contact, specialties, hours...) as JSON
    profile_data TEXT NOT NULL DEFAULT '{}',

    -- Ranking inputs
    rating REAL NOT NULL DEFAULT 0,
    review_count INTEGER NOT NULL DEFAULT 0,

    is_active INTEGER NOT NULL DEFAULT 1,

    -- Failed geocoding attempts; rotates unresolvable entries to the back of the scan
    geocode_attempts INTEGER NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_entities_ranking
    ON professional_entities(is_active, rating DESC, review_count DESC);
CREATE INDEX IF NOT EXISTS idx_entities_entity_type ON professional_entities(entity_type);
"#;
