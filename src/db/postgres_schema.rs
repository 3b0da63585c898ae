pub const POSTGRES_SCHEMA: &str = r#"
-- PostgreSQL schema for the Veterimap directory

CREATE TABLE IF NOT EXISTS professional_entities (
    id UUID PRIMARY KEY,
    user_id UUID UNIQUE,
    entity_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PROSPECT',
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,

    profile_data JSONB NOT NULL DEFAULT '{}'::jsonb,

    rating DOUBLE PRECISION NOT NULL DEFAULT 0,
    review_count BIGINT NOT NULL DEFAULT 0,

    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    geocode_attempts INTEGER NOT NULL DEFAULT 0,

    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

ALTER TABLE professional_entities
    ADD COLUMN IF NOT EXISTS geocode_attempts INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_entities_ranking
    ON professional_entities(is_active, rating DESC, review_count DESC);
CREATE INDEX IF NOT EXISTS idx_entities_entity_type ON professional_entities(entity_type);
CREATE INDEX IF NOT EXISTS idx_entities_specialties
    ON professional_entities USING GIN ((profile_data->'specialties'));
"#;
