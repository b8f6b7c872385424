// State store schema. Applied by `Database::run_migrations`.

pub const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");
