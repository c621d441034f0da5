//! Diagnostics log schema, embedded at build time
//!
//! Applied in order by `LoggingService::open`; each name is recorded in
//! `sys_migrations` once applied. Add new files at the end, never edit an
//! applied one.

/// Creates `sys_migrations` itself; safe to run on every open
pub const MIGRATIONS_TABLE: &str = "000_migrations.sql";

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    (MIGRATIONS_TABLE, include_str!("000_migrations.sql")),
    ("001_diagnostics.sql", include_str!("001_diagnostics.sql")),
];
