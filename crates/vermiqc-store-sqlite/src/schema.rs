//! SQL schema for the QC SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS products (
    code          TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    display_order INTEGER NOT NULL DEFAULT 0,
    active        INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS properties (
    code               TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    unit               TEXT NOT NULL DEFAULT '',
    data_type          TEXT NOT NULL,   -- 'numeric' | 'categorical'
    category           TEXT NOT NULL DEFAULT '',
    test_method        TEXT NOT NULL DEFAULT '',
    display_order      INTEGER NOT NULL DEFAULT 0,
    required_pointwise INTEGER NOT NULL DEFAULT 0,
    required_composite INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS lines (
    code   TEXT PRIMARY KEY,
    name   TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS shifts (
    code          TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    starts_at     TEXT NOT NULL,      -- HH:MM:SS, plant-local
    display_order INTEGER NOT NULL DEFAULT 0
);

-- Specification history. Rows are never deleted; an upsert only closes the
-- active row by setting effective_to.
CREATE TABLE IF NOT EXISTS specifications (
    spec_id        TEXT PRIMARY KEY,
    product        TEXT NOT NULL REFERENCES products(code),
    property       TEXT NOT NULL REFERENCES properties(code),
    limits_json    TEXT NOT NULL,
    effective_from TEXT NOT NULL,     -- RFC 3339 UTC, fixed width
    effective_to   TEXT,              -- NULL while active
    notes          TEXT,
    recorded_at    TEXT NOT NULL,
    UNIQUE (product, property, effective_from)
);

CREATE TABLE IF NOT EXISTS samples (
    sample_id    TEXT PRIMARY KEY,
    date         TEXT NOT NULL,       -- YYYY-MM-DD, declared
    shift        TEXT NOT NULL REFERENCES shifts(code),
    line         TEXT NOT NULL REFERENCES lines(code),
    product      TEXT NOT NULL REFERENCES products(code),
    kind         TEXT NOT NULL,       -- 'POINTWISE' | 'COMPOSITE'
    sequence     INTEGER NOT NULL CHECK (sequence >= 1),
    sample_time  TEXT NOT NULL,
    operator     TEXT NOT NULL DEFAULT '',
    observations TEXT,
    state        TEXT NOT NULL,       -- 'DRAFT' | 'SEALED'
    verdict      TEXT NOT NULL,
    complete     INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    sealed_at    TEXT,
    UNIQUE (date, shift, line, product, kind, sequence)
);

CREATE TABLE IF NOT EXISTS measurements (
    measurement_id TEXT PRIMARY KEY,
    sample_id      TEXT NOT NULL REFERENCES samples(sample_id) ON DELETE CASCADE,
    property       TEXT NOT NULL REFERENCES properties(code),
    value_type     TEXT NOT NULL,     -- 'numeric' | 'categorical'
    value          TEXT NOT NULL,     -- decimal string or token
    unit           TEXT,
    classification TEXT NOT NULL,
    unspecified    INTEGER NOT NULL DEFAULT 0,
    spec_id        TEXT REFERENCES specifications(spec_id),
    recorded_at    TEXT NOT NULL,
    UNIQUE (sample_id, property)
);

-- Last allocated sequence per grouping prefix. Never decremented, so
-- deleting a sample leaves a gap instead of reusing its number.
CREATE TABLE IF NOT EXISTS sequence_counters (
    date          TEXT NOT NULL,
    shift         TEXT NOT NULL,
    line          TEXT NOT NULL,
    product       TEXT NOT NULL,
    kind          TEXT NOT NULL,
    last_sequence INTEGER NOT NULL,
    PRIMARY KEY (date, shift, line, product, kind)
);

CREATE INDEX IF NOT EXISTS specifications_pair_idx
    ON specifications(product, property, effective_from);
CREATE INDEX IF NOT EXISTS samples_date_idx
    ON samples(date, line, product, shift);
CREATE INDEX IF NOT EXISTS samples_verdict_idx ON samples(verdict);
CREATE INDEX IF NOT EXISTS measurements_sample_idx ON measurements(sample_id);

PRAGMA user_version = 1;
";
