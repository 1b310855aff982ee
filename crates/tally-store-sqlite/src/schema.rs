//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS companies (
    company_id    TEXT PRIMARY KEY,
    ticker        TEXT NOT NULL,
    exchange      TEXT NOT NULL,
    registrant_id TEXT NOT NULL UNIQUE,
    created_at    TEXT NOT NULL,
    UNIQUE (ticker, exchange)
);

CREATE TABLE IF NOT EXISTS filings (
    filing_id        TEXT PRIMARY KEY,
    company_id       TEXT NOT NULL REFERENCES companies(company_id),
    form_type        TEXT NOT NULL,     -- 'annual' | 'quarterly'
    fiscal_year      INTEGER NOT NULL,
    fiscal_period    TEXT NOT NULL,     -- 'q1'..'q4' | 'full_year'
    fiscal_year_end  TEXT NOT NULL,     -- ISO 8601 date
    filed_date       TEXT NOT NULL,     -- ISO 8601 date
    accession_number TEXT NOT NULL,
    UNIQUE (company_id, accession_number)
);

-- Facts are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS facts (
    fact_id     TEXT PRIMARY KEY,
    filing_id   TEXT NOT NULL REFERENCES filings(filing_id),
    raw_tag     TEXT NOT NULL,
    concept     TEXT,                -- canonical name; NULL if unmapped
    kind        TEXT NOT NULL,       -- 'flow' | 'stock' | 'unknown'
    value       TEXT NOT NULL,       -- decimal as text; no binary floats
    unit        TEXT,
    statement   TEXT,
    period_json TEXT NOT NULL,       -- JSON-encoded ReportedPeriod
    span_json   TEXT,                -- JSON-encoded FiscalSpan or NULL
    recorded_at TEXT NOT NULL        -- ISO 8601 UTC; server-assigned
);

-- Materialized tables, fully owned by the materializer. Rows are replaced
-- wholesale per (company, fiscal year, concept) group, one transaction per
-- replacement.
CREATE TABLE IF NOT EXISTS quarterly_metrics (
    company_id     TEXT NOT NULL,
    fiscal_year    INTEGER NOT NULL,
    quarter        INTEGER NOT NULL,  -- 1..4
    concept        TEXT NOT NULL,
    value          TEXT NOT NULL,
    unit           TEXT,
    derived        INTEGER NOT NULL,  -- 0 | 1
    source_filings TEXT NOT NULL,     -- JSON array of filing ids, sorted
    PRIMARY KEY (company_id, fiscal_year, quarter, concept)
);

CREATE TABLE IF NOT EXISTS yearly_metrics (
    company_id  TEXT NOT NULL,
    fiscal_year INTEGER NOT NULL,
    concept     TEXT NOT NULL,
    value       TEXT NOT NULL,
    unit        TEXT,
    filing_id   TEXT NOT NULL REFERENCES filings(filing_id),
    PRIMARY KEY (company_id, fiscal_year, concept)
);

CREATE INDEX IF NOT EXISTS filings_company_idx
    ON filings(company_id, fiscal_year);
CREATE INDEX IF NOT EXISTS facts_filing_idx
    ON facts(filing_id);
CREATE INDEX IF NOT EXISTS facts_concept_idx
    ON facts(concept);
CREATE INDEX IF NOT EXISTS quarterly_company_concept_idx
    ON quarterly_metrics(company_id, concept, fiscal_year, quarter);

PRAGMA user_version = 1;
";
