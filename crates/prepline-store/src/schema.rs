//! Relational schema
//!
//! Every statement is idempotent so [`SCHEMA`] runs on each open.

/// Connection pragmas applied before the schema.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 10000;
";

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS harvest_windows (
    provider        TEXT NOT NULL,
    date            TEXT NOT NULL,
    status          TEXT NOT NULL,
    record_count    INTEGER NOT NULL DEFAULT 0,
    pages           INTEGER NOT NULL DEFAULT 0,
    last_attempt_at TEXT,
    last_error      TEXT,
    PRIMARY KEY (provider, date)
);
CREATE INDEX IF NOT EXISTS idx_harvest_windows_status ON harvest_windows(status);

CREATE TABLE IF NOT EXISTS raw_data (
    record_id    TEXT NOT NULL,
    window_date  TEXT NOT NULL,
    provider     TEXT NOT NULL,
    fetched_at   TEXT NOT NULL,
    path         TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    PRIMARY KEY (record_id, window_date)
);
CREATE INDEX IF NOT EXISTS idx_raw_data_fetched ON raw_data(record_id, fetched_at);

CREATE TABLE IF NOT EXISTS ingest_state (
    record_id   TEXT PRIMARY KEY,
    fetched_at  TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ingest_failures (
    record_id  TEXT PRIMARY KEY,
    fetched_at TEXT NOT NULL,
    path       TEXT NOT NULL,
    error      TEXT NOT NULL,
    failed_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS preprints (
    pk                             INTEGER PRIMARY KEY,
    id                             TEXT NOT NULL UNIQUE,
    base_id                        TEXT NOT NULL,
    version                        INTEGER,
    is_latest_version              INTEGER NOT NULL DEFAULT 1,
    provider                       TEXT,
    title                          TEXT,
    description                    TEXT,
    date_created                   TEXT,
    date_modified                  TEXT,
    date_published                 TEXT,
    original_publication_date      TEXT,
    date_registered                TEXT,
    doi                            TEXT,
    publication_doi                TEXT,
    preprint_doi                   TEXT,
    license                        TEXT,
    download_url                   TEXT,
    is_published                   INTEGER,
    reviews_state                  TEXT,
    has_coi                        INTEGER,
    conflict_of_interest_statement TEXT,
    has_data_links                 INTEGER NOT NULL DEFAULT 0,
    data_links_status              TEXT,
    data_links                     TEXT NOT NULL DEFAULT '[]',
    why_no_data                    TEXT,
    has_prereg_links               INTEGER NOT NULL DEFAULT 0,
    prereg_links_status            TEXT,
    prereg_links                   TEXT NOT NULL DEFAULT '[]',
    why_no_prereg                  TEXT,
    prereg_link_info               TEXT,
    tags                           TEXT NOT NULL DEFAULT '[]',
    subjects                       TEXT NOT NULL DEFAULT '[]',
    contributors_list              TEXT,
    first_author                   TEXT
);
CREATE INDEX IF NOT EXISTS idx_preprints_base ON preprints(base_id);
CREATE INDEX IF NOT EXISTS idx_preprints_created ON preprints(date_created);
CREATE INDEX IF NOT EXISTS idx_preprints_modified ON preprints(date_modified);

CREATE TABLE IF NOT EXISTS contributors (
    osf_user_id     TEXT PRIMARY KEY,
    full_name       TEXT,
    given_name      TEXT,
    family_name     TEXT,
    date_registered TEXT,
    orcid           TEXT,
    employment      TEXT,
    education       TEXT,
    profile_url     TEXT
);

CREATE TABLE IF NOT EXISTS preprint_contributors (
    preprint_id  TEXT NOT NULL REFERENCES preprints(id) ON DELETE CASCADE,
    osf_user_id  TEXT NOT NULL REFERENCES contributors(osf_user_id),
    author_index INTEGER NOT NULL,
    bibliographic INTEGER NOT NULL,
    PRIMARY KEY (preprint_id, osf_user_id)
);
CREATE INDEX IF NOT EXISTS idx_preprint_contributors_user ON preprint_contributors(osf_user_id);

CREATE TABLE IF NOT EXISTS subjects (
    id   TEXT PRIMARY KEY,
    text TEXT
);

CREATE TABLE IF NOT EXISTS preprint_subjects (
    preprint_id TEXT NOT NULL REFERENCES preprints(id) ON DELETE CASCADE,
    subject_id  TEXT NOT NULL REFERENCES subjects(id),
    position    INTEGER NOT NULL,
    PRIMARY KEY (preprint_id, subject_id)
);
CREATE INDEX IF NOT EXISTS idx_preprint_subjects_subject ON preprint_subjects(subject_id);

CREATE VIEW IF NOT EXISTS preprints_ui AS
SELECT
    p.id,
    p.base_id,
    p.version,
    p.is_latest_version,
    p.provider,
    p.title,
    p.description,
    p.date_created,
    p.date_modified,
    p.date_published,
    p.doi,
    p.publication_doi,
    p.preprint_doi,
    p.license,
    p.download_url,
    p.contributors_list,
    p.first_author,
    (SELECT COUNT(*) FROM preprint_contributors pc WHERE pc.preprint_id = p.id) AS contributor_count,
    (SELECT group_concat(text, '; ') FROM (
        SELECT s.text AS text FROM preprint_subjects ps
        JOIN subjects s ON s.id = ps.subject_id
        WHERE ps.preprint_id = p.id
        ORDER BY ps.position
    )) AS subjects_list,
    (SELECT group_concat(value, '; ') FROM json_each(p.tags)) AS tags_list,
    p.has_data_links,
    p.data_links_status,
    p.has_prereg_links,
    p.is_published,
    p.reviews_state,
    p.has_coi
FROM preprints p;

CREATE VIRTUAL TABLE IF NOT EXISTS preprints_fts USING fts5(
    title, description, contributors_list,
    content = 'preprints', content_rowid = 'pk'
);

CREATE TRIGGER IF NOT EXISTS preprints_fts_ai AFTER INSERT ON preprints BEGIN
    INSERT INTO preprints_fts(rowid, title, description, contributors_list)
    VALUES (new.pk, new.title, new.description, new.contributors_list);
END;

CREATE TRIGGER IF NOT EXISTS preprints_fts_ad AFTER DELETE ON preprints BEGIN
    INSERT INTO preprints_fts(preprints_fts, rowid, title, description, contributors_list)
    VALUES ('delete', old.pk, old.title, old.description, old.contributors_list);
END;

CREATE TRIGGER IF NOT EXISTS preprints_fts_au AFTER UPDATE OF title, description, contributors_list ON preprints BEGIN
    INSERT INTO preprints_fts(preprints_fts, rowid, title, description, contributors_list)
    VALUES ('delete', old.pk, old.title, old.description, old.contributors_list);
    INSERT INTO preprints_fts(rowid, title, description, contributors_list)
    VALUES (new.pk, new.title, new.description, new.contributors_list);
END;
";
