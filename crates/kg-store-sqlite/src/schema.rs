//! SQL schema for the knowledge-graph SQLite store.
//!
//! Executed at every connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS entities (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    name           TEXT    NOT NULL,
    name_key       TEXT    NOT NULL,   -- lowercased name; uniqueness key
    type           TEXT    NOT NULL CHECK (type IN (
                     'person', 'org', 'project', 'place', 'event', 'topic', 'skill'
                   )),
    metadata       TEXT    NOT NULL DEFAULT '{}',
    notes          TEXT    NOT NULL DEFAULT '',
    confidence     REAL    NOT NULL DEFAULT 0.8
                     CHECK (confidence >= 0 AND confidence <= 1),
    mention_count  INTEGER NOT NULL DEFAULT 1,
    first_seen     TEXT    NOT NULL,   -- RFC 3339 UTC, fixed width
    last_seen      TEXT    NOT NULL,
    last_mentioned TEXT    NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS entities_name_type_idx ON entities(name_key, type);
CREATE INDEX IF NOT EXISTS entities_type_idx           ON entities(type);
CREATE INDEX IF NOT EXISTS entities_mentioned_idx      ON entities(last_mentioned);

-- Text index over name + notes. External content: the rows live in
-- `entities`; the triggers below keep the index in the same transaction.
CREATE VIRTUAL TABLE IF NOT EXISTS entities_fts USING fts5(
    name, notes,
    content = 'entities', content_rowid = 'id',
    tokenize = 'unicode61 remove_diacritics 2'
);

CREATE TRIGGER IF NOT EXISTS entities_fts_ai AFTER INSERT ON entities BEGIN
    INSERT INTO entities_fts(rowid, name, notes) VALUES (new.id, new.name, new.notes);
END;

CREATE TRIGGER IF NOT EXISTS entities_fts_ad AFTER DELETE ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, notes)
    VALUES ('delete', old.id, old.name, old.notes);
END;

CREATE TRIGGER IF NOT EXISTS entities_fts_au AFTER UPDATE OF name, notes ON entities BEGIN
    INSERT INTO entities_fts(entities_fts, rowid, name, notes)
    VALUES ('delete', old.id, old.name, old.notes);
    INSERT INTO entities_fts(rowid, name, notes) VALUES (new.id, new.name, new.notes);
END;

CREATE TABLE IF NOT EXISTS relations (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id      INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    target_id      INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    type           TEXT    NOT NULL,
    strength       REAL    NOT NULL DEFAULT 0.5 CHECK (strength >= 0 AND strength <= 1),
    bidirectional  INTEGER NOT NULL DEFAULT 0,
    metadata       TEXT    NOT NULL DEFAULT '{}',
    last_confirmed TEXT    NOT NULL,
    UNIQUE (source_id, target_id, type),
    CHECK  (source_id != target_id)
);

CREATE INDEX IF NOT EXISTS relations_source_idx ON relations(source_id);
CREATE INDEX IF NOT EXISTS relations_target_idx ON relations(target_id);
CREATE INDEX IF NOT EXISTS relations_type_idx   ON relations(type);

-- Audit trail. Ids are deliberately not foreign keys so entries outlive
-- the rows they describe.
CREATE TABLE IF NOT EXISTS changelog (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    ts          TEXT    NOT NULL,
    action      TEXT    NOT NULL,
    entity_id   INTEGER,
    relation_id INTEGER,
    detail      TEXT    NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS changelog_ts_idx ON changelog(ts);

PRAGMA user_version = 1;
";
