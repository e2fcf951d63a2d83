//! SQLite schema definition
//!
//! Timestamps are INTEGER epoch seconds (UTC), so ordering is numeric.
//! Messages and status changes are keyed by (system_id, timestamp) and
//! written with INSERT OR IGNORE; the key doubles as the dedup rule.

pub const SCHEMA: &str = r#"
-- ============================================
-- RAW EVENTS
-- ============================================

-- Visitor messages
CREATE TABLE IF NOT EXISTS messages (
    system_id TEXT NOT NULL,
    from_id TEXT NOT NULL,
    site_id INTEGER NOT NULL,
    timestamp INTEGER NOT NULL,
    PRIMARY KEY(system_id, timestamp)
);

-- Operator presence transitions
CREATE TABLE IF NOT EXISTS status_changes (
    system_id TEXT NOT NULL,
    from_id TEXT NOT NULL,
    site_id INTEGER NOT NULL,
    online BOOLEAN NOT NULL,
    timestamp INTEGER NOT NULL,
    PRIMARY KEY(system_id, timestamp)
);

-- ============================================
-- DERIVED
-- ============================================

-- Every site_id seen in messages or status_changes
CREATE TABLE IF NOT EXISTS sites (
    site_id INTEGER PRIMARY KEY
);

-- One row per message, written once and never updated
CREATE TABLE IF NOT EXISTS classifications (
    message_system_id TEXT NOT NULL,
    message_timestamp INTEGER NOT NULL,
    site_id INTEGER NOT NULL,
    is_chat BOOLEAN NOT NULL,
    PRIMARY KEY(message_system_id, message_timestamp),
    FOREIGN KEY(message_system_id, message_timestamp)
        REFERENCES messages(system_id, timestamp)
);

-- ============================================
-- INDEXES
-- ============================================

-- As-of lookup: latest online status at or before a message
CREATE INDEX IF NOT EXISTS idx_status_site_online_time
    ON status_changes(site_id, online, timestamp DESC);

-- Nearest status at or before a message, any presence
CREATE INDEX IF NOT EXISTS idx_status_site_time
    ON status_changes(site_id, timestamp DESC);

CREATE INDEX IF NOT EXISTS idx_messages_site ON messages(site_id);
CREATE INDEX IF NOT EXISTS idx_classifications_site ON classifications(site_id, is_chat);
"#;
