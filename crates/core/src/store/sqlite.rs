//! SQLite-backed build metadata store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{BuildStore, PublishedVersion, StoreError};
use crate::build::{
    BuildIdentity, BuildInfo, BuildInfoPatch, BuildLogLine, BuildParameters, BuildRecord,
    BuildState, PluginSlug,
};
use crate::manifest::PluginVersion;

/// SQLite-backed [`BuildStore`].
pub struct SqliteBuildStore {
    conn: Mutex<Connection>,
}

impl SqliteBuildStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            -- Per-plugin build number counter
            CREATE TABLE IF NOT EXISTS build_ids (
                plugin_slug TEXT PRIMARY KEY,
                curr_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS builds (
                plugin_slug TEXT NOT NULL,
                id INTEGER NOT NULL,
                state TEXT NOT NULL,
                build_info TEXT NOT NULL DEFAULT '{}',
                manifest_info TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (plugin_slug, id)
            );

            CREATE INDEX IF NOT EXISTS idx_builds_state ON builds(state);

            CREATE TABLE IF NOT EXISTS build_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                plugin_slug TEXT NOT NULL,
                build_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                line TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_build_logs_build ON build_logs(plugin_slug, build_id);

            -- Manifest identifiers and the plugin that first claimed them
            CREATE TABLE IF NOT EXISTS plugin_identifiers (
                identifier TEXT PRIMARY KEY,
                plugin_slug TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS versions (
                plugin_slug TEXT NOT NULL,
                version_key TEXT NOT NULL,
                version TEXT NOT NULL,
                build_id INTEGER NOT NULL,
                min_host_version TEXT NOT NULL,
                pre_release INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (plugin_slug, version_key)
            );
            "#,
        )?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection lock poisoned".to_string()))
    }

    fn load_build(conn: &Connection, identity: &BuildIdentity) -> Result<BuildRecord, StoreError> {
        let raw = conn
            .query_row(
                "SELECT plugin_slug, id, state, build_info, manifest_info, created_at, updated_at
                 FROM builds WHERE plugin_slug = ?1 AND id = ?2",
                params![identity.plugin_slug.as_str(), identity.build_id],
                RawBuild::from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
        raw.into_record()
    }

    fn load_published(
        conn: &Connection,
        slug: Option<&PluginSlug>,
    ) -> Result<Vec<PublishedVersion>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT v.plugin_slug, v.version, v.build_id, v.min_host_version, v.pre_release,
                    v.updated_at, b.build_info, b.manifest_info
             FROM versions v
             JOIN builds b ON b.plugin_slug = v.plugin_slug AND b.id = v.build_id
             WHERE ?1 IS NULL OR v.plugin_slug = ?1",
        )?;

        let rows = stmt.query_map(params![slug.map(PluginSlug::as_str)], |row| {
            Ok(RawVersion {
                plugin_slug: row.get(0)?,
                version: row.get(1)?,
                build_id: row.get(2)?,
                min_host_version: row.get(3)?,
                pre_release: row.get(4)?,
                updated_at: row.get(5)?,
                build_info: row.get(6)?,
                manifest_info: row.get(7)?,
            })
        })?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?.into_published()?);
        }
        Ok(versions)
    }
}

struct RawBuild {
    plugin_slug: String,
    id: i64,
    state: String,
    build_info: String,
    manifest_info: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawBuild {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            plugin_slug: row.get(0)?,
            id: row.get(1)?,
            state: row.get(2)?,
            build_info: row.get(3)?,
            manifest_info: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<BuildRecord, StoreError> {
        Ok(BuildRecord {
            identity: BuildIdentity::new(parse_slug(&self.plugin_slug)?, self.id),
            state: self.state.parse().map_err(StoreError::Serialization)?,
            build_info: parse_info(&self.build_info)?,
            manifest_info: self
                .manifest_info
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_time(&self.created_at),
            updated_at: parse_time(&self.updated_at),
        })
    }
}

struct RawVersion {
    plugin_slug: String,
    version: String,
    build_id: i64,
    min_host_version: String,
    pre_release: bool,
    updated_at: String,
    build_info: String,
    manifest_info: Option<String>,
}

impl RawVersion {
    fn into_published(self) -> Result<PublishedVersion, StoreError> {
        Ok(PublishedVersion {
            plugin_slug: parse_slug(&self.plugin_slug)?,
            version: parse_version(&self.version)?,
            build_id: self.build_id,
            min_host_version: parse_version(&self.min_host_version)?,
            pre_release: self.pre_release,
            updated_at: parse_time(&self.updated_at),
            build_info: parse_info(&self.build_info)?,
            manifest_info: self
                .manifest_info
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        })
    }
}

fn parse_slug(s: &str) -> Result<PluginSlug, StoreError> {
    PluginSlug::new(s).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_version(s: &str) -> Result<PluginVersion, StoreError> {
    s.parse().map_err(StoreError::Serialization)
}

fn parse_info(s: &str) -> Result<BuildInfo, StoreError> {
    Ok(serde_json::from_str(s)?)
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl BuildStore for SqliteBuildStore {
    fn allocate_build(
        &self,
        slug: &PluginSlug,
        parameters: &BuildParameters,
    ) -> Result<BuildIdentity, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let build_id: i64 = tx.query_row(
            "INSERT INTO build_ids (plugin_slug, curr_id) VALUES (?1, 0)
             ON CONFLICT(plugin_slug) DO UPDATE SET curr_id = curr_id + 1
             RETURNING curr_id",
            params![slug.as_str()],
            |row| row.get(0),
        )?;

        let mut info = BuildInfo::new();
        parameters.to_patch().apply_to(&mut info);
        tx.execute(
            "INSERT INTO builds (plugin_slug, id, state, build_info, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                slug.as_str(),
                build_id,
                BuildState::Queued.as_str(),
                serde_json::to_string(&info)?,
                now
            ],
        )?;
        tx.commit()?;

        Ok(BuildIdentity::new(slug.clone(), build_id))
    }

    fn get_build(&self, identity: &BuildIdentity) -> Result<BuildRecord, StoreError> {
        let conn = self.conn()?;
        Self::load_build(&conn, identity)
    }

    fn list_builds(&self, slug: &PluginSlug, limit: usize) -> Result<Vec<BuildRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT plugin_slug, id, state, build_info, manifest_info, created_at, updated_at
             FROM builds WHERE plugin_slug = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![slug.as_str(), limit], RawBuild::from_row)?;

        let mut builds = Vec::new();
        for row in rows {
            builds.push(row?.into_record()?);
        }
        Ok(builds)
    }

    fn get_build_parameters(
        &self,
        identity: &BuildIdentity,
    ) -> Result<BuildParameters, StoreError> {
        let record = self.get_build(identity)?;
        BuildParameters::from_build_info(&record.build_info).ok_or_else(|| {
            StoreError::Serialization(format!("build {} has no git repository", identity))
        })
    }

    fn update_build(
        &self,
        identity: &BuildIdentity,
        state: BuildState,
        build_info: Option<&BuildInfoPatch>,
        manifest_info: Option<&Value>,
    ) -> Result<(), StoreError> {
        if state == BuildState::Failed
            && build_info
                .and_then(BuildInfoPatch::error)
                .is_none_or(|e| e.trim().is_empty())
        {
            return Err(StoreError::InvalidUpdate(format!(
                "failing build {} requires an error message",
                identity
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let stored: String = tx
            .query_row(
                "SELECT build_info FROM builds WHERE plugin_slug = ?1 AND id = ?2",
                params![identity.plugin_slug.as_str(), identity.build_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;

        let mut document = parse_info(&stored)?;
        if let Some(patch) = build_info {
            patch.apply_to(&mut document);
        }
        let manifest = manifest_info.map(serde_json::to_string).transpose()?;

        tx.execute(
            "UPDATE builds
             SET state = ?1, build_info = ?2, manifest_info = COALESCE(?3, manifest_info), updated_at = ?4
             WHERE plugin_slug = ?5 AND id = ?6",
            params![
                state.as_str(),
                serde_json::to_string(&document)?,
                manifest,
                Utc::now().to_rfc3339(),
                identity.plugin_slug.as_str(),
                identity.build_id
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn append_log(&self, identity: &BuildIdentity, line: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO build_logs (plugin_slug, build_id, timestamp, line) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.plugin_slug.as_str(),
                identity.build_id,
                Utc::now().to_rfc3339(),
                line
            ],
        )?;
        Ok(())
    }

    fn get_logs(&self, identity: &BuildIdentity) -> Result<Vec<BuildLogLine>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT timestamp, line FROM build_logs
             WHERE plugin_slug = ?1 AND build_id = ?2 ORDER BY seq",
        )?;
        let rows = stmt.query_map(
            params![identity.plugin_slug.as_str(), identity.build_id],
            |row| {
                let timestamp: String = row.get(0)?;
                Ok(BuildLogLine {
                    timestamp: parse_time(&timestamp),
                    line: row.get(1)?,
                })
            },
        )?;

        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }

    fn ensure_identifier_ownership(
        &self,
        slug: &PluginSlug,
        identifier: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO plugin_identifiers (identifier, plugin_slug) VALUES (?1, ?2)",
            params![identifier, slug.as_str()],
        )?;
        let owner: String = tx.query_row(
            "SELECT plugin_slug FROM plugin_identifiers WHERE identifier = ?1",
            params![identifier],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(owner == slug.as_str())
    }

    fn register_version(
        &self,
        identity: &BuildIdentity,
        version: &PluginVersion,
        min_host_version: &PluginVersion,
        pre_release: bool,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO versions (plugin_slug, version_key, version, build_id, min_host_version, pre_release, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(plugin_slug, version_key) DO UPDATE SET
                version = excluded.version,
                build_id = excluded.build_id,
                min_host_version = excluded.min_host_version,
                pre_release = excluded.pre_release,
                updated_at = excluded.updated_at",
            params![
                identity.plugin_slug.as_str(),
                version.canonical_key(),
                version.to_string(),
                identity.build_id,
                min_host_version.to_string(),
                pre_release,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn list_versions(&self, slug: &PluginSlug) -> Result<Vec<PublishedVersion>, StoreError> {
        let conn = self.conn()?;
        let mut versions = Self::load_published(&conn, Some(slug))?;
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    fn latest_versions(
        &self,
        host_version: Option<&PluginVersion>,
        include_pre_release: bool,
    ) -> Result<Vec<PublishedVersion>, StoreError> {
        let conn = self.conn()?;
        let candidates = Self::load_published(&conn, None)?;

        let mut latest: HashMap<PluginSlug, PublishedVersion> = HashMap::new();
        for candidate in candidates {
            if candidate.pre_release && !include_pre_release {
                continue;
            }
            if host_version.is_some_and(|host| !candidate.supports_host(host)) {
                continue;
            }
            match latest.get(&candidate.plugin_slug) {
                Some(current) if current.version >= candidate.version => {}
                _ => {
                    latest.insert(candidate.plugin_slug.clone(), candidate);
                }
            }
        }

        let mut versions: Vec<PublishedVersion> = latest.into_values().collect();
        versions.sort_by(|a, b| a.plugin_slug.as_str().cmp(b.plugin_slug.as_str()));
        Ok(versions)
    }
}
