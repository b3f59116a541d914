// src/platform/sqlite.rs
//! SQLCipher-backed item store and settings
//!
//! One encrypted database holds the items, the KEK material and the
//! settings. Everything in it is protected by the database passphrase only,
//! so key material that asks for user authentication is refused.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::access_control::ResolvedAccessControl;
use crate::aliases::Kek32;
use crate::consts::{DB_KDF_ITERATIONS, KEK_LEN};
use crate::enums::Backend;
use crate::error::{PlatformError, Result as CoreResult};
use crate::metadata::StorageItemMetadata;

use super::{AuthContext, RawItem, SecureItemStore, SettingsStore};

pub struct SqliteItemStore {
    conn: Mutex<Connection>,
}

impl SqliteItemStore {
    /// Open (or create) the store at `path`, keyed with `passphrase`
    pub fn open(path: impl AsRef<Path>, passphrase: &str) -> CoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, passphrase)
    }

    pub fn open_in_memory(passphrase: &str) -> CoreResult<Self> {
        Self::init(Connection::open_in_memory()?, passphrase)
    }

    fn init(conn: Connection, passphrase: &str) -> CoreResult<Self> {
        let key = passphrase.replace('\'', "''");
        conn.execute_batch(&format!("PRAGMA key = '{key}';"))?;
        conn.execute_batch(&format!(
            r#"
            PRAGMA cipher_page_size = 4096;
            PRAGMA kdf_iter = {DB_KDF_ITERATIONS};
            PRAGMA cipher_hmac_algorithm = HMAC_SHA512;
            PRAGMA cipher_kdf_algorithm = PBKDF2_HMAC_SHA512;
            PRAGMA cipher_plaintext_header_size = 0;

            CREATE TABLE IF NOT EXISTS items (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                encrypted_value TEXT NOT NULL,
                metadata TEXT NOT NULL,
                key_version_id TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_items_key_version ON items(key_version_id);

            CREATE TABLE IF NOT EXISTS key_material (
                version_id TEXT PRIMARY KEY,
                material BLOB NOT NULL,
                security_level TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#
        ))?;
        debug!("sqlcipher store ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn db_err(err: rusqlite::Error) -> PlatformError {
    PlatformError::Other(format!("database: {err}"))
}

fn to_item(
    namespace: &str,
    key: String,
    encrypted_value: String,
    metadata: &str,
) -> Result<RawItem, PlatformError> {
    let metadata: StorageItemMetadata = serde_json::from_str(metadata)
        .map_err(|e| PlatformError::Other(format!("item `{key}` metadata: {e}")))?;
    Ok(RawItem {
        key,
        namespace: namespace.to_owned(),
        encrypted_value,
        metadata,
    })
}

impl SecureItemStore for SqliteItemStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn get_all_raw(&self, namespace: &str) -> Result<Vec<RawItem>, PlatformError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT key, encrypted_value, metadata FROM items
                 WHERE namespace = ?1 ORDER BY key",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([namespace], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut items = Vec::new();
        for row in rows {
            let (key, value, metadata) = row.map_err(db_err)?;
            items.push(to_item(namespace, key, value, &metadata)?);
        }
        Ok(items)
    }

    fn referenced_key_versions(&self) -> Result<BTreeSet<String>, PlatformError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT DISTINCT key_version_id FROM items")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<Result<BTreeSet<_>, _>>().map_err(db_err)
    }

    fn get_raw(&self, key: &str, namespace: &str) -> Result<Option<RawItem>, PlatformError> {
        let row = self
            .conn()
            .query_row(
                "SELECT encrypted_value, metadata FROM items WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(db_err)?;
        row.map(|(value, metadata)| to_item(namespace, key.to_owned(), value, &metadata))
            .transpose()
    }

    fn update(
        &self,
        key: &str,
        namespace: &str,
        encrypted_value: &str,
        metadata: &StorageItemMetadata,
    ) -> Result<(), PlatformError> {
        let json = serde_json::to_string(metadata)
            .map_err(|e| PlatformError::Other(format!("item `{key}` metadata: {e}")))?;
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO items
                 (namespace, key, encrypted_value, metadata, key_version_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    namespace,
                    key,
                    encrypted_value,
                    json,
                    metadata.key_version_id,
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn delete(&self, key: &str, namespace: &str) -> Result<bool, PlatformError> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM items WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(db_err)?;
        Ok(removed > 0)
    }

    fn store_key_material(
        &self,
        version_id: &str,
        material: &Kek32,
        protection: &ResolvedAccessControl,
    ) -> Result<(), PlatformError> {
        let level = protection.achieved_security_level;
        if level.requires_authentication() {
            return Err(PlatformError::Rejected(format!(
                "sqlite store cannot enforce {level} protection"
            )));
        }
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO key_material (version_id, material, security_level, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                version_id,
                material.expose_secret() as &[u8],
                level.to_string(),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    fn retrieve_key_material(
        &self,
        version_id: &str,
        auth: &AuthContext,
    ) -> Result<Kek32, PlatformError> {
        auth.ensure_not_cancelled()?;
        let blob: Option<Vec<u8>> = self
            .conn()
            .query_row(
                "SELECT material FROM key_material WHERE version_id = ?1",
                [version_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let blob = blob.ok_or(PlatformError::NotFound)?;
        let bytes: [u8; KEK_LEN] = blob.as_slice().try_into().map_err(|_| {
            PlatformError::Other(format!("key material for `{version_id}` is corrupt"))
        })?;
        Ok(Kek32::new(bytes))
    }

    fn delete_key_material(&self, version_id: &str) -> Result<(), PlatformError> {
        let removed = self
            .conn()
            .execute("DELETE FROM key_material WHERE version_id = ?1", [version_id])
            .map_err(db_err)?;
        if removed == 0 {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }
}

impl SettingsStore for SqliteItemStore {
    fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
        self.conn()
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PlatformError> {
        self.conn()
            .execute("DELETE FROM settings WHERE key = ?1", [key])
            .map_err(db_err)?;
        Ok(())
    }
}
