use crate::types::{PositionSnapshot, TrackedWallet};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tokio_rusqlite::Connection;
use tracing::info;

/// Async wrapper around the tracker's SQLite database.
///
/// All SQLite work runs on the dedicated background thread owned by
/// `tokio_rusqlite`, keeping the Tokio runtime cooperative.
pub struct TrackerDb {
    conn: Connection,
}

impl TrackerDb {
    pub async fn open(path: &str) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create DB directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .await
            .with_context(|| format!("failed to open tracker DB: {path}"))?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to set DB pragmas: {e}"))?;

        let db = Self { conn };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub async fn open_memory() -> Result<Self> {
        let conn = Connection::open(":memory:")
            .await
            .context("failed to open in-memory DB")?;

        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to set pragmas: {e}"))?;

        let db = Self { conn };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Execute a closure on the database connection.
    pub async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        self.conn
            .call(function)
            .await
            .map_err(|e| anyhow::anyhow!("DB call failed: {e}"))
    }

    async fn run_migrations(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                run_migrations_sync(conn)?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| anyhow::anyhow!("failed to run tracker DB migrations: {e}"))?;
        info!("tracker DB migrations complete");
        Ok(())
    }

    /// Insert or replace a tracked wallet.
    pub async fn upsert_wallet(&self, wallet: TrackedWallet) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO wallets (address, name, added_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(address) DO UPDATE SET name = ?2, updated_at = ?3",
                rusqlite::params![wallet.address, wallet.name, now],
            )?;
            Ok(())
        })
        .await
        .context("failed to upsert wallet")
    }

    /// Delete a wallet; its snapshot rows go with it (FK cascade).
    /// Returns false when no such wallet existed.
    pub async fn remove_wallet(&self, address: &str) -> Result<bool> {
        let addr = address.to_string();
        let changed = self
            .call(move |conn| conn.execute("DELETE FROM wallets WHERE address = ?1", [addr]))
            .await
            .context("failed to remove wallet")?;
        Ok(changed > 0)
    }

    pub async fn list_wallets(&self) -> Result<Vec<TrackedWallet>> {
        self.call(|conn| {
            let mut stmt = conn.prepare("SELECT address, name FROM wallets ORDER BY added_at")?;
            let wallets = stmt
                .query_map([], |row| {
                    Ok(TrackedWallet {
                        address: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(wallets)
        })
        .await
        .context("failed to list wallets")
    }

    /// Find a wallet by exact address or case-insensitive substring of
    /// its display name.
    pub async fn find_wallet(&self, query: &str) -> Result<Option<TrackedWallet>> {
        let q = query.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT address, name FROM wallets
                 WHERE address = ?1 OR instr(lower(name), lower(?1)) > 0
                 ORDER BY added_at LIMIT 1",
            )?;
            let mut rows = stmt.query_map([q], |row| {
                Ok(TrackedWallet {
                    address: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            rows.next().transpose()
        })
        .await
        .context("failed to find wallet")
    }

    /// Load the stored snapshot for a wallet, keyed by asset id.
    pub async fn load_snapshot(&self, address: &str) -> Result<HashMap<String, PositionSnapshot>> {
        let addr = address.to_string();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT asset, size, avg_price, title, outcome, slug, condition_id, event_id
                 FROM positions WHERE address = ?1",
            )?;
            let rows = stmt
                .query_map([addr], |row| {
                    Ok(PositionSnapshot {
                        asset: row.get(0)?,
                        size: row.get(1)?,
                        avg_price: row.get(2)?,
                        title: row.get(3)?,
                        outcome: row.get(4)?,
                        slug: row.get(5)?,
                        condition_id: row.get(6)?,
                        event_id: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(|p| (p.asset.clone(), p)).collect())
        })
        .await
        .context("failed to load snapshot")
    }

    /// Apply one reconciliation's snapshot changes in a single transaction.
    pub async fn apply_snapshot_changes(
        &self,
        address: &str,
        upserts: Vec<PositionSnapshot>,
        removals: Vec<String>,
    ) -> Result<()> {
        let addr = address.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            for p in upserts {
                upsert_position_sync(&tx, &addr, &p, &now)?;
            }
            for asset in removals {
                tx.execute(
                    "DELETE FROM positions WHERE asset = ?1 AND address = ?2",
                    rusqlite::params![asset, addr],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .context("failed to apply snapshot changes")
    }

    /// Replace a wallet's entire snapshot (used by the initial seed on add).
    pub async fn seed_snapshot(
        &self,
        address: &str,
        positions: Vec<PositionSnapshot>,
    ) -> Result<()> {
        let addr = address.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM positions WHERE address = ?1", [&addr])?;
            for p in positions {
                upsert_position_sync(&tx, &addr, &p, &now)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .context("failed to seed snapshot")
    }
}

fn upsert_position_sync(
    conn: &rusqlite::Connection,
    address: &str,
    p: &PositionSnapshot,
    now: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO positions
             (asset, address, size, avg_price, title, outcome, slug, condition_id, event_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(asset, address) DO UPDATE SET
             size = ?3, avg_price = ?4, title = ?5, outcome = ?6, slug = ?7,
             condition_id = ?8, event_id = ?9, updated_at = ?10",
        rusqlite::params![
            p.asset,
            address,
            p.size,
            p.avg_price,
            p.title,
            p.outcome,
            p.slug,
            p.condition_id,
            p.event_id,
            now,
        ],
    )?;
    Ok(())
}

fn run_migrations_sync(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );",
    )?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let migrations: Vec<(&str, &str)> = vec![
        ("001", include_str!("../migrations/001_initial.sql")),
        ("002", include_str!("../migrations/002_market_links.sql")),
    ];

    for (i, (_name, sql)) in migrations.iter().enumerate() {
        let version = (i + 1) as i64;
        if version > current_version {
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [version],
            )?;
        }
    }

    Ok(())
}
