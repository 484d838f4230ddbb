// ============================================================================
// Rate Limiter
// ============================================================================
//
// Per-key sliding-window rate limiting with exact counting. Each key is
// owned by exactly one actor: a dedicated thread holding a private SQLite
// database of request timestamps. The mailbox serializes operations per key,
// which is what makes the count exact without external locking; different
// keys run fully independently.
//
// The timestamp files survive process restarts, so counters are durable,
// not in-memory-only. Storage failures fail the request closed: the counter
// is the only enforcement point, and admitting traffic on error would
// disable limiting invisibly.
//
// ============================================================================

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot, RwLock};

const MAILBOX_CAPACITY: usize = 64;

/// Outcome of one `check` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch millis. When denied, the moment the oldest counted request
    /// falls out of the window; when allowed, `now + window`.
    pub reset_at: i64,
}

struct CheckRequest {
    max_requests: u32,
    window_seconds: u32,
    reply: oneshot::Sender<Result<RateLimitDecision, String>>,
}

/// Registry of per-key rate limit actors.
///
/// Actors are created lazily on the first request for a key and live for the
/// process lifetime; their state lives on disk under `data_dir`.
pub struct RateLimiterRegistry {
    data_dir: PathBuf,
    actors: RwLock<HashMap<String, mpsc::Sender<CheckRequest>>>,
}

impl RateLimiterRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            actors: RwLock::new(HashMap::new()),
        }
    }

    /// Run one sliding-window check for `key_id`.
    pub async fn check(
        &self,
        key_id: &str,
        max_requests: u32,
        window_seconds: u32,
    ) -> Result<RateLimitDecision, crate::error::GatewayError> {
        let request = |reply| CheckRequest {
            max_requests,
            window_seconds,
            reply,
        };

        let sender = self.actor_for(key_id).await;
        let (reply_tx, reply_rx) = oneshot::channel();
        let receiver = if sender.send(request(reply_tx)).await.is_err() {
            // Actor thread died (e.g. poisoned storage); replace it once.
            let sender = self.respawn(key_id).await;
            let (reply_tx, reply_rx) = oneshot::channel();
            sender
                .send(request(reply_tx))
                .await
                .map_err(|_| crate::error::GatewayError::internal("rate limit actor unavailable"))?;
            reply_rx
        } else {
            reply_rx
        };

        match receiver.await {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(storage_err)) => Err(crate::error::GatewayError::Internal(format!(
                "rate limit storage failure: {}",
                storage_err
            ))),
            Err(_) => Err(crate::error::GatewayError::internal(
                "rate limit actor dropped request",
            )),
        }
    }

    async fn actor_for(&self, key_id: &str) -> mpsc::Sender<CheckRequest> {
        {
            let actors = self.actors.read().await;
            if let Some(sender) = actors.get(key_id) {
                return sender.clone();
            }
        }

        let mut actors = self.actors.write().await;
        // Double-checked under the write lock so only one actor exists per key
        if let Some(sender) = actors.get(key_id) {
            return sender.clone();
        }
        let sender = spawn_actor(&self.data_dir, key_id);
        actors.insert(key_id.to_string(), sender.clone());
        sender
    }

    async fn respawn(&self, key_id: &str) -> mpsc::Sender<CheckRequest> {
        let mut actors = self.actors.write().await;
        let sender = spawn_actor(&self.data_dir, key_id);
        actors.insert(key_id.to_string(), sender.clone());
        sender
    }
}

/// Spawn the actor thread for one key. The thread owns the SQLite connection
/// exclusively; callers reach it only through the mailbox.
fn spawn_actor(data_dir: &Path, key_id: &str) -> mpsc::Sender<CheckRequest> {
    let (tx, mut rx) = mpsc::channel::<CheckRequest>(MAILBOX_CAPACITY);
    let db_path = actor_db_path(data_dir, key_id);
    let key_id = key_id.to_string();

    std::thread::Builder::new()
        .name(format!("rate-limit-{}", &key_id))
        .spawn(move || {
            let conn = match open_store(&db_path) {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!(error = %e, key_id = %key_id, "Failed to open rate limit store");
                    // Refuse every queued request, then let the registry respawn
                    while let Some(req) = rx.blocking_recv() {
                        let _ = req.reply.send(Err(e.to_string()));
                    }
                    return;
                }
            };

            while let Some(req) = rx.blocking_recv() {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let result =
                    check_window(&conn, now_ms, req.max_requests, req.window_seconds)
                        .map_err(|e| e.to_string());
                if let Err(ref e) = result {
                    tracing::error!(error = %e, key_id = %key_id, "Rate limit check failed");
                }
                let _ = req.reply.send(result);
            }
        })
        .expect("failed to spawn rate limit actor thread");

    tx
}

/// Derive the per-key database path. Key ids go through a digest so arbitrary
/// id strings cannot escape the data directory.
fn actor_db_path(data_dir: &Path, key_id: &str) -> PathBuf {
    let digest = Sha256::digest(key_id.as_bytes());
    let mut name = String::with_capacity(32);
    for byte in &digest[..8] {
        name.push_str(&format!("{:02x}", byte));
    }
    data_dir.join(format!("{}.sqlite3", name))
}

/// Open the store and ensure the schema exists. Idempotent.
fn open_store(db_path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS requests (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             timestamp INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_timestamp ON requests(timestamp);",
    )?;
    Ok(conn)
}

/// The sliding-window algorithm: drop timestamps older than the window,
/// count what remains, and either deny (reset when the oldest counted
/// request expires) or record the new request.
fn check_window(
    conn: &Connection,
    now_ms: i64,
    max_requests: u32,
    window_seconds: u32,
) -> rusqlite::Result<RateLimitDecision> {
    let window_ms = i64::from(window_seconds) * 1000;
    let window_start = now_ms - window_ms;

    conn.execute("DELETE FROM requests WHERE timestamp < ?1", [window_start])?;

    let current_count: u32 =
        conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))?;

    if current_count >= max_requests {
        let oldest: i64 = conn.query_row(
            "SELECT COALESCE(MIN(timestamp), ?1) FROM requests",
            [now_ms],
            |row| row.get(0),
        )?;
        return Ok(RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: oldest + window_ms,
        });
    }

    conn.execute("INSERT INTO requests (timestamp) VALUES (?1)", [now_ms])?;

    Ok(RateLimitDecision {
        allowed: true,
        remaining: max_requests - current_count - 1,
        reset_at: now_ms + window_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn six_back_to_back_requests_exhaust_a_window_of_five() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RateLimiterRegistry::new(dir.path());

        let mut allowed = Vec::new();
        let mut remaining = Vec::new();
        for _ in 0..6 {
            let decision = registry.check("key-a", 5, 60).await.unwrap();
            allowed.push(decision.allowed);
            remaining.push(decision.remaining);
        }

        assert_eq!(allowed, vec![true, true, true, true, true, false]);
        assert_eq!(remaining, vec![4, 3, 2, 1, 0, 0]);
    }

    #[tokio::test]
    async fn denied_reset_at_is_when_oldest_request_expires() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RateLimiterRegistry::new(dir.path());

        let first = registry.check("key-b", 1, 60).await.unwrap();
        let before = chrono::Utc::now().timestamp_millis();
        let denied = registry.check("key-b", 1, 60).await.unwrap();

        assert!(first.allowed);
        assert!(!denied.allowed);
        // Reset is anchored on the first (oldest) request, not on "now"
        assert!(denied.reset_at <= first.reset_at);
        assert!(denied.reset_at > before);
    }

    #[tokio::test]
    async fn window_slides_past_old_requests() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RateLimiterRegistry::new(dir.path());

        for _ in 0..3 {
            assert!(registry.check("key-c", 3, 1).await.unwrap().allowed);
        }
        assert!(!registry.check("key-c", 3, 1).await.unwrap().allowed);

        // After the window passes, the earlier timestamps are uncounted
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let decision = registry.check("key-c", 3, 1).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RateLimiterRegistry::new(dir.path());

        assert!(registry.check("key-d", 1, 60).await.unwrap().allowed);
        assert!(!registry.check("key-d", 1, 60).await.unwrap().allowed);
        // A different key has its own untouched window
        assert!(registry.check("key-e", 1, 60).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn counters_survive_a_registry_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let registry = RateLimiterRegistry::new(dir.path());
            assert!(registry.check("key-f", 2, 60).await.unwrap().allowed);
            assert!(registry.check("key-f", 2, 60).await.unwrap().allowed);
        }

        // A fresh registry over the same directory sees the persisted window
        let registry = RateLimiterRegistry::new(dir.path());
        assert!(!registry.check("key-f", 2, 60).await.unwrap().allowed);
    }

    #[test]
    fn db_paths_are_digests_of_the_key_id() {
        let dir = Path::new("/tmp/x");
        let a = actor_db_path(dir, "key-a");
        let b = actor_db_path(dir, "key-b");
        assert_ne!(a, b);
        assert_eq!(a, actor_db_path(dir, "key-a"));
        assert!(a.to_string_lossy().ends_with(".sqlite3"));
        // No raw key material in the filename
        assert!(!a.to_string_lossy().contains("key-a"));
    }
}
