//! [`SqliteStore`]: the SQLite implementation of [`GraphStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use kg_core::{
  changelog::ChangelogEntry,
  clock::{Clock, SystemClock},
  entity::{DeletedEntity, EntityDetail, EntityRef, EntityType, EntityUpsert, NewEntity},
  relation::{NewRelation, Relation, RelationId, RelationUpsert},
  snapshot::GraphSnapshot,
  store::{
    EntityQuery, GraphStats, GraphStore, MAX_HOPS, MAX_STALE_DAYS, Neighborhood, QueryPage,
    StaleEntity,
  },
};
use rusqlite::{Connection, TransactionBehavior};

use crate::{Error, Result, ops, schema::SCHEMA, traverse};

/// How long SQLite itself waits on a lock before reporting `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Attempts made on a transaction that keeps hitting lock contention.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff unit; attempt `n` sleeps `n` units before retrying.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A knowledge graph backed by a single SQLite file.
///
/// Cloning is cheap: the connection handle and the clock are both shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and apply the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_clock(path, Arc::new(SystemClock)).await
  }

  pub async fn open_with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, clock };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "store opened");
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with_clock(Arc::new(SystemClock)).await
  }

  pub async fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, clock };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` inside one transaction on the connection thread.
  ///
  /// The transaction commits only if `f` succeeds; any error rolls it back.
  /// Lock contention is retried with linear backoff and, once the attempts
  /// run out, reported as [`Error::Busy`].
  async fn transact<T, F>(&self, op: &'static str, behavior: TransactionBehavior, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn(&Connection, DateTime<Utc>) -> Result<T> + Clone + Send + 'static,
  {
    let now = self.clock.now();
    let mut attempt = 0;
    loop {
      attempt += 1;
      let f = f.clone();
      let outcome = self
        .conn
        .call(move |conn| {
          let tx = conn.transaction_with_behavior(behavior)?;
          match f(&*tx, now) {
            Ok(value) => {
              tx.commit()?;
              Ok(Ok(value))
            }
            Err(e) => Ok(Err(e)),
          }
        })
        .await;

      let result = match outcome {
        Ok(inner) => inner,
        Err(e) => Err(Error::from(e)),
      };
      match result {
        Err(e) if e.is_busy() && attempt < MAX_ATTEMPTS => {
          tracing::warn!(op, attempt, error = %e, "database busy, retrying");
          tokio::time::sleep(RETRY_BACKOFF * attempt).await;
        }
        Err(e) if e.is_busy() => {
          tracing::warn!(op, attempt, error = %e, "database busy, giving up");
          return Err(Error::Busy { op, attempts: attempt });
        }
        other => return other,
      }
    }
  }

  async fn write<T, F>(&self, op: &'static str, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn(&Connection, DateTime<Utc>) -> Result<T> + Clone + Send + 'static,
  {
    self.transact(op, TransactionBehavior::Immediate, f).await
  }

  async fn read<T, F>(&self, op: &'static str, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: Fn(&Connection, DateTime<Utc>) -> Result<T> + Clone + Send + 'static,
  {
    self.transact(op, TransactionBehavior::Deferred, f).await
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  type Error = Error;

  async fn init(&self) -> Result<()> { self.init_schema().await }

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn upsert_entity(&self, input: NewEntity) -> Result<EntityUpsert> {
    let input = input.normalized()?;
    self
      .write("upsert_entity", move |conn, now| ops::upsert_entity(conn, now, &input))
      .await
  }

  async fn get_entity(&self, reference: EntityRef) -> Result<EntityDetail> {
    self
      .read("get_entity", move |conn, _| ops::entity_detail(conn, &reference))
      .await
  }

  async fn delete_entity(&self, reference: EntityRef) -> Result<DeletedEntity> {
    self
      .write("delete_entity", move |conn, now| ops::delete_entity(conn, now, &reference))
      .await
  }

  // ── Relations ─────────────────────────────────────────────────────────────

  async fn upsert_relation(&self, input: NewRelation) -> Result<RelationUpsert> {
    let input = input.normalized()?;
    self
      .write("upsert_relation", move |conn, now| ops::upsert_relation(conn, now, &input))
      .await
  }

  async fn get_relation(&self, id: RelationId) -> Result<Relation> {
    self
      .read("get_relation", move |conn, _| {
        ops::relation_by_id(conn, id)?
          .ok_or_else(|| kg_core::Error::relation_not_found(format!("#{id}")).into())
      })
      .await
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  async fn query(&self, query: &EntityQuery) -> Result<QueryPage> {
    let query = query.clone();
    self
      .read("query", move |conn, _| ops::query(conn, &query))
      .await
  }

  async fn stale(&self, days: u32, entity_type: Option<EntityType>) -> Result<Vec<StaleEntity>> {
    if days > MAX_STALE_DAYS {
      return Err(
        kg_core::Error::validation(format!("days must be at most {MAX_STALE_DAYS}, got {days}"))
          .into(),
      );
    }
    self
      .read("stale", move |conn, now| ops::stale(conn, now, days, entity_type))
      .await
  }

  async fn neighbors(
    &self,
    reference: EntityRef,
    hops: u32,
    filter_type: Option<EntityType>,
  ) -> Result<Neighborhood> {
    if hops == 0 {
      return Err(kg_core::Error::validation("hops must be at least 1").into());
    }
    let hops = hops.min(MAX_HOPS);
    self
      .read("neighbors", move |conn, _| {
        traverse::neighbors(conn, &reference, hops, filter_type)
      })
      .await
  }

  async fn stats(&self) -> Result<GraphStats> {
    self.read("stats", |conn, _| ops::stats(conn)).await
  }

  async fn changelog(&self, limit: usize) -> Result<Vec<ChangelogEntry>> {
    self
      .read("changelog", move |conn, _| ops::recent_changes(conn, limit))
      .await
  }

  async fn snapshot(&self) -> Result<GraphSnapshot> {
    self.read("snapshot", ops::snapshot).await
  }

  fn now(&self) -> DateTime<Utc> { self.clock.now() }
}
