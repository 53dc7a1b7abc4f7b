//! Queue tables and the blocking dequeue function.
//!
//! Messages live in `txqueue_messages`, ordered by `seq`. The dequeue
//! function deletes the oldest unlocked row of a queue inside the caller's
//! transaction and sleeps between attempts while the queue is empty, so the
//! removal only becomes permanent on commit and a rollback puts the row back
//! untouched. Server-side failures are returned in the `errm` column;
//! statement cancellation is not caught and surfaces as SQLSTATE 57014.

use sqlx::postgres::PgPool;
use tracing::{debug, info};
use txqueue::{QueueError, QueueName, TransactionOperation};

use crate::error::{classify, classify_transaction};

/// Serializes concurrent schema installs
const SCHEMA_LOCK_KEY: i64 = 0x7478_7175_6575_6500;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS txqueue_queues (
        name        TEXT PRIMARY KEY,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS txqueue_messages (
        seq          BIGSERIAL PRIMARY KEY,
        id           BYTEA NOT NULL UNIQUE CHECK (octet_length(id) = 16),
        queue_name   TEXT NOT NULL REFERENCES txqueue_queues (name),
        content      TEXT NOT NULL,
        enqueued_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS txqueue_messages_queue_seq
        ON txqueue_messages (queue_name, seq)
    "#,
    r#"
    CREATE OR REPLACE FUNCTION txqueue_dequeue(
        p_queue          TEXT,
        p_poll_seconds   DOUBLE PRECISION,
        OUT msgid        TEXT,
        OUT content      TEXT,
        OUT enqueued_at  TIMESTAMPTZ,
        OUT errm         TEXT
    )
    LANGUAGE plpgsql
    AS $$
    BEGIN
        IF NOT EXISTS (SELECT 1 FROM txqueue_queues q WHERE q.name = p_queue) THEN
            RAISE EXCEPTION 'queue % does not exist', p_queue;
        END IF;

        LOOP
            DELETE FROM txqueue_messages m
            WHERE m.seq = (
                SELECT c.seq
                FROM txqueue_messages c
                WHERE c.queue_name = p_queue
                ORDER BY c.seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING encode(m.id, 'hex'), m.content, m.enqueued_at
            INTO msgid, content, enqueued_at;

            EXIT WHEN FOUND;
            PERFORM pg_sleep(p_poll_seconds);
        END LOOP;
    EXCEPTION
        WHEN OTHERS THEN
            msgid := NULL;
            content := NULL;
            enqueued_at := NULL;
            errm := SQLERRM;
    END;
    $$
    "#,
];

pub(crate) const ENQUEUE: &str =
    "INSERT INTO txqueue_messages (id, queue_name, content) VALUES ($1, $2, $3)";

pub(crate) const DEQUEUE: &str =
    "SELECT msgid, content, enqueued_at, errm FROM txqueue_dequeue($1, $2)";

pub(crate) const BACKEND_PID: &str = "SELECT pg_backend_pid()";

pub(crate) const CANCEL_BACKEND: &str = "SELECT pg_cancel_backend($1)";

// Catalog lookups only, so this never waits on locks held by open dequeues
const SCHEMA_PRESENT: &str = r#"
    SELECT to_regclass('txqueue_queues') IS NOT NULL
       AND to_regclass('txqueue_messages') IS NOT NULL
       AND to_regclass('txqueue_messages_queue_seq') IS NOT NULL
       AND to_regprocedure('txqueue_dequeue(text, double precision)') IS NOT NULL
"#;

const DECLARE_QUEUE: &str =
    "INSERT INTO txqueue_queues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING";

/// Create the queue tables and the dequeue function if they are missing.
///
/// Does nothing when they already exist, so it can run while other clients
/// hold messages in open transactions.
pub async fn install_schema(pool: &PgPool) -> Result<(), QueueError> {
    if schema_present(pool).await? {
        debug!("Queue schema already installed");
        return Ok(());
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| classify_transaction(TransactionOperation::Begin, e))?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

    // Another installer may have finished while this one waited for the lock
    if schema_present(&mut *tx).await? {
        tx.commit()
            .await
            .map_err(|e| classify_transaction(TransactionOperation::Commit, e))?;
        debug!("Queue schema installed concurrently");
        return Ok(());
    }

    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
    }

    tx.commit()
        .await
        .map_err(|e| classify_transaction(TransactionOperation::Commit, e))?;

    info!("Queue schema installed");
    Ok(())
}

async fn schema_present<'e, E>(executor: E) -> Result<bool, QueueError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_scalar::<_, bool>(SCHEMA_PRESENT)
        .fetch_one(executor)
        .await
        .map_err(classify)
}

/// Register `name` so messages can be enqueued to it; declaring twice is a no-op
pub async fn declare_queue(pool: &PgPool, name: &QueueName) -> Result<(), QueueError> {
    sqlx::query(DECLARE_QUEUE)
        .bind(name.as_str())
        .execute(pool)
        .await
        .map_err(classify)?;

    debug!(queue = %name, "Queue declared");
    Ok(())
}
