// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent barcode ticket queue backed by SQLite.
//
// Submitting a structuring job does not run it. The job is stored as a
// ticket and the submitting step reports `Deferred`; a worker later drains
// the queue in submission order and records the terminal status of each
// ticket.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument, warn};

use trennblatt_core::error::{Result, TrennblattError};
use trennblatt_core::types::{BarcodeTicket, StepOutcome, TicketId, TicketStatus};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS tickets (
        id TEXT PRIMARY KEY,
        process_id INTEGER NOT NULL,
        process_name TEXT NOT NULL,
        step_id INTEGER,
        step_name TEXT,
        properties TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        error_message TEXT
    )
"#;

const SELECT_COLUMNS: &str = "SELECT id, process_id, process_name, step_id, step_name, \
     properties, status, created_at, updated_at, error_message FROM tickets";

/// Queue of barcode tickets.
///
/// Synchronous like `rusqlite` itself; from async code wrap calls in
/// `tokio::task::spawn_blocking`.
pub struct TicketQueue {
    conn: Connection,
}

impl TicketQueue {
    /// Open (or create) the queue database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| TrennblattError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| TrennblattError::Database(format!("WAL pragma: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| TrennblattError::Database(format!("create table: {e}")))?;

        let queue = Self { conn };
        let requeued = queue.requeue_interrupted()?;
        info!(requeued, "ticket queue database opened");
        Ok(queue)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| TrennblattError::Database(format!("open in-memory: {e}")))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| TrennblattError::Database(format!("create table: {e}")))?;

        debug!("in-memory ticket queue database opened");
        Ok(Self { conn })
    }

    /// Queue `ticket` for later execution.
    ///
    /// Always reports `Deferred` on success: the structure is built when a
    /// worker picks the ticket up, not now.
    #[instrument(skip(self, ticket), fields(ticket_id = %ticket.id, process = %ticket.process_name))]
    pub fn submit(&self, ticket: &BarcodeTicket) -> Result<StepOutcome> {
        let properties_json = serde_json::to_string(&ticket.properties)
            .map_err(|e| TrennblattError::Database(format!("serialize properties: {e}")))?;
        let status_json = serde_json::to_string(&ticket.status)
            .map_err(|e| TrennblattError::Database(format!("serialize status: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO tickets (id, process_id, process_name, step_id, step_name,
                 properties, status, created_at, updated_at, error_message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    ticket.id.to_string(),
                    ticket.process_id,
                    ticket.process_name,
                    ticket.step_id,
                    ticket.step_name,
                    properties_json,
                    status_json,
                    ticket.created_at.to_rfc3339(),
                    ticket.updated_at.to_rfc3339(),
                    ticket.error_message,
                ],
            )
            .map_err(|e| TrennblattError::Database(format!("insert ticket: {e}")))?;

        info!("ticket submitted");
        Ok(StepOutcome::Deferred)
    }

    /// Set the status (and error message) of a ticket and bump `updated_at`.
    #[instrument(skip(self), fields(ticket_id = %ticket_id))]
    pub fn update_status(
        &self,
        ticket_id: &TicketId,
        status: TicketStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let status_json = serde_json::to_string(&status)
            .map_err(|e| TrennblattError::Database(format!("serialize status: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let rows = self
            .conn
            .execute(
                "UPDATE tickets SET status = ?1, updated_at = ?2, error_message = ?3
                 WHERE id = ?4",
                params![status_json, now, error_message, ticket_id.to_string()],
            )
            .map_err(|e| TrennblattError::Database(format!("update status: {e}")))?;

        if rows == 0 {
            return Err(TrennblattError::TicketNotFound(ticket_id.to_string()));
        }

        debug!(status = ?status, "ticket status updated");
        Ok(())
    }

    #[instrument(skip(self), fields(ticket_id = %ticket_id))]
    pub fn get_ticket(&self, ticket_id: &TicketId) -> Result<Option<BarcodeTicket>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .map_err(|e| TrennblattError::Database(format!("prepare get_ticket: {e}")))?;

        let mut rows = stmt
            .query_map(params![ticket_id.to_string()], row_to_ticket)
            .map_err(|e| TrennblattError::Database(format!("query get_ticket: {e}")))?;

        match rows.next() {
            Some(Ok(ticket)) => Ok(Some(ticket)),
            Some(Err(e)) => Err(TrennblattError::Database(format!("row parse: {e}"))),
            None => Ok(None),
        }
    }

    /// Every ticket, newest first.
    #[instrument(skip(self))]
    pub fn all_tickets(&self) -> Result<Vec<BarcodeTicket>> {
        let tickets = self.query(
            &format!("{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"),
            [],
        )?;
        debug!(count = tickets.len(), "retrieved all tickets");
        Ok(tickets)
    }

    /// Pending tickets in submission order.
    #[instrument(skip(self))]
    pub fn pending_tickets(&self) -> Result<Vec<BarcodeTicket>> {
        let pending_json = serde_json::to_string(&TicketStatus::Pending)
            .map_err(|e| TrennblattError::Database(format!("serialize Pending: {e}")))?;
        let tickets = self.query(
            &format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY created_at ASC, rowid ASC"),
            params![pending_json],
        )?;
        debug!(count = tickets.len(), "retrieved pending tickets");
        Ok(tickets)
    }

    /// Put tickets left `Processing` by a worker that stopped mid-run back to
    /// `Pending`. Returns how many were requeued.
    ///
    /// Called by `open`; only safe while no other worker drains the queue.
    #[instrument(skip(self))]
    pub fn requeue_interrupted(&self) -> Result<usize> {
        let processing_json = serde_json::to_string(&TicketStatus::Processing)
            .map_err(|e| TrennblattError::Database(format!("serialize Processing: {e}")))?;
        let pending_json = serde_json::to_string(&TicketStatus::Pending)
            .map_err(|e| TrennblattError::Database(format!("serialize Pending: {e}")))?;

        let rows = self
            .conn
            .execute(
                "UPDATE tickets SET status = ?1, updated_at = ?2 WHERE status = ?3",
                params![pending_json, Utc::now().to_rfc3339(), processing_json],
            )
            .map_err(|e| TrennblattError::Database(format!("requeue: {e}")))?;

        if rows > 0 {
            warn!(rows, "interrupted tickets requeued");
        }
        Ok(rows)
    }

    /// Remove a ticket. Removing an unknown ticket is not an error.
    #[instrument(skip(self), fields(ticket_id = %ticket_id))]
    pub fn delete_ticket(&self, ticket_id: &TicketId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM tickets WHERE id = ?1",
                params![ticket_id.to_string()],
            )
            .map_err(|e| TrennblattError::Database(format!("delete ticket: {e}")))?;

        info!("ticket deleted");
        Ok(())
    }

    /// Run `handler` on every pending ticket, oldest first.
    ///
    /// Each ticket is marked `Processing` before the handler runs and gets
    /// the status matching the handler's outcome afterwards. A `Deferred`
    /// outcome puts the ticket back to `Pending`. Returns the number of
    /// tickets that reached a terminal status.
    #[instrument(skip_all)]
    pub fn process_pending<F>(&self, mut handler: F) -> Result<usize>
    where
        F: FnMut(&BarcodeTicket) -> StepOutcome,
    {
        let mut completed = 0;
        for ticket in self.pending_tickets()? {
            self.update_status(&ticket.id, TicketStatus::Processing, None)?;
            match handler(&ticket) {
                StepOutcome::Finished => {
                    self.update_status(&ticket.id, TicketStatus::Finished, None)?;
                }
                StepOutcome::Skipped => {
                    self.update_status(&ticket.id, TicketStatus::Skipped, None)?;
                }
                StepOutcome::Error(message) => {
                    warn!(ticket_id = %ticket.id, error = %message, "ticket failed");
                    self.update_status(&ticket.id, TicketStatus::Failed, Some(message.as_str()))?;
                }
                StepOutcome::Deferred => {
                    self.update_status(&ticket.id, TicketStatus::Pending, None)?;
                    continue;
                }
            }
            completed += 1;
        }
        info!(completed, "pending tickets processed");
        Ok(completed)
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<BarcodeTicket>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| TrennblattError::Database(format!("prepare: {e}")))?;

        stmt.query_map(params, row_to_ticket)
            .map_err(|e| TrennblattError::Database(format!("query: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TrennblattError::Database(format!("collect rows: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Column indices follow `SELECT_COLUMNS`.
fn row_to_ticket(row: &rusqlite::Row<'_>) -> rusqlite::Result<BarcodeTicket> {
    let id_str: String = row.get(0)?;
    let properties_json: String = row.get(5)?;
    let status_json: String = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| conversion_error(0, e))?;
    let properties = serde_json::from_str(&properties_json).map_err(|e| conversion_error(5, e))?;
    let status = serde_json::from_str(&status_json).map_err(|e| conversion_error(6, e))?;

    Ok(BarcodeTicket {
        id: TicketId(uuid),
        process_id: row.get(1)?,
        process_name: row.get(2)?,
        step_id: row.get(3)?,
        step_name: row.get(4)?,
        properties,
        status,
        created_at: parse_timestamp(7, &created_at_str)?,
        updated_at: parse_timestamp(8, &updated_at_str)?,
        error_message: row.get(9)?,
    })
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
}
