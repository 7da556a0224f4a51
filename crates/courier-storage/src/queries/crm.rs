// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Communications, per-contact deliveries, and scheduled drafts.

use chrono::{DateTime, Utc};
use courier_core::CourierError;
use courier_core::crm::{
    Communication, CommunicationDelivery, CommunicationTemplate, DraftMessage, DraftStatus,
};
use rusqlite::{OptionalExtension, Row, params};

use super::{enum_col, fmt_opt_ts, fmt_ts, json_col, opt_ts_col, to_json, ts_col};
use crate::database::{Database, map_tr_err};

fn communication_from_row(row: &Row<'_>) -> rusqlite::Result<Communication> {
    Ok(Communication {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        template: CommunicationTemplate {
            content: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
        },
        subject_template: row.get(5)?,
        scheduled_for: opt_ts_col(row, 6)?,
        status: enum_col(row, 7)?,
        initiated_by: row.get(8)?,
    })
}

pub async fn get_communication(
    db: &Database,
    id: &str,
) -> Result<Option<Communication>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, channel_id, template_content, template_title, template_description,
                        subject_template, scheduled_for, status, initiated_by
                 FROM communications WHERE id = ?1",
                params![id],
                communication_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn save_communication(
    db: &Database,
    communication: &Communication,
) -> Result<(), CourierError> {
    let c = communication.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO communications (id, channel_id, template_content, template_title,
                     template_description, subject_template, scheduled_for, status, initiated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    template_content = excluded.template_content,
                    template_title = excluded.template_title,
                    template_description = excluded.template_description,
                    subject_template = excluded.subject_template,
                    scheduled_for = excluded.scheduled_for,
                    status = excluded.status,
                    initiated_by = excluded.initiated_by",
                params![
                    c.id,
                    c.channel_id,
                    c.template.content,
                    c.template.title,
                    c.template.description,
                    c.subject_template,
                    fmt_opt_ts(&c.scheduled_for),
                    c.status.to_string(),
                    c.initiated_by,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn delivery_from_row(row: &Row<'_>) -> rusqlite::Result<CommunicationDelivery> {
    Ok(CommunicationDelivery {
        communication_id: row.get(0)?,
        contact_id: row.get(1)?,
        draft_id: row.get(2)?,
        metadata: json_col(row, 3)?,
    })
}

pub async fn get_or_create_delivery(
    db: &Database,
    communication_id: &str,
    contact_id: &str,
) -> Result<(CommunicationDelivery, bool), CourierError> {
    let fresh = CommunicationDelivery::new(communication_id, contact_id);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO communication_deliveries
                    (communication_id, contact_id, draft_id, metadata)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    fresh.communication_id,
                    fresh.contact_id,
                    fresh.draft_id,
                    to_json(&fresh.metadata)?,
                ],
            )?;
            let stored = tx.query_row(
                "SELECT communication_id, contact_id, draft_id, metadata
                 FROM communication_deliveries
                 WHERE communication_id = ?1 AND contact_id = ?2",
                params![fresh.communication_id, fresh.contact_id],
                delivery_from_row,
            )?;
            tx.commit()?;
            Ok((stored, inserted > 0))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn save_delivery(
    db: &Database,
    delivery: &CommunicationDelivery,
) -> Result<(), CourierError> {
    let d = delivery.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO communication_deliveries
                    (communication_id, contact_id, draft_id, metadata)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(communication_id, contact_id) DO UPDATE SET
                    draft_id = excluded.draft_id,
                    metadata = excluded.metadata",
                params![
                    d.communication_id,
                    d.contact_id,
                    d.draft_id,
                    to_json(&d.metadata)?,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

const DRAFT_COLUMNS: &str = "id, channel_id, to_addrs, subject, html, status, is_approved,
     send_at, created_by, sent_message_id, error";

fn draft_from_row(row: &Row<'_>) -> rusqlite::Result<DraftMessage> {
    Ok(DraftMessage {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        to: json_col(row, 2)?,
        subject: row.get(3)?,
        html: row.get(4)?,
        status: enum_col(row, 5)?,
        is_approved: row.get(6)?,
        send_at: ts_col(row, 7)?,
        created_by: row.get(8)?,
        sent_message_id: row.get(9)?,
        error: row.get(10)?,
    })
}

pub async fn get_draft(db: &Database, id: &str) -> Result<Option<DraftMessage>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {DRAFT_COLUMNS} FROM draft_messages WHERE id = ?1"),
                params![id],
                draft_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn save_draft(db: &Database, draft: &DraftMessage) -> Result<(), CourierError> {
    let d = draft.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO draft_messages ({DRAFT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(id) DO UPDATE SET
                        channel_id = excluded.channel_id,
                        to_addrs = excluded.to_addrs,
                        subject = excluded.subject,
                        html = excluded.html,
                        status = excluded.status,
                        is_approved = excluded.is_approved,
                        send_at = excluded.send_at,
                        created_by = excluded.created_by,
                        sent_message_id = excluded.sent_message_id,
                        error = excluded.error"
                ),
                params![
                    d.id,
                    d.channel_id,
                    to_json(&d.to)?,
                    d.subject,
                    d.html,
                    d.status.to_string(),
                    d.is_approved,
                    fmt_ts(&d.send_at),
                    d.created_by,
                    d.sent_message_id,
                    d.error,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Approved scheduled drafts whose send time has passed, earliest first.
pub async fn due_drafts(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<DraftMessage>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DRAFT_COLUMNS} FROM draft_messages
                 WHERE status = ?1 AND is_approved = 1 AND send_at <= ?2
                 ORDER BY send_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(
                params![DraftStatus::Scheduled.to_string(), fmt_ts(&now)],
                draft_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
