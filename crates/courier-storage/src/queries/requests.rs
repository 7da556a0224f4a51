// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Requests and the category tree they are sorted into.

use courier_core::request::{StatusStamps, check_category_placement};
use courier_core::{CourierError, Platform, Request, RequestCategory};
use rusqlite::{OptionalExtension, Row, params};

use super::{enum_col, fmt_opt_ts, fmt_ts, json_col, opt_ts_col, to_json, ts_col};
use crate::database::{Database, map_tr_err};

const REQUEST_COLUMNS: &str = "id, platform, message_id, account_id, channel_id, member_id,
     email, phone, category_id, status, metadata, error,
     pending_at, identifying_at, categorizing_at, queued_at, processing_at,
     completed_at, failed_at, created_at";

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<Request> {
    Ok(Request {
        id: row.get(0)?,
        platform: enum_col(row, 1)?,
        message_id: row.get(2)?,
        account_id: row.get(3)?,
        channel_id: row.get(4)?,
        member_id: row.get(5)?,
        email: row.get(6)?,
        phone: row.get(7)?,
        category_id: row.get(8)?,
        status: enum_col(row, 9)?,
        metadata: json_col(row, 10)?,
        error: row.get(11)?,
        stamps: StatusStamps {
            pending_at: opt_ts_col(row, 12)?,
            identifying_at: opt_ts_col(row, 13)?,
            categorizing_at: opt_ts_col(row, 14)?,
            queued_at: opt_ts_col(row, 15)?,
            processing_at: opt_ts_col(row, 16)?,
            completed_at: opt_ts_col(row, 17)?,
            failed_at: opt_ts_col(row, 18)?,
        },
        created_at: ts_col(row, 19)?,
    })
}

/// Insert a request unless one already exists for `(platform, message_id)`.
pub async fn insert_request(
    db: &Database,
    request: Request,
) -> Result<(Request, bool), CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let platform = request.platform.to_string();
            let s = &request.stamps;
            let inserted = tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO requests ({REQUEST_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
                ),
                params![
                    request.id,
                    platform,
                    request.message_id,
                    request.account_id,
                    request.channel_id,
                    request.member_id,
                    request.email,
                    request.phone,
                    request.category_id,
                    request.status.to_string(),
                    to_json(&request.metadata)?,
                    request.error,
                    fmt_opt_ts(&s.pending_at),
                    fmt_opt_ts(&s.identifying_at),
                    fmt_opt_ts(&s.categorizing_at),
                    fmt_opt_ts(&s.queued_at),
                    fmt_opt_ts(&s.processing_at),
                    fmt_opt_ts(&s.completed_at),
                    fmt_opt_ts(&s.failed_at),
                    fmt_ts(&request.created_at),
                ],
            )?;
            let stored = tx.query_row(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM requests WHERE platform = ?1 AND message_id = ?2"
                ),
                params![platform, request.message_id],
                request_from_row,
            )?;
            tx.commit()?;
            Ok((stored, inserted > 0))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_request(db: &Database, id: &str) -> Result<Option<Request>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"),
                params![id],
                request_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn request_for_message(
    db: &Database,
    platform: Platform,
    message_id: &str,
) -> Result<Option<Request>, CourierError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM requests WHERE platform = ?1 AND message_id = ?2"
                ),
                params![platform.to_string(), message_id],
                request_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Persist the mutable fields of a request.
pub async fn update_request(db: &Database, request: &Request) -> Result<(), CourierError> {
    let request = request.clone();
    let id = request.id.clone();
    let updated = db
        .connection()
        .call(move |conn| {
            let s = &request.stamps;
            conn.execute(
                "UPDATE requests SET member_id = ?2, email = ?3, phone = ?4, category_id = ?5,
                     status = ?6, metadata = ?7, error = ?8,
                     pending_at = ?9, identifying_at = ?10, categorizing_at = ?11,
                     queued_at = ?12, processing_at = ?13, completed_at = ?14, failed_at = ?15
                 WHERE id = ?1",
                params![
                    request.id,
                    request.member_id,
                    request.email,
                    request.phone,
                    request.category_id,
                    request.status.to_string(),
                    to_json(&request.metadata)?,
                    request.error,
                    fmt_opt_ts(&s.pending_at),
                    fmt_opt_ts(&s.identifying_at),
                    fmt_opt_ts(&s.categorizing_at),
                    fmt_opt_ts(&s.queued_at),
                    fmt_opt_ts(&s.processing_at),
                    fmt_opt_ts(&s.completed_at),
                    fmt_opt_ts(&s.failed_at),
                ],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if updated == 0 {
        return Err(CourierError::not_found("request", id));
    }
    Ok(())
}

const CATEGORY_COLUMNS: &str = "id, name, description, parent_id, sequence, is_active, is_public,
     allowed_channels, authorized_members, authorized_groups, handler";

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<RequestCategory> {
    Ok(RequestCategory {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent_id: row.get(3)?,
        sequence: row.get(4)?,
        is_active: row.get(5)?,
        is_public: row.get(6)?,
        allowed_channels: json_col(row, 7)?,
        authorized_members: json_col(row, 8)?,
        authorized_groups: json_col(row, 9)?,
        handler: row.get(10)?,
    })
}

fn all_categories(conn: &rusqlite::Connection) -> rusqlite::Result<Vec<RequestCategory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM request_categories"
    ))?;
    let rows = stmt.query_map([], category_from_row)?;
    rows.collect()
}

pub async fn get_category(
    db: &Database,
    id: &str,
) -> Result<Option<RequestCategory>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CATEGORY_COLUMNS} FROM request_categories WHERE id = ?1"),
                params![id],
                category_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Direct children of `parent_id` (roots when `None`), ordered by sequence.
pub async fn child_categories(
    db: &Database,
    parent_id: Option<&str>,
) -> Result<Vec<RequestCategory>, CourierError> {
    let parent_id = parent_id.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM request_categories
                 WHERE parent_id IS ?1
                 ORDER BY sequence ASC"
            ))?;
            let rows = stmt.query_map(params![parent_id], category_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or update a category after checking its placement in the tree.
pub async fn save_category(db: &Database, category: &RequestCategory) -> Result<(), CourierError> {
    let existing = db
        .connection()
        .call(|conn| all_categories(conn))
        .await
        .map_err(map_tr_err)?;

    if let Some(parent) = &category.parent_id
        && !existing.iter().any(|c| &c.id == parent)
    {
        return Err(CourierError::Validation(format!(
            "parent category `{parent}` does not exist"
        )));
    }
    check_category_placement(category, &existing)?;

    let category = category.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO request_categories ({CATEGORY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        description = excluded.description,
                        parent_id = excluded.parent_id,
                        sequence = excluded.sequence,
                        is_active = excluded.is_active,
                        is_public = excluded.is_public,
                        allowed_channels = excluded.allowed_channels,
                        authorized_members = excluded.authorized_members,
                        authorized_groups = excluded.authorized_groups,
                        handler = excluded.handler"
                ),
                params![
                    category.id,
                    category.name,
                    category.description,
                    category.parent_id,
                    category.sequence,
                    category.is_active,
                    category.is_public,
                    to_json(&category.allowed_channels)?,
                    to_json(&category.authorized_members)?,
                    to_json(&category.authorized_groups)?,
                    category.handler,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
