// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRM members that accounts get linked to.

use courier_core::{CourierError, Member};
use rusqlite::{OptionalExtension, Row, params};

use super::{json_col, to_json};
use crate::database::{Database, map_tr_err};

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        group_ids: json_col(row, 4)?,
    })
}

pub async fn get_member(db: &Database, id: &str) -> Result<Option<Member>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, name, email, phone, group_ids FROM members WHERE id = ?1",
                params![id],
                member_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn save_member(db: &Database, member: &Member) -> Result<(), CourierError> {
    let member = member.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO members (id, name, email, phone, group_ids)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    phone = excluded.phone,
                    group_ids = excluded.group_ids",
                params![
                    member.id,
                    member.name,
                    member.email,
                    member.phone,
                    to_json(&member.group_ids)?,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Members matching `email` (case-insensitive) or `phone`. Absent keys match nothing.
pub async fn find_members_by_contact(
    db: &Database,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<Vec<Member>, CourierError> {
    if email.is_none() && phone.is_none() {
        return Ok(Vec::new());
    }
    let (email, phone) = (email.map(str::to_string), phone.map(str::to_string));
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, phone, group_ids FROM members
                 WHERE (?1 IS NOT NULL AND lower(email) = lower(?1))
                    OR (?2 IS NOT NULL AND phone = ?2)
                 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![email, phone], member_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
