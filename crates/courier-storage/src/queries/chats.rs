// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chats, chat membership, and the denormalized message pointers.

use chrono::Utc;
use courier_core::{Chat, ChatCache, CourierError, Platform};
use rusqlite::{OptionalExtension, Row, params};

use super::{enum_col, fmt_ts, ts_col};
use crate::database::{Database, map_tr_err};

const CHAT_COLUMNS: &str = "platform, id, channel_id, name, is_private, is_archived,
     first_message_id, last_message_id, first_incoming_message_id,
     last_incoming_message_id, first_outgoing_message_id, last_outgoing_message_id,
     created_at";

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        platform: enum_col(row, 0)?,
        id: row.get(1)?,
        channel_id: row.get(2)?,
        name: row.get(3)?,
        is_private: row.get(4)?,
        is_archived: row.get(5)?,
        cache: ChatCache {
            first_message_id: row.get(6)?,
            last_message_id: row.get(7)?,
            first_incoming_message_id: row.get(8)?,
            last_incoming_message_id: row.get(9)?,
            first_outgoing_message_id: row.get(10)?,
            last_outgoing_message_id: row.get(11)?,
        },
        created_at: ts_col(row, 12)?,
    })
}

fn select_chat(
    conn: &rusqlite::Connection,
    platform: &str,
    id: &str,
) -> rusqlite::Result<Option<Chat>> {
    conn.query_row(
        &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE platform = ?1 AND id = ?2"),
        params![platform, id],
        chat_from_row,
    )
    .optional()
}

/// Recompute the six cache pointers of a chat in place.
///
/// Ordering matches [`ChatCache::from_messages`]: timestamp, then id.
pub(crate) fn refresh_cache_in(
    conn: &rusqlite::Connection,
    platform: &str,
    chat_id: &str,
) -> rusqlite::Result<ChatCache> {
    const PICK: &str = "SELECT id FROM messages WHERE platform = ?1 AND chat_id = ?2";
    conn.execute(
        &format!(
            "UPDATE chats SET
                first_message_id = ({PICK} ORDER BY timestamp ASC, id ASC LIMIT 1),
                last_message_id = ({PICK} ORDER BY timestamp DESC, id DESC LIMIT 1),
                first_incoming_message_id =
                    ({PICK} AND direction = 'incoming' ORDER BY timestamp ASC, id ASC LIMIT 1),
                last_incoming_message_id =
                    ({PICK} AND direction = 'incoming' ORDER BY timestamp DESC, id DESC LIMIT 1),
                first_outgoing_message_id =
                    ({PICK} AND direction = 'outgoing' ORDER BY timestamp ASC, id ASC LIMIT 1),
                last_outgoing_message_id =
                    ({PICK} AND direction = 'outgoing' ORDER BY timestamp DESC, id DESC LIMIT 1)
             WHERE platform = ?1 AND id = ?2"
        ),
        params![platform, chat_id],
    )?;
    Ok(select_chat(conn, platform, chat_id)?
        .map(|chat| chat.cache)
        .unwrap_or_default())
}

pub async fn get_chat(
    db: &Database,
    platform: Platform,
    id: &str,
) -> Result<Option<Chat>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_chat(conn, &platform.to_string(), &id))
        .await
        .map_err(map_tr_err)
}

/// Insert the chat unless it exists. An existing chat keeps its name.
pub async fn get_or_create_chat(db: &Database, chat: Chat) -> Result<(Chat, bool), CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let platform = chat.platform.to_string();
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO chats
                    (platform, id, channel_id, name, is_private, is_archived, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    platform,
                    chat.id,
                    chat.channel_id,
                    chat.name,
                    chat.is_private,
                    chat.is_archived,
                    fmt_ts(&chat.created_at),
                ],
            )?;
            let stored = select_chat(&tx, &platform, &chat.id)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok((stored, inserted > 0))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn add_chat_member(
    db: &Database,
    platform: Platform,
    chat_id: &str,
    account_id: &str,
) -> Result<bool, CourierError> {
    let (chat_id, account_id) = (chat_id.to_string(), account_id.to_string());
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chat_members (platform, chat_id, account_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![platform.to_string(), chat_id, account_id, fmt_ts(&Utc::now())],
            )?;
            Ok(inserted > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn is_chat_member(
    db: &Database,
    platform: Platform,
    chat_id: &str,
    account_id: &str,
) -> Result<bool, CourierError> {
    let (chat_id, account_id) = (chat_id.to_string(), account_id.to_string());
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM chat_members
                    WHERE platform = ?1 AND chat_id = ?2 AND account_id = ?3)",
                params![platform.to_string(), chat_id, account_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn refresh_chat_cache(
    db: &Database,
    platform: Platform,
    chat_id: &str,
) -> Result<ChatCache, CourierError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| refresh_cache_in(conn, &platform.to_string(), &chat_id))
        .await
        .map_err(map_tr_err)
}
