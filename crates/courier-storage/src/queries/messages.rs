// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message rows. Insertion and the owning chat's cache refresh share a transaction.

use chrono::{DateTime, Utc};
use courier_core::{
    CourierError, DeliveryEvent, DeliveryState, MediaBlob, MediaType, Message, Platform, Tracking,
    TrackingEvent,
};
use rusqlite::{OptionalExtension, Row, params};

use super::chats::refresh_cache_in;
use super::{enum_col, fmt_opt_ts, fmt_ts, json_col, opt_ts_col, to_json, ts_col};
use crate::database::{Database, map_tr_err};

const MESSAGE_COLUMNS: &str = "platform, id, channel_id, sender_id, chat_id, direction,
     text, html, subject, to_addrs, cc_addrs, bcc_addrs,
     media_filename, media_content_type, media_data, media_type,
     reply_to_message_id, timestamp,
     sent, delivered, seen, sent_at, delivered_at, seen_at,
     raw, imap_uid, sent_by, tracking_id, opened, link_clicked, opened_at, link_clicked_at";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let media_filename: Option<String> = row.get(12)?;
    let media = match media_filename {
        Some(filename) => Some(MediaBlob {
            filename,
            content_type: row
                .get::<_, Option<String>>(13)?
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            data: row.get::<_, Option<Vec<u8>>>(14)?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Message {
        platform: enum_col(row, 0)?,
        id: row.get(1)?,
        channel_id: row.get(2)?,
        sender_id: row.get(3)?,
        chat_id: row.get(4)?,
        direction: enum_col(row, 5)?,
        text: row.get(6)?,
        html: row.get(7)?,
        subject: row.get(8)?,
        to: json_col(row, 9)?,
        cc: json_col(row, 10)?,
        bcc: json_col(row, 11)?,
        media,
        media_type: enum_col(row, 15)?,
        reply_to_message_id: row.get(16)?,
        timestamp: ts_col(row, 17)?,
        delivery: DeliveryState {
            sent: row.get(18)?,
            delivered: row.get(19)?,
            seen: row.get(20)?,
            sent_at: opt_ts_col(row, 21)?,
            delivered_at: opt_ts_col(row, 22)?,
            seen_at: opt_ts_col(row, 23)?,
        },
        raw: json_col(row, 24)?,
        imap_uid: row.get(25)?,
        sent_by: row.get(26)?,
        tracking: Tracking {
            tracking_id: row.get(27)?,
            opened: row.get(28)?,
            link_clicked: row.get(29)?,
            opened_at: opt_ts_col(row, 30)?,
            link_clicked_at: opt_ts_col(row, 31)?,
        },
    })
}

fn select_message(
    conn: &rusqlite::Connection,
    platform: &str,
    id: &str,
) -> rusqlite::Result<Option<Message>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE platform = ?1 AND id = ?2"),
        params![platform, id],
        message_from_row,
    )
    .optional()
}

pub async fn get_message(
    db: &Database,
    platform: Platform,
    id: &str,
) -> Result<Option<Message>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_message(conn, &platform.to_string(), &id))
        .await
        .map_err(map_tr_err)
}

/// Insert a message unless `(platform, id)` exists, then refresh its chat's cache.
///
/// A duplicate returns the stored row untouched and leaves the cache alone.
pub async fn insert_message(
    db: &Database,
    message: Message,
) -> Result<(Message, bool), CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let platform = message.platform.to_string();
            let (media_filename, media_content_type, media_data) = match &message.media {
                Some(blob) => (
                    Some(blob.filename.as_str()),
                    Some(blob.content_type.as_str()),
                    Some(blob.data.as_slice()),
                ),
                None => (None, None, None),
            };
            let inserted = tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO messages ({MESSAGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
                             ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
                             ?31, ?32)"
                ),
                params![
                    platform,
                    message.id,
                    message.channel_id,
                    message.sender_id,
                    message.chat_id,
                    message.direction.to_string(),
                    message.text,
                    message.html,
                    message.subject,
                    to_json(&message.to)?,
                    to_json(&message.cc)?,
                    to_json(&message.bcc)?,
                    media_filename,
                    media_content_type,
                    media_data,
                    message.media_type.to_string(),
                    message.reply_to_message_id,
                    fmt_ts(&message.timestamp),
                    message.delivery.sent,
                    message.delivery.delivered,
                    message.delivery.seen,
                    fmt_opt_ts(&message.delivery.sent_at),
                    fmt_opt_ts(&message.delivery.delivered_at),
                    fmt_opt_ts(&message.delivery.seen_at),
                    to_json(&message.raw)?,
                    message.imap_uid,
                    message.sent_by,
                    message.tracking.tracking_id,
                    message.tracking.opened,
                    message.tracking.link_clicked,
                    fmt_opt_ts(&message.tracking.opened_at),
                    fmt_opt_ts(&message.tracking.link_clicked_at),
                ],
            )?;

            if inserted > 0 {
                refresh_cache_in(&tx, &platform, &message.chat_id)?;
            }
            let stored = select_message(&tx, &platform, &message.id)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok((stored, inserted > 0))
        })
        .await
        .map_err(map_tr_err)
}

/// All messages of a chat, oldest first.
pub async fn chat_messages(
    db: &Database,
    platform: Platform,
    chat_id: &str,
) -> Result<Vec<Message>, CourierError> {
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE platform = ?1 AND chat_id = ?2
                 ORDER BY timestamp ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![platform.to_string(), chat_id], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Apply a delivery event. Earlier stages are implied; first timestamps are kept.
pub async fn record_delivery(
    db: &Database,
    platform: Platform,
    message_id: &str,
    event: DeliveryEvent,
    at: DateTime<Utc>,
) -> Result<(), CourierError> {
    let id = message_id.to_string();
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let platform = platform.to_string();
            let Some(mut message) = select_message(&tx, &platform, &id)? else {
                return Ok(false);
            };
            message.delivery.apply(event, at);
            let state = &message.delivery;
            tx.execute(
                "UPDATE messages SET sent = ?3, delivered = ?4, seen = ?5,
                     sent_at = ?6, delivered_at = ?7, seen_at = ?8
                 WHERE platform = ?1 AND id = ?2",
                params![
                    platform,
                    id,
                    state.sent,
                    state.delivered,
                    state.seen,
                    fmt_opt_ts(&state.sent_at),
                    fmt_opt_ts(&state.delivered_at),
                    fmt_opt_ts(&state.seen_at),
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)?;
    if !found {
        return Err(CourierError::not_found("message", message_id));
    }
    Ok(())
}

/// Apply an open or click to the message carrying `tracking_id` and return it.
pub async fn record_tracking(
    db: &Database,
    tracking_id: &str,
    event: TrackingEvent,
    at: DateTime<Utc>,
) -> Result<Message, CourierError> {
    let key = tracking_id.to_string();
    let found = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut message) = tx
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE tracking_id = ?1"),
                    params![key],
                    message_from_row,
                )
                .optional()?
            else {
                return Ok(None);
            };
            message.tracking.apply(event, at);
            let tracking = &message.tracking;
            tx.execute(
                "UPDATE messages SET opened = ?2, link_clicked = ?3,
                     opened_at = ?4, link_clicked_at = ?5
                 WHERE tracking_id = ?1",
                params![
                    key,
                    tracking.opened,
                    tracking.link_clicked,
                    fmt_opt_ts(&tracking.opened_at),
                    fmt_opt_ts(&tracking.link_clicked_at),
                ],
            )?;
            tx.commit()?;
            Ok(Some(message))
        })
        .await
        .map_err(map_tr_err)?;
    found.ok_or_else(|| CourierError::not_found("tracked message", tracking_id))
}

pub async fn set_message_media(
    db: &Database,
    platform: Platform,
    message_id: &str,
    media: MediaBlob,
    media_type: MediaType,
) -> Result<(), CourierError> {
    let id = message_id.to_string();
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE messages SET media_filename = ?3, media_content_type = ?4,
                     media_data = ?5, media_type = ?6
                 WHERE platform = ?1 AND id = ?2",
                params![
                    platform.to_string(),
                    id,
                    media.filename,
                    media.content_type,
                    media.data,
                    media_type.to_string(),
                ],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if updated == 0 {
        return Err(CourierError::not_found("message", message_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::chats::{get_chat, get_or_create_chat};
    use chrono::TimeZone;
    use courier_core::{Chat, Direction};

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        get_or_create_chat(&db, Chat::new(Platform::Email, "<root@x>", "support"))
            .await
            .unwrap();
        (db, dir)
    }

    fn message(id: &str, direction: Direction, secs: i64) -> Message {
        let mut m = Message::new(Platform::Email, id, "support", "alice@x", "<root@x>", direction);
        m.timestamp = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        m.text = format!("body of {id}");
        m.to = vec!["support@x".into()];
        m
    }

    #[tokio::test]
    async fn insert_is_idempotent_and_keeps_first_row() {
        let (db, _dir) = setup().await;
        let (stored, created) = insert_message(&db, message("<a@x>", Direction::Incoming, 0))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(stored.to, vec!["support@x".to_string()]);

        let mut dup = message("<a@x>", Direction::Incoming, 0);
        dup.text = "changed".into();
        let (stored, created) = insert_message(&db, dup).await.unwrap();
        assert!(!created);
        assert_eq!(stored.text, "body of <a@x>");
        assert_eq!(chat_messages(&db, Platform::Email, "<root@x>").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cache_follows_timestamps_not_arrival() {
        let (db, _dir) = setup().await;
        insert_message(&db, message("<late@x>", Direction::Outgoing, 50)).await.unwrap();
        insert_message(&db, message("<early@x>", Direction::Incoming, 10)).await.unwrap();
        insert_message(&db, message("<mid@x>", Direction::Incoming, 30)).await.unwrap();

        let chat = get_chat(&db, Platform::Email, "<root@x>").await.unwrap().unwrap();
        assert_eq!(chat.cache.first_message_id.as_deref(), Some("<early@x>"));
        assert_eq!(chat.cache.last_message_id.as_deref(), Some("<late@x>"));
        assert_eq!(chat.cache.last_incoming_message_id.as_deref(), Some("<mid@x>"));
        assert_eq!(chat.cache.first_outgoing_message_id.as_deref(), Some("<late@x>"));

        let ordered: Vec<String> = chat_messages(&db, Platform::Email, "<root@x>")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ordered, vec!["<early@x>", "<mid@x>", "<late@x>"]);
    }

    #[tokio::test]
    async fn refresh_rebuilds_cache_for_messages_stored_before_their_chat() {
        let (db, _dir) = setup().await;
        for (id, direction, secs) in [
            ("<q@x>", Direction::Incoming, 10),
            ("<r@x>", Direction::Outgoing, 20),
        ] {
            let mut m = message(id, direction, secs);
            m.chat_id = "<orphan@x>".into();
            insert_message(&db, m).await.unwrap();
        }
        let (chat, _) = get_or_create_chat(&db, Chat::new(Platform::Email, "<orphan@x>", "support"))
            .await
            .unwrap();
        assert_eq!(chat.cache.last_message_id, None);

        let cache = crate::queries::chats::refresh_chat_cache(&db, Platform::Email, "<orphan@x>")
            .await
            .unwrap();
        assert_eq!(cache.first_message_id.as_deref(), Some("<q@x>"));
        assert_eq!(cache.last_message_id.as_deref(), Some("<r@x>"));
        assert_eq!(cache.last_incoming_message_id.as_deref(), Some("<q@x>"));
        assert_eq!(cache.first_outgoing_message_id.as_deref(), Some("<r@x>"));

        let chat = get_chat(&db, Platform::Email, "<orphan@x>").await.unwrap().unwrap();
        assert_eq!(chat.cache, cache);
    }

    #[tokio::test]
    async fn delivery_events_keep_first_timestamps() {
        let (db, _dir) = setup().await;
        insert_message(&db, message("<out@x>", Direction::Outgoing, 0)).await.unwrap();
        let t1 = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_200, 0).unwrap();
        record_delivery(&db, Platform::Email, "<out@x>", DeliveryEvent::Seen, t1)
            .await
            .unwrap();
        record_delivery(&db, Platform::Email, "<out@x>", DeliveryEvent::Seen, t2)
            .await
            .unwrap();
        let stored = get_message(&db, Platform::Email, "<out@x>").await.unwrap().unwrap();
        assert!(stored.delivery.sent && stored.delivery.delivered && stored.delivery.seen);
        assert_eq!(stored.delivery.seen_at, Some(t1));

        let err = record_delivery(&db, Platform::Email, "<nope@x>", DeliveryEvent::Sent, t1)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NotFound { .. }));
    }

    #[tokio::test]
    async fn opens_and_clicks_are_found_by_tracking_id() {
        let (db, _dir) = setup().await;
        let mut out = message("<tracked@x>", Direction::Outgoing, 0);
        out.tracking.tracking_id = Some("6f1c".into());
        insert_message(&db, out).await.unwrap();

        let t1 = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_200, 0).unwrap();
        let opened = record_tracking(&db, "6f1c", TrackingEvent::Opened, t1).await.unwrap();
        assert_eq!(opened.id, "<tracked@x>");
        assert!(opened.tracking.opened && !opened.tracking.link_clicked);

        record_tracking(&db, "6f1c", TrackingEvent::LinkClicked, t2).await.unwrap();
        let stored = get_message(&db, Platform::Email, "<tracked@x>").await.unwrap().unwrap();
        assert_eq!(stored.tracking.opened_at, Some(t1));
        assert_eq!(stored.tracking.link_clicked_at, Some(t2));

        let err = record_tracking(&db, "nope", TrackingEvent::Opened, t1).await.unwrap_err();
        assert!(matches!(err, CourierError::NotFound { .. }));
    }

    #[tokio::test]
    async fn media_backfill_round_trips_bytes() {
        let (db, _dir) = setup().await;
        insert_message(&db, message("<pic@x>", Direction::Incoming, 0)).await.unwrap();
        let blob = MediaBlob {
            filename: "cat.png".into(),
            content_type: "image/png".into(),
            data: vec![0x89, 0x50, 0x4e, 0x47],
        };
        set_message_media(&db, Platform::Email, "<pic@x>", blob.clone(), MediaType::Image)
            .await
            .unwrap();
        let stored = get_message(&db, Platform::Email, "<pic@x>").await.unwrap().unwrap();
        assert_eq!(stored.media, Some(blob));
        assert_eq!(stored.media_type, MediaType::Image);
    }
}
