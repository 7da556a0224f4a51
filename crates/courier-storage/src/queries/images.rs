// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inline images extracted from email bodies.

use chrono::Utc;
use courier_core::{CourierError, InlineImage};
use rusqlite::{OptionalExtension, Row, params};

use super::fmt_ts;
use crate::database::{Database, map_tr_err};

const IMAGE_COLUMNS: &str = "short_id, message_id, content_id, content_type, data, sha256";

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<InlineImage> {
    Ok(InlineImage {
        short_id: row.get(0)?,
        message_id: row.get(1)?,
        content_id: row.get(2)?,
        content_type: row.get(3)?,
        data: row.get(4)?,
        sha256: row.get(5)?,
    })
}

/// Store an image once per `(message, sha256)`; a repeat returns the first record.
pub async fn save_inline_image(
    db: &Database,
    image: InlineImage,
) -> Result<InlineImage, CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO inline_images ({IMAGE_COLUMNS}, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    image.short_id,
                    image.message_id,
                    image.content_id,
                    image.content_type,
                    image.data,
                    image.sha256,
                    fmt_ts(&Utc::now()),
                ],
            )?;
            let stored = tx.query_row(
                &format!(
                    "SELECT {IMAGE_COLUMNS} FROM inline_images
                     WHERE COALESCE(message_id, '') = COALESCE(?1, '') AND sha256 = ?2"
                ),
                params![image.message_id, image.sha256],
                image_from_row,
            )?;
            tx.commit()?;
            Ok(stored)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_inline_image(
    db: &Database,
    short_id: &str,
) -> Result<Option<InlineImage>, CourierError> {
    let short_id = short_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {IMAGE_COLUMNS} FROM inline_images WHERE short_id = ?1"),
                params![short_id],
                image_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
