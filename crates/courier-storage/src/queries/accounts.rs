// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account rows and their member links.

use courier_core::{Account, CourierError, Platform};
use rusqlite::{OptionalExtension, Row, params};

use super::{enum_col, fmt_ts, json_col, to_json, ts_col};
use crate::database::{Database, map_tr_err};

const ACCOUNT_COLUMNS: &str = "platform, id, name, is_bot, raw, member_id, blocked, created_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        platform: enum_col(row, 0)?,
        id: row.get(1)?,
        name: row.get(2)?,
        is_bot: row.get(3)?,
        raw: json_col(row, 4)?,
        member_id: row.get(5)?,
        blocked: row.get(6)?,
        created_at: ts_col(row, 7)?,
    })
}

fn select_account(
    conn: &rusqlite::Connection,
    platform: &str,
    id: &str,
) -> rusqlite::Result<Option<Account>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE platform = ?1 AND id = ?2"),
        params![platform, id],
        account_from_row,
    )
    .optional()
}

pub async fn get_account(
    db: &Database,
    platform: Platform,
    id: &str,
) -> Result<Option<Account>, CourierError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| select_account(conn, &platform.to_string(), &id))
        .await
        .map_err(map_tr_err)
}

/// Insert the account unless it exists; returns the stored row and whether it was created.
pub async fn get_or_create_account(
    db: &Database,
    account: Account,
) -> Result<(Account, bool), CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let platform = account.platform.to_string();
            let inserted = tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO accounts ({ACCOUNT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    platform,
                    account.id,
                    account.name,
                    account.is_bot,
                    to_json(&account.raw)?,
                    account.member_id,
                    account.blocked,
                    fmt_ts(&account.created_at),
                ],
            )?;
            let stored = select_account(&tx, &platform, &account.id)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok((stored, inserted > 0))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_account_member(
    db: &Database,
    platform: Platform,
    account_id: &str,
    member_id: &str,
) -> Result<(), CourierError> {
    let (account_id, member_id) = (account_id.to_string(), member_id.to_string());
    let key = account_id.clone();
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET member_id = ?3 WHERE platform = ?1 AND id = ?2",
                params![platform.to_string(), account_id, member_id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if updated == 0 {
        return Err(CourierError::not_found("account", key));
    }
    Ok(())
}

pub async fn set_account_blocked(
    db: &Database,
    platform: Platform,
    account_id: &str,
    blocked: bool,
) -> Result<(), CourierError> {
    let account_id = account_id.to_string();
    let key = account_id.clone();
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE accounts SET blocked = ?3 WHERE platform = ?1 AND id = ?2",
                params![platform.to_string(), account_id, blocked],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if updated == 0 {
        return Err(CourierError::not_found("account", key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn second_create_returns_existing_row() {
        let (db, _dir) = setup().await;
        let first = Account::new(Platform::Email, "alice@example.com").with_name("Alice");
        let (stored, created) = get_or_create_account(&db, first).await.unwrap();
        assert!(created);
        assert_eq!(stored.name.as_deref(), Some("Alice"));

        let again = Account::new(Platform::Email, "alice@example.com").with_name("Other");
        let (stored, created) = get_or_create_account(&db, again).await.unwrap();
        assert!(!created);
        assert_eq!(stored.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn same_id_on_other_platform_is_distinct() {
        let (db, _dir) = setup().await;
        get_or_create_account(&db, Account::new(Platform::Telegram, "42"))
            .await
            .unwrap();
        let (_, created) = get_or_create_account(&db, Account::new(Platform::WhatsApp, "42"))
            .await
            .unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn member_link_persists() {
        let (db, _dir) = setup().await;
        get_or_create_account(&db, Account::new(Platform::Email, "bob@example.com"))
            .await
            .unwrap();
        set_account_member(&db, Platform::Email, "bob@example.com", "m-1")
            .await
            .unwrap();
        let account = get_account(&db, Platform::Email, "bob@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.member_id.as_deref(), Some("m-1"));

        let err = set_account_member(&db, Platform::Email, "ghost@example.com", "m-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NotFound { .. }));
    }

    #[tokio::test]
    async fn blocking_is_stored_and_reversible() {
        let (db, _dir) = setup().await;
        let (fresh, _) = get_or_create_account(&db, Account::new(Platform::Telegram, "99"))
            .await
            .unwrap();
        assert!(!fresh.blocked);

        set_account_blocked(&db, Platform::Telegram, "99", true).await.unwrap();
        let account = get_account(&db, Platform::Telegram, "99").await.unwrap().unwrap();
        assert!(account.blocked);

        set_account_blocked(&db, Platform::Telegram, "99", false).await.unwrap();
        let account = get_account(&db, Platform::Telegram, "99").await.unwrap().unwrap();
        assert!(!account.blocked);

        let err = set_account_blocked(&db, Platform::Telegram, "100", true)
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::NotFound { .. }));
    }
}
