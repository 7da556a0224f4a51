// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Production [`MailboxConnector`] built on `async-imap`.
//!
//! Implicit TLS via `tokio-rustls` with the webpki root store when
//! `use_ssl` is set, plain TCP otherwise.

use std::sync::Arc;
use std::time::Duration;

use async_imap::extensions::idle::IdleResponse;
use async_imap::Session;
use async_trait::async_trait;
use courier_core::{CourierError, IdleOutcome, MailEndpoint, MailboxConnector, MailboxSession};
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Byte stream an IMAP session runs over: TLS or plain TCP.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + std::fmt::Debug> ImapStream for T {}

type ImapSession = Session<Box<dyn ImapStream>>;

/// `NO` and `BAD` replies refuse one command on a healthy connection; all
/// other errors mean the connection itself is in doubt.
fn imap_err(context: &str, e: async_imap::error::Error) -> CourierError {
    match e {
        async_imap::error::Error::No(reply) | async_imap::error::Error::Bad(reply) => {
            CourierError::Rejected {
                message: format!("IMAP {context}: {reply}"),
            }
        }
        other => CourierError::channel_with(format!("IMAP {context} failed"), other),
    }
}

/// Opens authenticated `async-imap` sessions.
#[derive(Debug, Default, Clone)]
pub struct AsyncImapConnector;

impl AsyncImapConnector {
    pub fn new() -> Self {
        Self
    }

    async fn open_stream(endpoint: &MailEndpoint) -> Result<Box<dyn ImapStream>, CourierError> {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| {
                CourierError::channel_with(
                    format!("TCP connect to {}:{} failed", endpoint.host, endpoint.port),
                    e,
                )
            })?;

        if !endpoint.use_ssl {
            return Ok(Box::new(tcp));
        }

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
        let server_name = rustls_pki_types::ServerName::try_from(endpoint.host.clone())
            .map_err(|e| CourierError::channel_with(format!("invalid server name `{}`", endpoint.host), e))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| CourierError::channel_with("TLS handshake failed", e))?;
        Ok(Box::new(tls))
    }
}

#[async_trait]
impl MailboxConnector for AsyncImapConnector {
    async fn connect(
        &self,
        endpoint: &MailEndpoint,
        mailbox: &str,
    ) -> Result<Box<dyn MailboxSession>, CourierError> {
        let stream = Self::open_stream(endpoint).await?;
        let client = async_imap::Client::new(stream);
        let mut session = client
            .login(&endpoint.username, &endpoint.password)
            .await
            .map_err(|(e, _)| imap_err("LOGIN", e))?;
        session
            .select(mailbox)
            .await
            .map_err(|e| imap_err("SELECT", e))?;
        debug!(host = %endpoint.host, mailbox, "imap mailbox selected");
        Ok(Box::new(AsyncImapSession {
            session: Some(session),
        }))
    }
}

/// One logged-in session. The inner session is moved out while in IDLE.
struct AsyncImapSession {
    session: Option<ImapSession>,
}

impl AsyncImapSession {
    fn session(&mut self) -> Result<&mut ImapSession, CourierError> {
        self.session
            .as_mut()
            .ok_or_else(|| CourierError::channel("IMAP session was lost during IDLE"))
    }
}

#[async_trait]
impl MailboxSession for AsyncImapSession {
    async fn idle_wait(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<IdleOutcome, CourierError> {
        let session = self
            .session
            .take()
            .ok_or_else(|| CourierError::channel("IMAP session was lost during IDLE"))?;
        let mut idle = session.idle();
        idle.init().await.map_err(|e| imap_err("IDLE", e))?;

        let waited = {
            let (wait, interrupt) = idle.wait_with_timeout(timeout);
            tokio::pin!(wait);
            let early = tokio::select! {
                res = &mut wait => Some(res),
                _ = cancel.cancelled() => None,
            };
            match early {
                Some(res) => res,
                None => {
                    // Dropping the stop source ends the wait with ManualInterrupt.
                    drop(interrupt);
                    wait.await
                }
            }
        };
        let response = waited.map_err(|e| imap_err("IDLE wait", e))?;

        let session = idle.done().await.map_err(|e| imap_err("DONE", e))?;
        self.session = Some(session);

        Ok(match response {
            IdleResponse::NewData(_) => IdleOutcome::NewData,
            IdleResponse::Timeout => IdleOutcome::Timeout,
            IdleResponse::ManualInterrupt => IdleOutcome::Cancelled,
        })
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>, CourierError> {
        let uids = self
            .session()?
            .uid_search("UNSEEN")
            .await
            .map_err(|e| imap_err("UID SEARCH", e))?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn fetch_raw(&mut self, uid: u32) -> Result<Option<Vec<u8>>, CourierError> {
        let session = self.session()?;
        let fetches: Vec<_> = session
            .uid_fetch(uid.to_string(), "BODY.PEEK[]")
            .await
            .map_err(|e| imap_err("UID FETCH", e))?
            .try_collect()
            .await
            .map_err(|e| imap_err("UID FETCH", e))?;
        Ok(fetches
            .iter()
            .find_map(|fetch| fetch.body().map(<[u8]>::to_vec)))
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<(), CourierError> {
        let session = self.session()?;
        let _updates: Vec<_> = session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .await
            .map_err(|e| imap_err("UID STORE", e))?
            .try_collect()
            .await
            .map_err(|e| imap_err("UID STORE", e))?;
        Ok(())
    }

    async fn append(
        &mut self,
        folder: &str,
        flags: &str,
        message: &[u8],
    ) -> Result<(), CourierError> {
        self.session()?
            .append(folder, Some(flags), None, message)
            .await
            .map_err(|e| imap_err("APPEND", e))
    }

    async fn logout(&mut self) -> Result<(), CourierError> {
        match self.session.as_mut() {
            Some(session) => session.logout().await.map_err(|e| imap_err("LOGOUT", e)),
            None => Ok(()),
        }
    }
}
