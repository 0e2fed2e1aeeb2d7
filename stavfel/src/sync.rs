//! Keeps the in-memory language checkers consistent with the store.
//!
//! Two cooperating tasks: a listener that owns a dedicated `LISTEN`ing
//! connection and forwards parsed notifications over a small buffered
//! channel, and an applier that turns them into `add_phrase`/`remove_phrase`
//! calls. At startup, and again after every reconnect, the full entry table
//! is replayed so nothing missed while disconnected stays missed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use crate::checker::LanguageChecker;
use crate::store::{
    EntryStore, EntryUpdateNotification, ListEntriesParams, StoreError, ENTRY_UPDATE_CHANNEL,
};

/// The channel the listener pings itself on to detect dead connections.
pub const PING_CHANNEL: &str = "entry_ping";

/// In-flight notifications buffered between listener and applier.
const UPDATE_BUFFER: usize = 16;

/// Page size for the preload replay.
const PRELOAD_PAGE_SIZE: i64 = 200;

/// Delay before retrying a failed listener connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// All live language checkers, keyed by normalised language code. Built once
/// at startup and passed around explicitly.
pub type LanguageMap = HashMap<String, Arc<LanguageChecker>>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("preload entries: {0}")]
    Preload(#[source] StoreError),

    #[error("apply {language:?} update of {text:?}: {source}")]
    Apply {
        language: String,
        text: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often the listener pings itself.
    pub ping_interval: Duration,
    /// How long to wait for any traffic before declaring the connection dead.
    pub ping_grace: Duration,
}

impl Default for SyncConfig {
    fn default() -> SyncConfig {
        SyncConfig {
            ping_interval: Duration::from_secs(5 * 60),
            ping_grace: Duration::from_secs(7 * 60),
        }
    }
}

enum UpdateEvent {
    Entry(EntryUpdateNotification),
    /// The listener reconnected; replay the store to catch up.
    Resync,
}

/// Runs the sync loop until shutdown is signalled.
///
/// The listener subscribes before the initial preload runs, so updates
/// committed during the replay are buffered rather than lost. A preload
/// failure at startup is fatal.
pub async fn run(
    store: EntryStore,
    pubsub: PgPool,
    languages: Arc<LanguageMap>,
    config: SyncConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), SyncError> {
    let (tx, rx) = mpsc::channel(UPDATE_BUFFER);

    let listener = listen(pubsub, store.clone(), tx, config, shutdown.clone());
    let applier = async {
        preload(&store, &languages).await.map_err(SyncError::Preload)?;

        apply_updates(&store, &languages, rx, shutdown).await
    };

    tokio::try_join!(listener, applier)?;

    Ok(())
}

/// Replays every stored entry into the matching language checkers.
pub async fn preload(store: &EntryStore, languages: &LanguageMap) -> Result<(), StoreError> {
    let mut params = ListEntriesParams {
        limit: PRELOAD_PAGE_SIZE,
        ..ListEntriesParams::default()
    };

    loop {
        let rows = store.list_entries(&params).await?;

        if rows.is_empty() {
            return Ok(());
        }

        for row in rows {
            let Some(checker) = languages.get(&row.language) else {
                continue;
            };

            checker.add_phrase(row.into_phrase());
        }

        params.offset += PRELOAD_PAGE_SIZE;
    }
}

async fn listen(
    pubsub: PgPool,
    store: EntryStore,
    updates: mpsc::Sender<UpdateEvent>,
    config: SyncConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SyncError> {
    let mut reconnected = false;

    'connect: loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let mut listener = match connect(&pubsub).await {
            Ok(listener) => listener,
            Err(err) => {
                log::warn!("entry listener connection failed, retrying: {err}");
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        log::info!("listening for entry updates");

        // Anything committed while we were away has to be replayed.
        if reconnected && updates.send(UpdateEvent::Resync).await.is_err() {
            return Ok(());
        }
        reconnected = true;

        let mut ping = tokio::time::interval(config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    // Close the LISTENing connection before the pools go away.
                    drop(listener);
                    return Ok(());
                }
                _ = ping.tick() => {
                    if let Err(err) = store.notify_raw(PING_CHANNEL, "").await {
                        log::warn!("send listener ping: {err}");
                    }
                }
                received = timeout(config.ping_grace, listener.try_recv()) => {
                    match received {
                        Err(_) => {
                            log::warn!(
                                "no listener traffic within the ping grace window, reconnecting"
                            );
                            continue 'connect;
                        }
                        Ok(Err(err)) => {
                            log::warn!("entry listener failed, reconnecting: {err}");
                            continue 'connect;
                        }
                        // The driver lost and re-established the connection
                        // under us; treat it as our own reconnect.
                        Ok(Ok(None)) => continue 'connect,
                        Ok(Ok(Some(notification))) => {
                            if notification.channel() != ENTRY_UPDATE_CHANNEL {
                                continue;
                            }

                            let parsed: EntryUpdateNotification =
                                match serde_json::from_str(notification.payload()) {
                                    Ok(parsed) => parsed,
                                    Err(err) => {
                                        log::warn!(
                                            "dropping unparseable entry notification {:?}: {err}",
                                            notification.payload()
                                        );
                                        continue;
                                    }
                                };

                            if updates.send(UpdateEvent::Entry(parsed)).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn connect(pubsub: &PgPool) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(pubsub).await?;
    listener.listen_all([ENTRY_UPDATE_CHANNEL, PING_CHANNEL]).await?;

    Ok(listener)
}

async fn apply_updates(
    store: &EntryStore,
    languages: &LanguageMap,
    mut updates: mpsc::Receiver<UpdateEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SyncError> {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            event = updates.recv() => {
                match event {
                    None => return Ok(()),
                    Some(UpdateEvent::Resync) => {
                        log::info!("replaying entries after listener reconnect");
                        preload(store, languages).await.map_err(SyncError::Preload)?;
                    }
                    Some(UpdateEvent::Entry(notification)) => {
                        apply(store, languages, notification).await?;
                    }
                }
            }
        }
    }
}

async fn apply(
    store: &EntryStore,
    languages: &LanguageMap,
    notification: EntryUpdateNotification,
) -> Result<(), SyncError> {
    // Updates for languages without a loaded dictionary are not ours to apply.
    let Some(checker) = languages.get(&notification.language) else {
        return Ok(());
    };

    if notification.deleted {
        checker.remove_phrase(&notification.text);

        return Ok(());
    }

    match store.get_entry(&notification.language, &notification.text).await {
        Ok(row) => checker.add_phrase(row.into_phrase()),
        // Deleted again before we got to it.
        Err(StoreError::NotFound) => checker.remove_phrase(&notification.text),
        Err(source) => {
            return Err(SyncError::Apply {
                language: notification.language,
                text: notification.text,
                source,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ping_configuration() {
        let config = SyncConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(300));
        assert!(config.ping_grace > config.ping_interval);
    }
}
