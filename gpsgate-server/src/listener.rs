//! TCP listener: frames tracker connections and hands decoded events to storage.
//!
//! One task per connection reads frames through [`FrameCodec`], answers
//! login frames, and decodes everything else. A single blocking store task
//! owns the SQLite connection and the tracker. [`serve`] ties the two
//! together: a store failure ends it, and shutdown drains the store queue.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{Duration, Local, NaiveDateTime};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use gpsgate_core::frame;
use gpsgate_core::tracker::Tracker;
use gpsgate_core::{decode_at, DecodedEvent};

use crate::db::Database;

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match frame::split_frame(src)? {
            Some((start, end, consumed)) => {
                let frame = Bytes::copy_from_slice(&src[start..end]);
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => {
                // Whitespace-only buffers never become a frame
                if src.iter().all(u8::is_ascii_whitespace) {
                    src.clear();
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split().freeze();
        let trimmed = rest.trim_ascii();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Bytes::copy_from_slice(trimmed)))
        }
    }
}

impl Encoder<&'static str> for FrameCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: &'static str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ingest
// ---------------------------------------------------------------------------

/// A frame received from a device, decoded or not.
#[derive(Debug, Clone)]
pub struct Ingest {
    pub peer: Option<SocketAddr>,
    pub raw: String,
    pub event: Option<DecodedEvent>,
    pub received_at: NaiveDateTime,
}

impl Ingest {
    /// Decode `raw` using the receive time as the fallback clock.
    pub fn new(peer: Option<SocketAddr>, raw: String, received_at: NaiveDateTime) -> Self {
        let event = decode_at(&raw, received_at);
        Ingest {
            peer,
            raw,
            event,
            received_at,
        }
    }

    /// Like [`Ingest::new`], but frames that are not UTF-8 are kept
    /// (lossily) for the raw log and never decoded.
    pub fn from_bytes(peer: Option<SocketAddr>, frame: &[u8], received_at: NaiveDateTime) -> Self {
        match std::str::from_utf8(frame) {
            Ok(text) => Ingest::new(peer, text.to_string(), received_at),
            Err(_) => Ingest {
                peer,
                raw: String::from_utf8_lossy(frame).into_owned(),
                event: None,
                received_at,
            },
        }
    }
}

/// Work for the store task.
#[derive(Debug)]
pub enum StoreCmd {
    Ingest(Ingest),
    /// Mark devices silent for longer than the stale timeout as offline.
    Sweep(NaiveDateTime),
}

/// Receive clock. Every liveness timestamp (ingest stamps, sweep cutoffs)
/// comes from here so that they compare against each other.
pub fn received_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Ingests buffered between connections and the store.
const STORE_QUEUE: usize = 1024;

/// Seconds between offline sweeps.
const SWEEP_INTERVAL_SECS: u64 = 60;

/// Accept devices and persist their frames until `shutdown` resolves.
///
/// Returns the number of ingests stored. A store failure aborts every
/// connection and is returned as an error. On shutdown, connections are
/// closed and the store drains whatever is already queued before this
/// returns.
pub async fn serve<F>(
    listener: TcpListener,
    db: Database,
    tracker: Tracker,
    shutdown: F,
) -> anyhow::Result<u64>
where
    F: Future<Output = ()>,
{
    info!(addr = %listener.local_addr()?, "listening for trackers");

    let (tx, rx) = mpsc::channel(STORE_QUEUE);
    let mut store = tokio::task::spawn_blocking(move || {
        let (mut db, mut tracker) = (db, tracker);
        store_loop(rx, &mut db, &mut tracker)
    });

    let mut connections = JoinSet::new();
    let mut sweep_timer = tokio::time::interval(StdDuration::from_secs(SWEEP_INTERVAL_SECS));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let tx = tx.clone();
                    connections.spawn(async move {
                        if let Err(e) = serve_stream(stream, peer, tx).await {
                            warn!(%peer, error = %e, "connection closed with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            _ = sweep_timer.tick() => {
                // A closed channel means the store ended; its branch reports why
                let _ = tx.send(StoreCmd::Sweep(received_now())).await;
            }
            res = &mut store => {
                connections.abort_all();
                return match res {
                    Ok(Ok(stored)) => Err(anyhow!("store stopped after {stored} ingests")),
                    Ok(Err(e)) => Err(e.context("store failed")),
                    Err(e) => Err(anyhow::Error::from(e).context("store task panicked")),
                };
            }
            Some(_) = connections.join_next() => {}
            _ = &mut shutdown => break,
        }
    }

    info!(connections = connections.len(), "shutting down, draining store queue");
    connections.abort_all();
    while connections.join_next().await.is_some() {}
    drop(tx);

    let stored = store.await.context("store task panicked")??;
    info!(stored, "store stopped");
    Ok(stored)
}

async fn serve_stream(
    stream: TcpStream,
    peer: SocketAddr,
    tx: mpsc::Sender<StoreCmd>,
) -> anyhow::Result<()> {
    info!(%peer, "device connected");
    let (reader, writer) = stream.into_split();
    let reader = FramedRead::new(reader, FrameCodec);
    let writer = FramedWrite::new(writer, FrameCodec);
    handle_connection(reader, writer, peer, tx).await?;
    info!(%peer, "device disconnected");
    Ok(())
}

/// Drive one device connection until it closes.
pub async fn handle_connection<R, W>(
    mut reader: FramedRead<R, FrameCodec>,
    mut writer: FramedWrite<W, FrameCodec>,
    peer: SocketAddr,
    tx: mpsc::Sender<StoreCmd>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(bytes) = reader.next().await {
        let bytes = bytes?;
        let ingest = Ingest::from_bytes(Some(peer), &bytes, received_now());

        if let Some(reply) = frame::login_reply(&ingest.raw) {
            debug!(%peer, raw = %ingest.raw, "login frame");
            writer.send(reply).await?;
            continue;
        }

        match &ingest.event {
            Some(event) => debug!(%peer, imei = event.imei(), kind = event.kind(), "decoded"),
            None => warn!(%peer, raw = %ingest.raw, "unrecognised frame"),
        }

        if tx.send(StoreCmd::Ingest(ingest)).await.is_err() {
            anyhow::bail!("store task has stopped");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Run store commands until every sender is dropped. Blocks; run it under
/// `spawn_blocking`. Returns the number of ingests stored.
pub fn store_loop(
    mut rx: mpsc::Receiver<StoreCmd>,
    db: &mut Database,
    tracker: &mut Tracker,
) -> anyhow::Result<u64> {
    let mut stored = 0;
    while let Some(cmd) = rx.blocking_recv() {
        match cmd {
            StoreCmd::Ingest(ingest) => {
                store(db, tracker, &ingest)?;
                stored += 1;
            }
            StoreCmd::Sweep(now) => sweep(db, tracker, now)?,
        }
    }
    Ok(stored)
}

/// Mark silent devices offline and forget them in the tracker.
pub fn sweep(db: &mut Database, tracker: &mut Tracker, now: NaiveDateTime) -> anyhow::Result<()> {
    let cutoff = now - Duration::seconds(tracker.stale_timeout_secs);
    let offline = db.mark_offline(&cutoff).context("marking devices offline")?;
    let pruned = tracker.prune_stale(now);
    if offline > 0 || pruned > 0 {
        info!(offline, pruned, "stale devices swept");
    }
    Ok(())
}

/// Record one ingest: raw log always, tracker output when it decoded.
pub fn store(db: &mut Database, tracker: &mut Tracker, ingest: &Ingest) -> anyhow::Result<()> {
    let peer = ingest.peer.map(|p| p.to_string());
    db.log_raw(
        &ingest.raw,
        peer.as_deref(),
        ingest.event.is_some(),
        &ingest.received_at,
    )
    .context("writing raw log")?;

    if let Some(event) = &ingest.event {
        let events = tracker.update(event, ingest.received_at);
        db.apply_events(&events).context("applying track events")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
