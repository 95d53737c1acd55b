use std::{sync::Arc, time::Duration};

use anyhow::Context;
use serde_json::json;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kai_core::{
    commands::CommandRegistry,
    config::Config,
    errors::Error,
    messaging::{port::Transport, timed::TimeoutTransport},
    pipeline::{Pipeline, TransportEvent},
    ports::ReplyClient,
    records::Records,
    state::AppState,
    store::JsonDirStore,
};

use crate::{protocol::Inbound, BridgeTransport};

const EVENT_QUEUE: usize = 256;
const OUTBOUND_QUEUE: usize = 256;

/// Wire everything together and serve the sidecar on stdin/stdout until EOF or shutdown.
pub async fn run_stdio(cfg: Arc<Config>, replies: Arc<dyn ReplyClient>) -> anyhow::Result<()> {
    let store = Arc::new(JsonDirStore::open(&cfg.data_dir).context("open data dir")?);
    let records = Arc::new(Records::load(store, cfg.seed_bot_config()).await);
    let commands = CommandRegistry::builtin()?;

    let (out_tx, out_rx) = mpsc::channel::<String>(OUTBOUND_QUEUE);
    let bridge = Arc::new(BridgeTransport::new(out_tx));
    let transport: Arc<dyn Transport> = Arc::new(TimeoutTransport::new(
        bridge.clone(),
        cfg.transport_timeout,
    ));
    let state = Arc::new(AppState::new(
        cfg.clone(),
        transport,
        replies,
        records,
        commands,
    ));

    info!(
        data_dir = %cfg.data_dir.display(),
        reply_url = %cfg.reply_url,
        "kai bridge started"
    );

    let writer = tokio::spawn(write_lines(tokio::io::stdout(), out_rx));

    let (ev_tx, ev_rx) = mpsc::channel(EVENT_QUEUE);
    let pipeline = Pipeline::new(state.clone());
    let runner = tokio::spawn(async move { pipeline.run(ev_rx).await });

    let routed = route_lines(
        BufReader::new(tokio::io::stdin()),
        &bridge,
        &state,
        ev_tx,
        state.shutdown.clone(),
    )
    .await;

    // No more responses will arrive; calls from draining handlers fail fast.
    bridge.fail_pending("sidecar input closed");
    if let Err(e) = runner.await {
        error!(error = %e, "pipeline task failed");
    }

    drop(state);
    drop(bridge);
    if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
        warn!("output writer did not finish in time");
    }

    info!("kai bridge stopped");
    routed
}

/// Read sidecar lines and route them: events into the pipeline, responses to the
/// waiting transport calls. Stops at EOF or when `shutdown` fires.
pub async fn route_lines<R>(
    reader: R,
    bridge: &BridgeTransport,
    state: &AppState,
    events: mpsc::Sender<TransportEvent>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("read sidecar input")?,
        };
        let Some(line) = line else {
            info!("sidecar input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let inbound = match serde_json::from_str::<Inbound>(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "ignoring malformed sidecar line");
                continue;
            }
        };

        match inbound {
            Inbound::Ready { self_id } => {
                info!(self_id = %self_id, "session ready");
                bridge.set_self_identity(self_id.clone());
                state
                    .records
                    .log("connected", json!({ "selfId": self_id }))
                    .await;
            }
            Inbound::Message(msg) => {
                if events.send(TransportEvent::Message(msg)).await.is_err() {
                    break;
                }
            }
            Inbound::Participants(update) => {
                if events
                    .send(TransportEvent::Participants(update))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Inbound::Response { id, result, error } => {
                let outcome = match error {
                    Some(e) => Err(Error::External(e)),
                    None => Ok(result.unwrap_or_default()),
                };
                bridge.complete(id, outcome);
            }
        }
    }
    Ok(())
}

async fn write_lines<W>(mut out: W, mut lines: mpsc::Receiver<String>) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(())
}
