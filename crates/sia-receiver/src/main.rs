//! SIA-DCS Receiver
//!
//! Terminates SIA Digital Communications Standard (ANSI SIA DC-09)
//! connections from alarm panels on the configured port, forwarding
//! normalized events to a downstream HTTP endpoint.

mod admin;
mod app;
mod config;
mod forwarder;
mod mapper;
mod queue;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use sia_common::{AccountRegistry, HandlerOutcome, SiaConnectionHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::app::AppContext;
use crate::config::AppConfig;
use crate::forwarder::ForwardWorker;
use crate::queue::bounded;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("==============================================");
    info!("   SIA-DCS Receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("==============================================");

    let accounts = build_account_registry(&config)?;
    info!(accounts = accounts.len(), "accounts configured");

    let config = Arc::new(config);
    let accounts = Arc::new(accounts);
    let (queue, queue_rx) = bounded(config.queue_capacity);
    let shutdown = Arc::new(Notify::new());

    let ctx = AppContext::new(config.clone(), accounts.clone(), queue.clone(), shutdown.clone());

    let worker = ForwardWorker::new(config.clone())?;
    let worker_shutdown = shutdown.clone();
    let worker_handle = tokio::spawn(async move {
        worker.run(queue_rx, worker_shutdown).await;
    });

    let admin_listener = TcpListener::bind(&config.admin_bind)
        .await
        .with_context(|| format!("failed to bind admin surface on {}", config.admin_bind))?;
    info!(addr = %config.admin_bind, "admin HTTP surface listening");
    let admin_router = admin::router(ctx.clone());
    let admin_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(admin_listener, admin_router).await {
            error!(error = %err, "admin HTTP surface exited with an error");
        }
    });

    let bind_addr = format!(
        "{}:{}",
        if config.sia_host.is_empty() { "0.0.0.0" } else { &config.sia_host },
        config.sia_port
    );
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind SIA-DC listener on {bind_addr}"))?;
    info!(addr = %bind_addr, "SIA-DC TCP server listening");

    let accept_shutdown = shutdown.clone();
    tokio::pin! {
        let ctrl_c = tokio::signal::ctrl_c();
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                info!("shutdown signal received");
                accept_shutdown.notify_waiters();
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        info!(%addr, "accepted connection");
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(socket, addr.to_string(), ctx).await {
                                warn!(%addr, error = %err, "connection closed with error");
                            }
                        });
                    }
                    Err(err) => error!(error = %err, "failed to accept connection"),
                }
            }
        }
    }

    match tokio::time::timeout(config.shutdown_drain_timeout, worker_handle).await {
        Ok(_) => info!("forward worker drained cleanly"),
        Err(_) => warn!("forward worker did not drain within the timeout, shutting down anyway"),
    }
    admin_handle.abort();

    Ok(())
}

fn build_account_registry(config: &AppConfig) -> Result<AccountRegistry> {
    // `AppConfig::load` already rejected an unparseable APP_TIMEZONE at
    // startup, so this can't fail here.
    let timezone: Tz = config
        .app_timezone
        .parse()
        .expect("APP_TIMEZONE validated by AppConfig::load");

    let mut registry = AccountRegistry::new();
    for (index, account) in config.sia_accounts.iter().enumerate() {
        let key_bytes = config.key_bytes_for(index);
        registry
            .insert(account.clone(), key_bytes, timezone, config.sia_allowed_timeband.as_secs())
            .with_context(|| format!("invalid configuration for account {account:?}"))?;
        info!(account = %account, encrypted = key_bytes.is_some(), "account registered");
    }
    Ok(registry)
}

/// Per-connection read/validate/respond loop (C5). Buffers partial
/// reads and feeds each complete frame to [`SiaConnectionHandler`].
async fn handle_connection(mut socket: TcpStream, addr: String, ctx: AppContext) -> Result<()> {
    let mut handler = SiaConnectionHandler::new(addr.clone(), ctx.accounts.clone());
    let mut buffer = Vec::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        let read = tokio::select! {
            biased;
            _ = ctx.shutdown.notified() => {
                info!(%addr, "shutdown signal observed, closing connection");
                return Ok(());
            }
            result = tokio::time::timeout(
                ctx.config.sia_idle_timeout,
                socket.read(&mut read_buf),
            ) => result,
        };

        let n = match read {
            Ok(Ok(0)) => {
                info!(%addr, "connection closed by peer");
                return Ok(());
            }
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                info!(%addr, "connection idle timeout");
                return Ok(());
            }
        };

        buffer.extend_from_slice(&read_buf[..n]);

        loop {
            match sia_common::Frame::decode(&buffer) {
                Ok((frame, consumed)) => {
                    buffer.drain(..consumed);
                    let outcome = handler.handle_frame(&frame.body, Utc::now());
                    socket.write_all(outcome.response_bytes()).await?;
                    socket.write_all(b"\r\n").await?;
                    socket.flush().await?;

                    if let HandlerOutcome::Accepted { event, .. } = outcome {
                        if !ctx
                            .queue
                            .try_enqueue(sia_common::ForwardItem::new(*event))
                        {
                            warn!(%addr, "queue full, event dropped after ACK");
                        }
                    }
                }
                // Need more bytes before a full frame can be judged.
                Err(sia_common::frame::FrameError::TooShort(_))
                | Err(sia_common::frame::FrameError::BadLength { .. }) => break,
                // A complete header parsed but failed CRC/hex validation:
                // this is a real framing error, not a partial read.
                Err(err) => {
                    warn!(%addr, error = %err, "framing error, responding NAK");
                    let nak = sia_common::protocol::build_nak(
                        &sia_common::protocol::ResponseContext::unknown(),
                        Utc::now(),
                    );
                    socket.write_all(&nak).await?;
                    socket.write_all(b"\r\n").await?;
                    socket.flush().await?;
                    buffer.clear();
                    break;
                }
            }
        }
    }
}
