use anyhow::Context;
use api_client::{BinanceClient, ExchangeApi};
use chrono::Utc;
use configuration::{Config, Mode};
use matching::MatchingEngine;
use router::{ReplaySession, RequestRouter};
use std::sync::Arc;
use std::time::Duration;
use streams::{StreamId, StreamManager};

/// The main entry point for the Helios trading core.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configuration::telemetry::init_tracing();

    let config = configuration::load_config().context("failed to load configuration")?;
    tracing::info!(mode = ?config.mode, subscriptions = config.subscriptions.len(), "starting helios");

    match config.mode {
        Mode::SimulateHistory => run_backtest(&config).await,
        Mode::Live | Mode::SimulateLive => run_streaming(&config).await,
    }
}

/// Preloads historical klines over REST and drives the matching engine
/// through them tick by tick until the replay is exhausted.
async fn run_backtest(config: &Config) -> anyhow::Result<()> {
    let client = BinanceClient::new(&config.api).context("failed to build the REST client")?;

    let mut engine = MatchingEngine::new(&config.simulation);
    engine.set_filters(
        client
            .fetch_filters()
            .await
            .context("failed to fetch venue filters")?,
    );

    let mut replay = ReplaySession::new();
    for subscription in &config.subscriptions {
        let span = subscription.interval.duration() * config.streaming.history_capacity as i32;
        let end = Utc::now();
        let klines = client
            .fetch_klines(
                &subscription.pair,
                subscription.interval.as_str(),
                end - span,
                end,
            )
            .await
            .with_context(|| format!("failed to preload {}", subscription.pair))?;
        tracing::info!(pair = %subscription.pair, rows = klines.len(), "preloaded history");
        replay.load(
            StreamId::new(subscription.pair.clone(), subscription.interval),
            klines,
        );
    }

    let mut router = RequestRouter::simulate_history(engine, replay);
    let mut ticks: u64 = 0;
    loop {
        match router.step() {
            Ok(completed) => {
                ticks += 1;
                for response in completed {
                    tracing::info!(
                        order_id = response.order_id,
                        status = ?response.status,
                        "order completed during replay"
                    );
                }
            }
            Err(router::RouterError::ReplayExhausted(total)) => {
                tracing::info!(ticks, total, "replay exhausted, backtest complete");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Runs the streaming client until interrupted, logging freshness so an
/// operator can see the supervisor doing its job.
async fn run_streaming(config: &Config) -> anyhow::Result<()> {
    let base_url = if config.api.live_trading {
        "wss://stream.binance.com:9443"
    } else {
        "wss://stream.testnet.binance.vision"
    };
    let manager = Arc::new(StreamManager::new(config.streaming.clone(), base_url));

    let ids: Vec<StreamId> = config
        .subscriptions
        .iter()
        .map(|s| StreamId::new(s.pair.clone(), s.interval))
        .collect();
    manager
        .subscribe_all(ids)
        .await
        .context("failed to subscribe configured streams")?;

    let mut status = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
            _ = status.tick() => {
                for id in manager.subscribed().await {
                    if let Err(e) = manager.health(&id).await {
                        tracing::error!(stream = %id, error = %e, "connection failed permanently");
                        continue;
                    }
                    let latest = manager.latest_tick(&id).await?;
                    let stale = manager.is_stale(&id).await.unwrap_or(true);
                    match latest {
                        Some(tick) => tracing::info!(stream = %id, close = %tick.close(), stale, "stream status"),
                        None => tracing::info!(stream = %id, stale, "no data yet"),
                    }
                }
            }
        }
    }

    manager.close().await.context("streams did not stop cleanly")?;
    Ok(())
}
