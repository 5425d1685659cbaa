//! Matchwire client - main entry point
//!
//! Keeps a live connection to the matchmaking API, logs every pushed event,
//! and optionally polls one endpoint as a fallback.

use matchwire_client::{handler, logging, ApiClient, ClientConfig, LiveConnection, Poller};
use matchwire_shared::KNOWN_EVENTS;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let config = ClientConfig::from_env()?;
    let api = ApiClient::new(config.connection.api_url.clone())
        .with_session_token(config.session_token.clone());

    tracing::info!(api = %config.connection.api_url, "starting live connection");
    let conn = LiveConnection::with_api(config.connection.clone(), api.clone());
    for &event_type in KNOWN_EVENTS {
        conn.on(
            event_type,
            handler(move |data| {
                tracing::info!(event = %event_type, ?data, "event received");
                Ok(())
            }),
        );
    }

    let mut connected = conn.connected();
    tokio::spawn(async move {
        while connected.changed().await.is_ok() {
            let up = *connected.borrow_and_update();
            tracing::info!(connected = up, "connection state changed");
        }
    });

    let _poller = config.poll_path.clone().map(|path| {
        tracing::info!(%path, interval_ms = config.poll_interval.as_millis() as u64, "polling");
        Poller::spawn(config.poll_interval, move || {
            let api = api.clone();
            let path = path.clone();
            async move {
                let body: serde_json::Value = api.get_json(&path).await?;
                tracing::debug!(%path, %body, "poll refreshed");
                anyhow::Ok(())
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    conn.disconnect();
    conn.closed().await;
    Ok(())
}
