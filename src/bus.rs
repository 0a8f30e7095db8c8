use anyhow::Result;
use async_trait::async_trait;
use busrt::client::AsyncClient;
use busrt::ipc::{Client, Config};
use busrt::rpc::{
    Rpc, RpcClient, RpcError, RpcEvent, RpcHandlers, RpcResult, RPC_ERROR_CODE_INTERNAL,
    RPC_ERROR_CODE_PARSE,
};
use busrt::QoS;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, watch, Mutex};

use crate::commands::Command;
use crate::config::AppConfig;
use crate::tracker::Tracker;

struct TrackerRpcHandlers {
    tracker: Arc<Tracker>,
}

#[async_trait]
impl RpcHandlers for TrackerRpcHandlers {
    async fn handle_call(&self, event: RpcEvent) -> RpcResult {
        let method = event
            .parse_method()
            .map_err(|_| RpcError::new(RPC_ERROR_CODE_PARSE, None))?;
        let Some(command) = Command::from_method(method) else {
            return Err(RpcError::method(None));
        };
        tracing::debug!(method, "rpc call");
        let reply = command
            .execute(&self.tracker)
            .await
            .and_then(|value| serde_json::to_vec(&value))
            .map_err(|e| {
                RpcError::new(RPC_ERROR_CODE_INTERNAL, Some(e.to_string().as_bytes().to_vec()))
            })?;
        Ok(Some(reply))
    }

    async fn handle_notification(&self, _event: RpcEvent) {}
    async fn handle_frame(&self, _frame: busrt::Frame) {}
}

/// Serves commands and forwards live updates over the bus until shutdown.
/// An unreachable broker only disables the bridge.
pub async fn run_bridge(
    config: Arc<AppConfig>,
    tracker: Arc<Tracker>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let Some(address) = config.bus_address.clone() else {
        tracing::info!("no bus address configured, live updates stay in-process");
        return Ok(());
    };

    let bus_config = Config::new(&address, &config.bus_client_name);
    let client = match Client::connect(&bus_config).await {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(bus = %address, error = %err, "bus unavailable, bridge disabled");
            return Ok(());
        }
    };
    let rpc_client = RpcClient::new(
        client,
        TrackerRpcHandlers {
            tracker: tracker.clone(),
        },
    );
    let client = rpc_client.client().clone();
    tracing::info!(bus = %address, name = %config.bus_client_name, "bus bridge connected");

    let mut updates = tracker.port().subscribe();
    let mut network_info = tracker.watch_network_info();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            update = updates.recv() => match update {
                Ok(payload) => publish(&client, &config.update_topic, &*payload).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "bus bridge lagging, skipped updates");
                }
                Err(RecvError::Closed) => break,
            },
            changed = network_info.changed() => {
                if changed.is_err() {
                    break;
                }
                let info = network_info.borrow_and_update().clone();
                if let Some(info) = info {
                    publish(&client, &config.identity_topic, &info).await;
                }
            }
        }
    }
    tracing::info!("bus bridge stopped");
    Ok(())
}

async fn publish<T: Serialize>(
    client: &Arc<Mutex<dyn AsyncClient + 'static>>,
    topic: &str,
    value: &T,
) {
    let payload = match serde_json::to_vec(value) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(topic, error = %err, "failed to encode bus payload");
            return;
        }
    };
    let mut c = client.lock().await;
    if let Err(err) = c.publish(topic, payload.into(), QoS::No).await {
        tracing::debug!(topic, error = %err, "bus publish failed");
    }
}
