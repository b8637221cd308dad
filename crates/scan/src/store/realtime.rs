//! Websocket change feed for the remote store.
//!
//! One socket per subscription. After connecting, the client joins the
//! `cart:{scope}` topic; the store then pushes one frame per cart
//! insert/update/delete matching the scope. Frames carry no row payload
//! the client relies on - they are refetch triggers only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use cartwheel_core::UserScope;

use crate::config::StoreConfig;

use super::{CartChange, ChangeEvents, ChangeFeed, ChangeKind, StoreError, SubscriptionGuard};

/// Default heartbeat interval keeping idle sockets alive.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Change feed over the store's websocket endpoint.
#[derive(Clone)]
pub struct RealtimeFeed {
    inner: Arc<RealtimeFeedInner>,
}

struct RealtimeFeedInner {
    url: Url,
    heartbeat: Duration,
}

impl RealtimeFeed {
    /// Create a feed for the configured websocket endpoint.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            inner: Arc::new(RealtimeFeedInner {
                url: config.realtime_url.clone(),
                heartbeat: HEARTBEAT_INTERVAL,
            }),
        }
    }

    /// Override the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat(self, heartbeat: Duration) -> Self {
        Self {
            inner: Arc::new(RealtimeFeedInner {
                url: self.inner.url.clone(),
                heartbeat,
            }),
        }
    }
}

impl RealtimeFeedInner {
    fn topic(scope: &UserScope) -> String {
        format!("cart:{scope}")
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self, scope: &UserScope) -> Result<ChangeEvents, StoreError> {
        let topic = RealtimeFeedInner::topic(scope);

        let (socket, _) = connect_async(self.inner.url.as_str())
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        let join = serde_json::to_string(&ClientFrame::Join {
            topic: topic.clone(),
        })?;
        sink.send(Message::Text(join.into()))
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;

        let scope = scope.clone();
        let heartbeat = self.inner.heartbeat;
        let (tx, rx) = mpsc::channel(16);

        let pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the join frame
            // is not followed by an instant heartbeat.
            ticker.tick().await;

            loop {
                tokio::select! {
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerFrame>(&text) {
                                Ok(ServerFrame::Change { topic: t, kind }) if t == topic => {
                                    let change = CartChange { scope: scope.clone(), kind };
                                    if tx.send(change).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(_) => {}
                                Err(error) => {
                                    tracing::debug!(%error, "ignoring unparseable feed frame");
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!(topic = %topic, "change feed socket closed");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(error)) => {
                            tracing::warn!(%error, "change feed socket error");
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        let frame = ClientFrame::Heartbeat;
                        let Ok(text) = serde_json::to_string(&frame) else { break };
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            // Best-effort leave so the store can drop the channel early.
            if let Ok(text) = serde_json::to_string(&ClientFrame::Leave { topic }) {
                let _ = sink.send(Message::Text(text.into())).await;
            }
            let _ = sink.close().await;
        });

        Ok(ChangeEvents::new(rx, Some(SubscriptionGuard::new(pump))))
    }
}

/// Frames the client sends.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientFrame {
    Join { topic: String },
    Leave { topic: String },
    Heartbeat,
}

/// Frames the store sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ServerFrame {
    Change { topic: String, kind: ChangeKind },
    #[serde(other)]
    Other,
}
