//! Live pod stream over WebSocket.
//!
//! The client first receives a `snapshot` message holding every pod in the
//! scope, then one wire event per change. With a snapshot interval set the
//! snapshot is re-sent on that period. When the session behind the stream
//! ends, a close frame carries the reason.

use crate::error::ServerError;
use crate::state::AppState;
use crate::views::{pod_views, NamespaceQuery, SnapshotMessage};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use pod_watch::{ActionPolicy, SessionEnd, Subscription, SummarizedRecord, WatchSession};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, info, warn};

/// Close frame reasons are limited to 123 bytes.
const MAX_CLOSE_REASON: usize = 123;

pub async fn ws_pods(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Response, ServerError> {
    let scope = state.config.scope_for(query.ns.as_deref());
    let session = state.synced_session(&scope).await?;
    let (snapshot, subscription) = session.subscribe_with_summaries()?;
    let policy = state.config.action_policy;
    let resend = state.config.snapshot_interval;
    info!(
        "Subscriber {} streaming pods in {}",
        subscription.id(),
        scope
    );
    Ok(ws.on_upgrade(move |socket| {
        stream_pods(socket, session, snapshot, subscription, policy, resend)
    }))
}

async fn stream_pods(
    socket: WebSocket,
    session: Arc<WatchSession>,
    snapshot: Vec<SummarizedRecord>,
    mut subscription: Subscription,
    policy: ActionPolicy,
    resend: Option<Duration>,
) {
    let id = subscription.id();
    let mut resend = resend.map(|period| interval_at(Instant::now() + period, period));
    let (mut sender, mut receiver) = socket.split();

    let opening = SnapshotMessage::new(pod_views(&snapshot));
    if let Err(e) = send_json(&mut sender, &opening).await {
        debug!("Subscriber {} left before the snapshot was sent: {}", id, e);
        session.unsubscribe(id);
        return;
    }

    let end = loop {
        tokio::select! {
            next = subscription.recv() => match next {
                Ok(event) => {
                    if let Err(e) = send_json(&mut sender, &event.to_wire(policy)).await {
                        debug!("Subscriber {} went away: {}", id, e);
                        break None;
                    }
                }
                Err(end) => break Some(end),
            },
            () = tick(&mut resend) => {
                // an ended session is reported by the subscription
                if let Ok(snapshot) = session.current_summaries() {
                    let message = SnapshotMessage::new(pod_views(&snapshot));
                    if let Err(e) = send_json(&mut sender, &message).await {
                        debug!("Subscriber {} went away: {}", id, e);
                        break None;
                    }
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break None,
                // pings are answered by axum; anything else is ignored
                Some(Ok(_)) => {}
            },
        }
    };

    session.unsubscribe(id);
    let dropped = subscription.dropped();
    if dropped > 0 {
        warn!("Subscriber {} fell behind, {} events dropped", id, dropped);
    }

    if let Some(end) = end {
        info!("Closing stream for subscriber {}: {}", id, end);
        let frame = close_frame(&end);
        if let Err(e) = sender.send(Message::Close(Some(frame))).await {
            debug!("Close frame for subscriber {} not delivered: {}", id, e);
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> Result<(), String>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
    sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| e.to_string())
}

fn close_frame(end: &SessionEnd) -> CloseFrame {
    let code = match end {
        SessionEnd::Failed(_) => close_code::ERROR,
        SessionEnd::Stopped | SessionEnd::Detached => close_code::AWAY,
    };
    CloseFrame {
        code,
        reason: truncate(&end.to_string(), MAX_CLOSE_REASON).into(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::routes;
    use cluster_client::{
        ClusterError, MockClusterClient, NamespaceScope, WatchNotification, WatchScript,
        WorkloadId, WorkloadRecord,
    };
    use pod_watch::{WatchConfig, WatchContext, WatchHub};
    use std::net::SocketAddr;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct Served {
        addr: SocketAddr,
        hub: Arc<WatchHub>,
        // keeps the watch stream open
        script: WatchScript,
    }

    fn pod(name: &str, phase: &str) -> WorkloadRecord {
        WorkloadRecord::new(WorkloadId::new("shop", name), phase)
    }

    /// Serve the router on a local port with `shop/web-0` already listed.
    async fn serve(policy: ActionPolicy, resend: Option<Duration>) -> Served {
        let mock = MockClusterClient::new();
        mock.add_pod(pod("web-0", "Pending"));
        let script = mock.script_watch();
        script.relist(vec![pod("web-0", "Pending")]);

        let mut config = ServerConfig::from_lookup(|_| None).unwrap();
        config.watch = WatchConfig::default().with_sync_timeout(Duration::from_secs(2));
        config.action_policy = policy;
        config.snapshot_interval = resend;
        let hub = Arc::new(WatchHub::new(WatchContext::new(
            Arc::new(mock),
            config.watch.clone(),
        )));

        let app = routes::router(AppState::new(Arc::clone(&hub), config));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Served { addr, hub, script }
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/pods?ns=shop", addr))
            .await
            .unwrap();
        client
    }

    async fn next_message(client: &mut Client) -> ClientMessage {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .expect("message in time")
                .expect("stream still open")
                .unwrap();
            if !matches!(message, ClientMessage::Ping(_) | ClientMessage::Pong(_)) {
                return message;
            }
        }
    }

    async fn next_json(client: &mut Client) -> serde_json::Value {
        match next_message(client).await {
            ClientMessage::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text message, got {:?}", other),
        }
    }

    async fn next_close(client: &mut Client) -> (u16, String) {
        match next_message(client).await {
            ClientMessage::Close(Some(frame)) => {
                (u16::from(frame.code), frame.reason.as_str().to_string())
            }
            other => panic!("expected a close frame, got {:?}", other),
        }
    }

    fn wire(action: &str, name: &str, status: &str) -> serde_json::Value {
        serde_json::json!({
            "action": action,
            "name": name,
            "namespace": "shop",
            "status": status,
        })
    }

    #[tokio::test]
    async fn test_stream_sends_snapshot_then_events() {
        let served = serve(ActionPolicy::Distinct, None).await;
        let mut client = connect(served.addr).await;

        let snapshot = next_json(&mut client).await;
        assert_eq!(snapshot["type"], "snapshot");
        assert_eq!(snapshot["pods"].as_array().unwrap().len(), 1);
        assert_eq!(snapshot["pods"][0]["name"], "web-0");
        assert_eq!(snapshot["pods"][0]["status"], "Pending");
        assert_eq!(snapshot["pods"][0]["ready"], "0/0");

        served.script.send(WatchNotification::updated(pod("web-0", "Running")));
        assert_eq!(next_json(&mut client).await, wire("update", "web-0", "Running"));

        served.script.send(WatchNotification::added(pod("web-1", "Pending")));
        assert_eq!(next_json(&mut client).await, wire("add", "web-1", "Pending"));

        served.script.send(WatchNotification::Deleted(pod("web-0", "Running")));
        assert_eq!(next_json(&mut client).await, wire("delete", "web-0", "Running"));

        served.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_legacy_policy_tags_updates_as_add() {
        let served = serve(ActionPolicy::LegacyUpdateAsAdd, None).await;
        let mut client = connect(served.addr).await;
        assert_eq!(next_json(&mut client).await["type"], "snapshot");

        served.script.send(WatchNotification::updated(pod("web-0", "Running")));
        assert_eq!(next_json(&mut client).await, wire("add", "web-0", "Running"));

        served.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_snapshot_is_resent_on_interval() {
        let served = serve(ActionPolicy::Distinct, Some(Duration::from_millis(50))).await;
        let mut client = connect(served.addr).await;
        assert_eq!(next_json(&mut client).await["type"], "snapshot");

        served.script.send(WatchNotification::added(pod("web-1", "Running")));
        let resent = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let message = next_json(&mut client).await;
                if message["type"] == "snapshot" && message["pods"].as_array().unwrap().len() == 2 {
                    break message;
                }
            }
        })
        .await
        .expect("snapshot resent with the new pod");
        let names: Vec<_> = resent["pods"]
            .as_array()
            .unwrap()
            .iter()
            .map(|pod| pod["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["web-0", "web-1"]);

        served.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_stopped_session_closes_going_away() {
        let served = serve(ActionPolicy::Distinct, None).await;
        let mut client = connect(served.addr).await;
        assert_eq!(next_json(&mut client).await["type"], "snapshot");

        served
            .hub
            .session(&NamespaceScope::Namespace("shop".into()))
            .stop();
        assert_eq!(
            next_close(&mut client).await,
            (1001, "session stopped".to_string())
        );

        served.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_session_closes_with_error() {
        let served = serve(ActionPolicy::Distinct, None).await;
        let mut client = connect(served.addr).await;
        assert_eq!(next_json(&mut client).await["type"], "snapshot");

        served
            .script
            .fail(ClusterError::UnexpectedObject("not a pod".into()));
        let (code, reason) = next_close(&mut client).await;
        assert_eq!(code, 1011);
        assert!(reason.starts_with("session failed"), "reason: {}", reason);

        served.hub.shutdown().await;
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(close_frame(&SessionEnd::Stopped).code, close_code::AWAY);
        let failed = close_frame(&SessionEnd::Failed("watch stream closed".into()));
        assert_eq!(failed.code, close_code::ERROR);
        assert_eq!(failed.reason.as_str(), "session failed: watch stream closed");
    }

    #[test]
    fn test_long_reason_truncated_on_char_boundary() {
        let reason = "é".repeat(100);
        let frame = close_frame(&SessionEnd::Failed(reason));
        assert!(frame.reason.as_str().len() <= MAX_CLOSE_REASON);
        assert!(frame.reason.as_str().starts_with("session failed: "));
    }
}
