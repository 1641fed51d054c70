//! Request correlation, timeouts and teardown in the worker bridge.

mod support;

use pretty_assertions::assert_eq;
use shieldsync_sync::{
    ActionKind, EngineError, ErrorCode, PlaceholderEngine, SyncError, WorkerAction, WorkerBridge,
    WorkerMessage,
};
use shieldsync_types::{DecryptedSnapshot, Network, SyncStage, SyncStatus};
use std::sync::Arc;
use std::time::Duration;
use support::scripted_bridge;
use tokio_test::{assert_err, assert_ok};
use zeroize::Zeroizing;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Lets the dispatcher task drain whatever is queued.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn ok_reply_resolves_matching_request() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (result, ()) = tokio::join!(bridge.init(Network::Mainnet), async {
        let request = worker.next_request().await;
        assert!(matches!(
            request.action,
            WorkerAction::Init {
                network: Network::Mainnet
            }
        ));
        worker.send(WorkerMessage::Ok {
            request_id: request.request_id,
            action: ActionKind::Init,
        });
    });

    assert_ok!(result);
    assert_eq!(bridge.pending_requests(), 0);
}

#[tokio::test]
async fn request_ids_are_unique() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (a, b, ()) = tokio::join!(
        bridge.get_decrypted_snapshot(),
        bridge.clear_session(),
        async {
            let first = worker.next_request().await;
            let second = worker.next_request().await;
            assert_ne!(first.request_id, second.request_id);
            // Answer out of order; correlation is by id, not position.
            for request in [second, first] {
                worker.send(WorkerMessage::Snapshot {
                    request_id: request.request_id,
                    payload: DecryptedSnapshot::default(),
                });
            }
        }
    );

    assert!(a.unwrap().is_empty());
    assert!(b.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn late_reply_after_timeout_is_discarded() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let err = bridge.get_decrypted_snapshot().await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Timeout {
            action: ActionKind::GetDecryptedSnapshot,
            after
        } if after == TIMEOUT
    ));
    assert_eq!(bridge.pending_requests(), 0);

    let request = worker.next_request().await;
    worker.send(WorkerMessage::Snapshot {
        request_id: request.request_id,
        payload: DecryptedSnapshot::default(),
    });
    settle().await;

    assert_eq!(bridge.discarded_replies(), 1);
}

#[tokio::test]
async fn reply_for_unknown_id_is_counted_and_dropped() {
    let (bridge, worker) = scripted_bridge(TIMEOUT);

    worker.send(WorkerMessage::Ok {
        request_id: "never-sent".into(),
        action: ActionKind::Sync,
    });
    settle().await;

    assert_eq!(bridge.discarded_replies(), 1);
    assert_eq!(bridge.status(), SyncStatus::idle());
}

#[tokio::test]
async fn mismatched_reply_type_is_protocol_error() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (result, ()) = tokio::join!(bridge.begin_sync(), async {
        let request = worker.next_request().await;
        worker.send(WorkerMessage::Snapshot {
            request_id: request.request_id,
            payload: DecryptedSnapshot::default(),
        });
    });

    assert!(matches!(result, Err(SyncError::Protocol(_))));
}

#[tokio::test]
async fn ack_for_wrong_action_is_protocol_error() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (result, ()) = tokio::join!(bridge.init(Network::Testnet), async {
        let request = worker.next_request().await;
        worker.send(WorkerMessage::Ok {
            request_id: request.request_id,
            action: ActionKind::Sync,
        });
    });

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "protocol error: init was acknowledged as sync");
}

#[tokio::test]
async fn error_codes_map_to_error_kinds() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (result, ()) = tokio::join!(
        bridge.set_viewing_key(Zeroizing::new("zxviews1".into())),
        async {
            let request = worker.next_request().await;
            worker.send(WorkerMessage::Error {
                message: "setViewingKey requires init".into(),
                request_id: Some(request.request_id),
                fatal: false,
                code: Some(ErrorCode::Precondition),
            });
        }
    );
    assert!(matches!(
        result,
        Err(SyncError::Precondition(m)) if m == "setViewingKey requires init"
    ));

    let (result, ()) = tokio::join!(
        bridge.set_viewing_key(Zeroizing::new("zxviews1".into())),
        async {
            let request = worker.next_request().await;
            worker.send(WorkerMessage::Error {
                message: "bad checksum".into(),
                request_id: Some(request.request_id),
                fatal: false,
                code: Some(ErrorCode::InvalidKey),
            });
        }
    );
    assert!(matches!(
        result,
        Err(SyncError::Engine(EngineError::InvalidKey(m))) if m == "bad checksum"
    ));
    // Correlated non-fatal errors don't touch the cached status.
    assert_eq!(bridge.status().stage, SyncStage::Idle);
}

#[tokio::test]
async fn status_and_log_pushes_update_cached_state() {
    let (bridge, worker) = scripted_bridge(TIMEOUT);
    let mut status_rx = bridge.subscribe_status();
    let mut logs = bridge.subscribe_logs();

    let scanning = SyncStatus {
        stage: SyncStage::Scanning,
        progress: 42,
        latest_scanned_height: Some(4999),
        latest_chain_height: Some(12000),
        error_message: None,
    };
    worker.send(WorkerMessage::log("scanned 5000 blocks"));
    worker.send(WorkerMessage::SyncStatus {
        payload: SyncStatus::idle(),
    });
    worker.send(WorkerMessage::SyncStatus {
        payload: scanning.clone(),
    });
    settle().await;

    assert_eq!(bridge.status(), scanning);
    assert!(status_rx.has_changed().unwrap());
    assert_eq!(*status_rx.borrow_and_update(), scanning);
    assert_eq!(logs.recv().await.unwrap(), "scanned 5000 blocks");
}

#[tokio::test]
async fn uncorrelated_fatal_error_forces_error_status() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (result, ()) = tokio::join!(bridge.get_decrypted_snapshot(), async {
        let request = worker.next_request().await;
        worker.send(WorkerMessage::fatal("out of memory"));
        worker.send(WorkerMessage::Snapshot {
            request_id: request.request_id,
            payload: DecryptedSnapshot::default(),
        });
    });

    // The in-flight call is unaffected.
    assert_ok!(result);
    let status = bridge.status();
    assert_eq!(status.stage, SyncStage::Error);
    assert_eq!(status.error_message.as_deref(), Some("out of memory"));
}

#[tokio::test]
async fn correlated_fatal_error_rejects_and_sets_error_status() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (result, ()) = tokio::join!(bridge.get_decrypted_snapshot(), async {
        let request = worker.next_request().await;
        worker.send(WorkerMessage::Error {
            message: "block scan failed: bad note".into(),
            request_id: Some(request.request_id),
            fatal: true,
            code: Some(ErrorCode::Engine),
        });
    });

    assert!(matches!(result, Err(SyncError::FatalWorker(_))));
    assert!(bridge.status().is_error());
}

#[tokio::test]
async fn destroy_rejects_every_pending_request() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);
    let bridge = Arc::new(bridge);

    let calls: Vec<_> = (0..3)
        .map(|_| {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move { bridge.get_decrypted_snapshot().await })
        })
        .collect();
    for _ in 0..3 {
        worker.next_request().await;
    }
    assert_eq!(bridge.pending_requests(), 3);

    bridge.destroy();
    assert_eq!(bridge.pending_requests(), 0);
    assert!(bridge.is_terminated());

    for call in calls {
        assert!(matches!(call.await.unwrap(), Err(SyncError::WorkerTerminated)));
    }
    assert!(matches!(
        bridge.init(Network::Mainnet).await,
        Err(SyncError::WorkerTerminated)
    ));
    // The worker sees its request channel close.
    assert!(worker.requests.recv().await.is_none());
}

#[tokio::test]
async fn worker_exit_rejects_pending_and_errors_status() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);

    let (result, ()) = tokio::join!(bridge.get_decrypted_snapshot(), async {
        worker.next_request().await;
        let (closed_tx, _) = tokio::sync::mpsc::unbounded_channel();
        // Dropping the only message sender ends the dispatcher loop.
        drop(std::mem::replace(&mut worker.messages, closed_tx));
    });

    assert!(matches!(result, Err(SyncError::WorkerTerminated)));
    assert!(bridge.is_terminated());
    assert_eq!(
        bridge.status().error_message.as_deref(),
        Some("worker terminated unexpectedly")
    );
}

#[tokio::test]
async fn spawned_worker_round_trip() {
    let bridge = WorkerBridge::spawn(PlaceholderEngine::default(), TIMEOUT).unwrap();

    bridge.init(Network::Mainnet).await.unwrap();
    bridge
        .set_viewing_key(Zeroizing::new("zxviews1".into()))
        .await
        .unwrap();
    let snapshot = bridge.get_decrypted_snapshot().await.unwrap();
    assert!(snapshot.is_empty());

    let result = bridge
        .ingest_blocks(
            Vec::new(),
            shieldsync_sync::IngestRange {
                start_height: 0,
                end_height: 0,
                tip_height: 0,
            },
        )
        .await;
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(bridge.status().stage, SyncStage::Ready);

    bridge.destroy();
}

#[tokio::test]
async fn spawned_worker_rejects_empty_key() {
    let bridge = WorkerBridge::spawn(PlaceholderEngine::default(), TIMEOUT).unwrap();
    bridge.init(Network::Testnet).await.unwrap();

    let err = assert_err!(
        bridge
            .set_viewing_key(Zeroizing::new("   ".into()))
            .await
    );

    assert_eq!(
        err.to_string(),
        "decryption engine error: invalid viewing key: viewing key is empty"
    );
}

#[tokio::test(start_paused = true)]
async fn request_after_worker_exit_fails_without_waiting() {
    let (bridge, mut worker) = scripted_bridge(TIMEOUT);
    let (closed_tx, _) = tokio::sync::mpsc::unbounded_channel();
    drop(std::mem::replace(&mut worker.messages, closed_tx));
    settle().await;
    assert!(bridge.is_terminated());

    let started = tokio::time::Instant::now();
    let result = bridge.get_decrypted_snapshot().await;

    assert!(matches!(result, Err(SyncError::WorkerTerminated)));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(bridge.pending_requests(), 0);
    // The worker inbox is still open; nothing was queued on it.
    assert!(matches!(
        worker.requests.try_recv(),
        Err(tokio::sync::mpsc::error::TryRecvError::Empty)
    ));
}
