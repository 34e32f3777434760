//! End-to-end scenarios: flow completion, callback gating, branches,
//! continuations, faults, and exactly-once emission under contention.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

use flowvisor::{
    ComponentKind, ComponentRole, Config, FinishedFlow, Observation, Sink, TraceEngine,
};

struct Capture {
    tx: UnboundedSender<FinishedFlow>,
}

#[async_trait]
impl Sink for Capture {
    async fn consume(&self, flow: &FinishedFlow) {
        let _ = self.tx.send(flow.clone());
    }
    fn name(&self) -> &'static str {
        "capture"
    }
}

fn engine() -> (Arc<TraceEngine>, UnboundedReceiver<FinishedFlow>) {
    let (tx, rx) = unbounded_channel();
    let cfg = Config {
        // Scenarios drive completion themselves; no sweep interference.
        flow_expiry: Duration::ZERO,
        ..Config::default()
    };
    (
        Arc::new(TraceEngine::new(cfg, vec![Arc::new(Capture { tx })])),
        rx,
    )
}

async fn next_flow(rx: &mut UnboundedReceiver<FinishedFlow>) -> FinishedFlow {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for finished flow")
        .expect("sink channel closed")
}

fn open_positions(flow: &FinishedFlow) -> Vec<(u32, i64)> {
    flow.observations
        .iter()
        .filter_map(|r| match &r.observation {
            Observation::Open {
                position,
                parent_position,
                ..
            } => Some((*position, *parent_position)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn synchronous_flow_finishes_balanced() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
    let med = engine.enter_component(
        &mut ctx,
        "LogMediator",
        ComponentKind::Mediator,
        ComponentRole::Simple,
    );
    engine.exit_component(&mut ctx, med, false);
    engine.exit_component(&mut ctx, api, false);

    let flow = next_flow(&mut rx).await;
    assert_eq!(flow.observations.len(), 4);
    assert!(flow.is_balanced());
    assert!(!flow.error);
    assert_eq!(open_positions(&flow), vec![(0, -1), (1, 0)]);
    assert_eq!(engine.active_flows(), 0);
}

#[tokio::test]
async fn pending_callback_gates_completion() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
    engine.register_callback(&ctx, "cb1");
    engine.exit_component(&mut ctx, api, false);

    // Structurally empty but still owing a response: not finished.
    assert_eq!(engine.active_flows(), 1);
    assert_eq!(engine.pending_callbacks(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.active_flows(), 1);

    assert!(engine.callback_received("cb1", false, false).is_none());
    assert_eq!(engine.pending_callbacks(), 0);

    let flow = next_flow(&mut rx).await;
    assert_eq!(flow.observations.len(), 4);
    assert!(flow.is_balanced());
}

#[tokio::test(flavor = "multi_thread")]
async fn branches_complete_independently() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let splitter = engine.enter_component(
        &mut ctx,
        "CloneMediator",
        ComponentKind::Mediator,
        ComponentRole::Splitting,
    );

    let mut branch_a = engine.open_branch(&ctx);
    let mut branch_b = engine.open_branch(&ctx);
    let id_a = branch_a.branch().cloned().unwrap();
    let id_b = branch_b.branch().cloned().unwrap();
    assert_ne!(id_a, id_b);
    assert_eq!(id_a.seq, 0);
    assert_eq!(id_b.seq, 1);

    let ea = Arc::clone(&engine);
    let a = tokio::task::spawn_blocking(move || {
        let t = ea.enter_component(
            &mut branch_a,
            "BranchSeqA",
            ComponentKind::Sequence,
            ComponentRole::Simple,
        );
        ea.exit_component(&mut branch_a, t, true);
    });
    let eb = Arc::clone(&engine);
    let b = tokio::task::spawn_blocking(move || {
        let t = eb.enter_component(
            &mut branch_b,
            "BranchSeqB",
            ComponentKind::Sequence,
            ComponentRole::Simple,
        );
        eb.exit_component(&mut branch_b, t, true);
    });
    a.await.unwrap();
    b.await.unwrap();

    // Parent flow finishes only once the splitter itself closes.
    assert_eq!(engine.active_flows(), 1);
    engine.exit_component(&mut ctx, splitter, false);

    let flow = next_flow(&mut rx).await;
    assert_eq!(flow.observations.len(), 6);
    assert!(flow.is_balanced());

    let opens = open_positions(&flow);
    // Both branches hang off the splitter, with distinct positions.
    let branch_opens: Vec<(u32, i64)> = opens.iter().copied().filter(|(p, _)| *p != 0).collect();
    assert_eq!(branch_opens.len(), 2);
    assert!(branch_opens.iter().all(|(_, parent)| *parent == 0));
    assert_ne!(branch_opens[0].0, branch_opens[1].0);
}

#[tokio::test(flavor = "multi_thread")]
async fn branch_fork_window_keeps_flow_open() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let splitter = engine.enter_component(
        &mut ctx,
        "CloneMediator",
        ComponentKind::Mediator,
        ComponentRole::Splitting,
    );
    let mut branch_a = engine.open_branch(&ctx);
    let mut branch_b = engine.open_branch(&ctx);

    // The splitter closes before either branch thread has started: the
    // forks alone must keep the flow from quiescing.
    engine.exit_component(&mut ctx, splitter, false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.active_flows(), 1);
    assert!(rx.try_recv().is_err());

    let ea = Arc::clone(&engine);
    let a = tokio::task::spawn_blocking(move || {
        let t = ea.enter_component(
            &mut branch_a,
            "BranchSeqA",
            ComponentKind::Sequence,
            ComponentRole::Simple,
        );
        ea.exit_component(&mut branch_a, t, false);
    });
    let eb = Arc::clone(&engine);
    let b = tokio::task::spawn_blocking(move || {
        let t = eb.enter_component(
            &mut branch_b,
            "BranchSeqB",
            ComponentKind::Sequence,
            ComponentRole::Simple,
        );
        eb.exit_component(&mut branch_b, t, false);
    });
    a.await.unwrap();
    b.await.unwrap();

    // Nothing was late-dropped: both branches' pairs made the record.
    let flow = next_flow(&mut rx).await;
    assert_eq!(flow.observations.len(), 6);
    assert!(flow.is_balanced());
}

#[tokio::test]
async fn unused_branch_releases_its_hold_on_drop() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let splitter = engine.enter_component(
        &mut ctx,
        "CloneMediator",
        ComponentKind::Mediator,
        ComponentRole::Splitting,
    );
    let branch = engine.open_branch(&ctx);
    engine.exit_component(&mut ctx, splitter, false);

    // Still held by the never-started branch.
    assert_eq!(engine.active_flows(), 1);
    drop(branch);

    let flow = next_flow(&mut rx).await;
    assert_eq!(flow.observations.len(), 2);
    assert!(flow.is_balanced());
}

#[tokio::test]
async fn nested_branches_get_distinct_identities() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let splitter = engine.enter_component(
        &mut ctx,
        "CloneMediator",
        ComponentKind::Mediator,
        ComponentRole::Splitting,
    );
    let branch = engine.open_branch(&ctx);
    let nested = engine.open_branch(&branch);

    let outer = branch.branch().cloned().unwrap();
    let inner = nested.branch().cloned().unwrap();
    assert_ne!(outer, inner);
    // The sub-branch hangs off the branch's derived identity, not the root's.
    assert_eq!(outer.parent.as_ref(), "msg-1");
    assert_eq!(inner.parent.as_ref(), "msg-1/0");

    drop(branch);
    drop(nested);
    engine.exit_component(&mut ctx, splitter, false);
    let flow = next_flow(&mut rx).await;
    assert!(flow.is_balanced());
}

#[tokio::test(flavor = "multi_thread")]
async fn suspended_path_resumes_on_another_thread() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
    let seq = engine.enter_component(
        &mut ctx,
        "StoreSequence",
        ComponentKind::Sequence,
        ComponentRole::Continuable,
    );

    let state = engine.suspend(&mut ctx);
    assert_eq!(ctx.parent_position(), -1);

    let e = Arc::clone(&engine);
    let hop = tokio::task::spawn_blocking(move || {
        e.resume(&mut ctx, state);
        assert_eq!(ctx.parent_position(), 1);
        e.reopen_continuation(&mut ctx);
        e.exit_component(&mut ctx, seq, false);
        e.exit_component(&mut ctx, api, false);
    });
    hop.await.unwrap();

    let flow = next_flow(&mut rx).await;
    assert_eq!(flow.observations.len(), 5);
    assert!(flow.is_balanced());
    assert!(flow.observations.iter().any(|r| matches!(
        r.observation,
        Observation::ContinuationReopen { position: 1 }
    )));
}

#[tokio::test]
async fn stale_continuation_resumes_at_flow_root() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);

    let state = engine.suspend(&mut ctx);
    let dup = state.clone();
    engine.resume(&mut ctx, state);
    assert_eq!(ctx.parent_position(), 0);

    // The clone was consumed together with the original: position context
    // degrades to the flow root, the flow itself carries on.
    engine.resume(&mut ctx, dup);
    assert_eq!(ctx.parent_position(), -1);

    engine.exit_component(&mut ctx, api, false);
    let flow = next_flow(&mut rx).await;
    assert_eq!(flow.observations.len(), 2);
    assert!(flow.is_balanced());
}

#[tokio::test]
async fn fault_force_ends_and_drops_late_observations() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
    let med = engine.enter_component(
        &mut ctx,
        "CalloutMediator",
        ComponentKind::Mediator,
        ComponentRole::Simple,
    );
    engine.report_fault(&mut ctx);

    let flow = next_flow(&mut rx).await;
    assert!(flow.error);
    // Open, Open, Fault, ForceEnd.
    assert_eq!(flow.observations.len(), 4);
    assert!(matches!(
        flow.observations.last().unwrap().observation,
        Observation::ForceEnd {
            error: true,
            expired: false
        }
    ));

    // Fault cleanup trails the force-end: dropped, no second emission.
    engine.exit_component(&mut ctx, med, false);
    engine.exit_component(&mut ctx, api, false);
    assert_eq!(engine.active_flows(), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn resumed_continuation_reports_original_parent() {
    let (engine, mut rx) = engine();

    let mut ctx = engine.begin_flow("msg-1");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
    let ep = engine.enter_component(
        &mut ctx,
        "BackendEndpoint",
        ComponentKind::Endpoint,
        ComponentRole::Continuable,
    );
    engine.register_callback(&ctx, "cb1");
    engine.exit_component(&mut ctx, ep, false);
    engine.exit_component(&mut ctx, api, false);
    assert_eq!(engine.active_flows(), 1);

    // Response arrives on another thread; context is rebuilt from the
    // suspended state captured at registration.
    let mut rctx = engine
        .callback_received("cb1", true, false)
        .expect("continuation context");
    assert_eq!(rctx.parent_position(), 1);

    let seq = engine.enter_component(
        &mut rctx,
        "ResponseSeq",
        ComponentKind::Sequence,
        ComponentRole::Simple,
    );
    engine.exit_component(&mut rctx, seq, false);
    engine.callback_handled(&mut rctx, "cb1");

    let flow = next_flow(&mut rx).await;
    assert!(flow.is_balanced());
    // The component entered after resume hangs off the endpoint, exactly as
    // if the backend call had been synchronous.
    assert!(open_positions(&flow).contains(&(2, 1)));
}

#[tokio::test]
async fn unknown_callback_is_absorbed() {
    let (engine, _rx) = engine();
    assert!(engine.callback_received("never-registered", true, false).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn exactly_once_when_close_races_callback() {
    const ROUNDS: usize = 100;
    let (engine, mut rx) = engine();

    for round in 0..ROUNDS {
        let mut ctx = engine.begin_flow(format!("msg-{round}"));
        let api =
            engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
        let cb = format!("cb-{round}");
        engine.register_callback(&ctx, &cb);

        let e1 = Arc::clone(&engine);
        let closer = tokio::task::spawn_blocking(move || {
            e1.exit_component(&mut ctx, api, false);
        });
        let e2 = Arc::clone(&engine);
        let receiver = tokio::task::spawn_blocking(move || {
            e2.callback_received(&cb, false, false);
        });
        closer.await.unwrap();
        receiver.await.unwrap();

        let flow = next_flow(&mut rx).await;
        assert_eq!(flow.observations.len(), 4, "round {round}");
        assert!(flow.is_balanced(), "round {round}");
    }

    // One emission per flow and nothing extra.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(engine.active_flows(), 0);
}

#[tokio::test]
async fn expiry_sweep_force_ends_stuck_flows() {
    let (tx, mut rx) = unbounded_channel();
    let cfg = Config {
        flow_expiry: Duration::from_millis(50),
        sweep_interval: Duration::from_millis(20),
        ..Config::default()
    };
    let engine = TraceEngine::new(cfg, vec![Arc::new(Capture { tx })]);

    let mut ctx = engine.begin_flow("msg-stuck");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
    engine.register_callback(&ctx, "cb-lost");
    engine.exit_component(&mut ctx, api, false);

    let flow = next_flow(&mut rx).await;
    assert!(flow.expired);
    assert!(!flow.error);
    assert!(matches!(
        flow.observations.last().unwrap().observation,
        Observation::ForceEnd {
            error: false,
            expired: true
        }
    ));

    // The lost callback's suspended state is purged with the flow.
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn disabled_statistics_observe_nothing() {
    let (tx, _rx) = unbounded_channel();
    let cfg = Config {
        statistics_enabled: false,
        tracing_enabled: false,
        ..Config::default()
    };
    let engine = TraceEngine::new(cfg, vec![Arc::new(Capture { tx })]);

    let mut ctx = engine.begin_flow("msg-1");
    let token =
        engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
    assert!(token.position().is_none());
    assert!(!ctx.is_active());
    engine.exit_component(&mut ctx, token, false);
    assert_eq!(engine.active_flows(), 0);
}
