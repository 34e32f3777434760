//! Walks one synthetic message through the engine: a nested synchronous
//! section, a fan-out, and an asynchronous backend call, then prints the
//! finished flow via the built-in LogSink.
//!
//! Run with: `cargo run --example trace_flow --features logging`

use std::sync::Arc;
use std::time::Duration;

use flowvisor::{ComponentKind, ComponentRole, Config, LogSink, TraceEngine};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let engine = TraceEngine::new(Config::default(), vec![Arc::new(LogSink::new())]);

    let mut ctx = engine.begin_flow("demo-msg");
    let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);

    // Synchronous mediation.
    let log = engine.enter_component(
        &mut ctx,
        "LogMediator",
        ComponentKind::Mediator,
        ComponentRole::Simple,
    );
    engine.exit_component(&mut ctx, log, false);

    // Fan-out: two branches hanging off the clone mediator.
    let clone = engine.enter_component(
        &mut ctx,
        "CloneMediator",
        ComponentKind::Mediator,
        ComponentRole::Splitting,
    );
    for label in ["BranchSeqA", "BranchSeqB"] {
        let mut branch = engine.open_branch(&ctx);
        let t = engine.enter_component(
            &mut branch,
            label,
            ComponentKind::Sequence,
            ComponentRole::Simple,
        );
        engine.exit_component(&mut branch, t, true);
    }
    engine.exit_component(&mut ctx, clone, false);

    // Asynchronous backend call: the flow stays open until the response.
    let ep = engine.enter_component(
        &mut ctx,
        "BackendEndpoint",
        ComponentKind::Endpoint,
        ComponentRole::Continuable,
    );
    engine.register_callback(&ctx, "backend-cb");
    engine.exit_component(&mut ctx, ep, false);
    engine.exit_component(&mut ctx, api, false);

    // ...time passes, the backend answers on another thread...
    tokio::time::sleep(Duration::from_millis(10)).await;
    let mut rctx = engine
        .callback_received("backend-cb", true, false)
        .expect("continuation context");
    let resp = engine.enter_component(
        &mut rctx,
        "ResponseSeq",
        ComponentKind::Sequence,
        ComponentRole::Simple,
    );
    engine.exit_component(&mut rctx, resp, false);
    engine.callback_handled(&mut rctx, "backend-cb");

    engine.shutdown().await.expect("clean shutdown");
}
