//! Tandem demo runtime
//!
//! Boots the two cooperating event-loop threads, wires a worklets context to
//! an in-memory host tree, and drives one scroll event end to end: a worklet
//! event handler runs on the UI runtime, writes props, and the deferred
//! flush commits them into the tree.

use anyhow::Result;
use std::sync::Arc;
use tandem_api::{Settings, WorkletsContext};
use tandem_core::{JsFunction, JsValue, WorkletSource};
use tandem_sched::EventLoopThread;
use tandem_tree::{InMemoryRenderer, NodeId, PropsMap, ShadowNode, TreeRenderer};

const UNPACKER: &str = "globalThis.__valueUnpacker = (code, captures) => {\n\
                        const factory = eval(code);\n\
                        return (...args) => factory(captures, ...args);\n\
                        };";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let ui_loop = Arc::new(EventLoopThread::spawn("tandem-ui"));
    let main_loop = Arc::new(EventLoopThread::spawn("tandem-main"));

    let root = ShadowNode::new(
        NodeId(1),
        PropsMap::new(),
        vec![ShadowNode::new(NodeId(42), PropsMap::new(), vec![])],
    );
    let renderer = Arc::new(InMemoryRenderer::new(root));

    let context = WorkletsContext::new(
        Settings::default(),
        renderer.clone(),
        ui_loop,
        main_loop,
    )?;
    context.install_core_functions(UNPACKER)?;
    tracing::info!("worklets context initialized");

    // An event handler authored "on the main runtime", re-instantiated on
    // the UI runtime by the unpacker when the event fires.
    let handler = context.make_shareable(&JsValue::Function(JsFunction::worklet(
        context.main_runtime().id(),
        Arc::new(WorkletSource {
            name: Arc::from("onScroll"),
            code: Arc::from(
                "(captures, event) => { globalThis.__lastScrollY = event.payload.y; }",
            ),
            hash: 0,
        }),
        vec![],
    )))?;
    context.register_event_handler("topScroll", Some(42), handler);

    // Buffer a layout write for the scrolled node; handle_event flushes it.
    let patch: PropsMap = [("height".to_string(), serde_json::json!(240))]
        .into_iter()
        .collect();
    context.update_props(NodeId(42), &patch);

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let scheduler = context.scheduler().clone();
    {
        let context = context.clone();
        scheduler.schedule_on_ui(Box::new(move || {
            let payload = JsValue::object([("y".to_string(), JsValue::Number(128.0))]);
            let handled = context.handle_event("topScroll", Some(42), 16.6, &payload);
            let _ = done_tx.send(handled);
        }));
    }
    let handled = done_rx.recv()?;
    tracing::info!(handled, "scroll event dispatched");

    let node = renderer
        .find_node(NodeId(42))
        .expect("node 42 is still mounted");
    tracing::info!(height = ?node.props().get("height"), "committed props");

    let seen = context
        .ui_runtime()
        .engine()
        .eval_json("globalThis.__lastScrollY ?? null")?;
    tracing::info!(%seen, "scroll offset observed by the worklet");

    Ok(())
}
