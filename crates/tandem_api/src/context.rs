//! The application-facing facade
//!
//! `WorkletsContext` wires the whole subsystem together: the two fixed
//! runtimes and their schedulers, the event handler registry, the props
//! stack hooked into the host renderer, layout-animation configs and the
//! animation-frame queue. One context per host surface.

use crate::animation::{LayoutAnimationKind, LayoutAnimationRegistry};
use crate::frame::FrameQueue;
use crate::settings::Settings;
use parking_lot::Mutex;
use std::sync::Arc;
use tandem_core::{JsValue, RuntimeLivenessRegistry, Shareable, ValueError};
use tandem_events::{EventHandlerRegistry, TargetId};
use tandem_sched::{DualScheduler, MessageLoop, ThreadLane};
use tandem_tree::{
    CommitState, LayoutPropsTable, NodeId, PropsCommitHook, PropsMap, PropsMountHook,
    PropsRegistry, PropsUpdater, TreeRenderer,
};
use tandem_worklets::{
    decorate_runtime, EngineError, QuickJsEngine, RuntimeManager, WorkletEngine, WorkletRuntime,
};

type RenderRequester = Arc<dyn Fn() + Send + Sync>;

/// Platform event names arrive with a `top` prefix; handlers are keyed by
/// the `on` form.
fn normalize_event_name(name: &str) -> String {
    match name.strip_prefix("top") {
        Some(rest) => format!("on{rest}"),
        None => name.to_string(),
    }
}

pub struct WorkletsContext {
    liveness: Arc<RuntimeLivenessRegistry>,
    scheduler: DualScheduler,
    manager: RuntimeManager,
    main_runtime: Arc<WorkletRuntime>,
    ui_runtime: Arc<WorkletRuntime>,
    events: Arc<EventHandlerRegistry>,
    renderer: Arc<dyn TreeRenderer>,
    updater: PropsUpdater,
    layout_props: Arc<LayoutPropsTable>,
    animations: LayoutAnimationRegistry,
    frames: FrameQueue,
    render_requester: Mutex<Option<RenderRequester>>,
    unpacker_source: Mutex<Option<String>>,
}

impl WorkletsContext {
    pub fn new(
        settings: Settings,
        renderer: Arc<dyn TreeRenderer>,
        ui_loop: Arc<dyn MessageLoop>,
        main_loop: Arc<dyn MessageLoop>,
    ) -> Result<Arc<Self>, EngineError> {
        let liveness = Arc::new(RuntimeLivenessRegistry::new());
        let manager = RuntimeManager::new(
            liveness.clone(),
            Arc::new(|| Ok(Arc::new(QuickJsEngine::new()?) as Arc<dyn WorkletEngine>)),
        );
        let scheduler = DualScheduler::new(ui_loop, main_loop);

        let main_runtime = manager.create(&settings.main_runtime_name, ThreadLane::Main)?;
        let ui_runtime = manager.create(&settings.ui_runtime_name, ThreadLane::Ui)?;
        decorate_runtime(&ui_runtime, &scheduler, &main_runtime, &liveness);
        decorate_runtime(&main_runtime, &scheduler, &main_runtime, &liveness);

        let layout_props = Arc::new(LayoutPropsTable::new());
        layout_props.configure(settings.layout_props.iter().cloned());

        let registry = Arc::new(PropsRegistry::new());
        let state = Arc::new(CommitState::new());
        renderer.register_commit_hook(Arc::new(PropsCommitHook::new(registry.clone())));
        renderer.register_mount_hook(Arc::new(PropsMountHook::new(state.clone())));
        let updater = PropsUpdater::new(registry, state, renderer.clone(), layout_props.clone());

        Ok(Arc::new(Self {
            liveness,
            scheduler,
            manager,
            main_runtime,
            ui_runtime,
            events: Arc::new(EventHandlerRegistry::new()),
            renderer,
            updater,
            layout_props,
            animations: LayoutAnimationRegistry::new(settings.layout_animations_enabled),
            frames: FrameQueue::new(),
            render_requester: Mutex::new(None),
            unpacker_source: Mutex::new(None),
        }))
    }

    pub fn ui_runtime(&self) -> &Arc<WorkletRuntime> {
        &self.ui_runtime
    }

    pub fn main_runtime(&self) -> &Arc<WorkletRuntime> {
        &self.main_runtime
    }

    pub fn scheduler(&self) -> &DualScheduler {
        &self.scheduler
    }

    pub fn liveness(&self) -> &Arc<RuntimeLivenessRegistry> {
        &self.liveness
    }

    pub fn layout_animations(&self) -> &LayoutAnimationRegistry {
        &self.animations
    }

    // --- value sharing -----------------------------------------------------

    /// Deep-copy `value`, as observed on the main runtime, into a shareable.
    pub fn make_shareable(&self, value: &JsValue) -> Result<Arc<Shareable>, ValueError> {
        Shareable::wrap(&self.liveness, self.main_runtime.id(), value)
    }

    pub fn make_synchronized_data_holder(
        &self,
        initial: &JsValue,
    ) -> Result<Arc<Shareable>, ValueError> {
        Shareable::synchronized(&self.liveness, self.main_runtime.id(), initial)
    }

    pub fn get_data_synchronously(&self, holder: &Arc<Shareable>) -> Result<JsValue, ValueError> {
        holder.synchronized_get(&*self.ui_runtime)
    }

    pub fn update_data_synchronously(
        &self,
        holder: &Arc<Shareable>,
        value: &JsValue,
    ) -> Result<(), ValueError> {
        holder.synchronized_set(self.main_runtime.id(), value)
    }

    /// Compile and install the value unpacker on the UI runtime; runtimes
    /// created afterwards get the same source installed at creation.
    pub fn install_core_functions(&self, unpacker_source: &str) -> Result<(), EngineError> {
        self.ui_runtime.install_unpacker_source(unpacker_source)?;
        *self.unpacker_source.lock() = Some(unpacker_source.to_string());
        Ok(())
    }

    // --- scheduling --------------------------------------------------------

    /// Schedule a worklet onto the UI runtime. Only worklets may cross this
    /// way; anything else is a caller error surfaced synchronously.
    pub fn schedule_on_ui(&self, worklet: Arc<Shareable>) -> Result<(), ValueError> {
        worklet.expect_worklet()?;
        let ui = self.ui_runtime.clone();
        self.scheduler
            .schedule_on_ui(Box::new(move || ui.run_guarded(&worklet, &[])));
        Ok(())
    }

    /// Schedule a remote function back onto its home (main) runtime, with
    /// optionally shared arguments.
    pub fn schedule_on_main(
        &self,
        function: Arc<Shareable>,
        args: Option<Arc<Shareable>>,
    ) -> Result<(), ValueError> {
        function.expect_remote_function()?;
        let main = self.main_runtime.clone();
        self.scheduler.schedule_on_main(Box::new(move || match args {
            // fast path for a remote function without arguments
            None => main.run_guarded(&function, &[]),
            Some(ref shared) => main.run_guarded_shared(&function, Some(shared)),
        }));
        Ok(())
    }

    /// Build a new isolated execution context, decorated like the UI runtime
    /// and driven from the UI thread's run loop.
    pub fn create_runtime(&self, name: &str) -> Result<Arc<WorkletRuntime>, EngineError> {
        let runtime = self.manager.create(name, ThreadLane::Ui)?;
        decorate_runtime(&runtime, &self.scheduler, &self.main_runtime, &self.liveness);
        if let Some(source) = self.unpacker_source.lock().clone() {
            runtime.install_unpacker_source(&source)?;
        }
        Ok(runtime)
    }

    pub fn schedule_on_runtime(
        &self,
        runtime: &Arc<WorkletRuntime>,
        worklet: Arc<Shareable>,
    ) -> Result<(), ValueError> {
        worklet.expect_worklet()?;
        let runtime = runtime.clone();
        self.scheduler.schedule_on(
            runtime.lane(),
            Box::new(move || runtime.run_guarded(&worklet, &[])),
        );
        Ok(())
    }

    // --- events ------------------------------------------------------------

    /// Register `handler` for an event. The id is allocated eagerly; the
    /// registration itself lands on the UI thread with other scheduled work.
    pub fn register_event_handler(
        &self,
        event_name: &str,
        target: Option<TargetId>,
        handler: Arc<Shareable>,
    ) -> u64 {
        let id = self.events.next_id();
        let normalized = normalize_event_name(event_name);
        let events = self.events.clone();
        self.scheduler.schedule_on_ui(Box::new(move || {
            events.register(id, &normalized, target, handler);
        }));
        id
    }

    pub fn unregister_event_handler(&self, id: u64) {
        let events = self.events.clone();
        self.scheduler
            .schedule_on_ui(Box::new(move || events.unregister(id)));
    }

    pub fn is_any_handler_waiting_for(&self, event_name: &str, target: Option<TargetId>) -> bool {
        self.events
            .is_any_handler_waiting_for(&normalize_event_name(event_name), target)
    }

    /// Dispatch an event to every matching handler on the UI runtime, then
    /// flush deferred prop writes. Returns whether any handler consumed the
    /// event; an event for an unmounted target matches no handlers and is
    /// not an error. Must run on the UI thread.
    pub fn handle_event(
        &self,
        event_name: &str,
        target: Option<TargetId>,
        timestamp: f64,
        payload: &JsValue,
    ) -> bool {
        let normalized = normalize_event_name(event_name);
        let ui = &self.ui_runtime;
        let handled = self
            .events
            .dispatch(&normalized, target, timestamp, payload, |handler, event| {
                ui.run_guarded(handler, &[event]);
            });
        self.updater.perform_operations();
        handled
    }

    // --- props -------------------------------------------------------------

    pub fn update_props(&self, node: NodeId, patch: &PropsMap) {
        match self.renderer.find_node(node) {
            Some(node) => self.updater.update_props(&node, patch),
            None => {
                tracing::trace!(node = node.0, "dropping props update for an unknown node");
            }
        }
    }

    /// The host reported `node` unmounted; its buffered writes and animation
    /// configs go away.
    pub fn remove_from_props_registry(&self, node: NodeId) {
        self.updater.registry().mark_removed(node);
        self.animations.drop_for_view(node.0);
    }

    /// Flush buffered layout writes through a commit transaction.
    pub fn perform_operations(&self) {
        self.updater.perform_operations();
    }

    /// Read one prop of a live node on the UI thread and deliver it to
    /// `callback` (a function homed on the main runtime) back on the main
    /// thread. An unmounted node or absent prop delivers undefined.
    pub fn get_view_prop(
        &self,
        node: NodeId,
        prop_name: &str,
        callback: Arc<Shareable>,
    ) -> Result<(), ValueError> {
        callback.expect_remote_function()?;
        let renderer = self.renderer.clone();
        let main = self.main_runtime.clone();
        let scheduler = self.scheduler.clone();
        let prop_name = prop_name.to_string();
        self.scheduler.schedule_on_ui(Box::new(move || {
            let value = renderer
                .find_node(node)
                .and_then(|node| node.props().get(&prop_name).cloned())
                .map(|prop| JsValue::from_json(&prop))
                .unwrap_or(JsValue::Undefined);
            scheduler.schedule_on_main(Box::new(move || {
                main.run_guarded(&callback, &[value]);
            }));
        }));
        Ok(())
    }

    /// Extend the layout-relevant prop allow-list.
    pub fn configure_props<I, S>(&self, layout_prop_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layout_props.configure(layout_prop_names);
    }

    // --- layout animations ---------------------------------------------------

    pub fn configure_layout_animation(
        &self,
        view_tag: u64,
        kind: LayoutAnimationKind,
        config: Arc<Shareable>,
    ) {
        self.animations.configure(view_tag, kind, config);
    }

    pub fn enable_layout_animations(&self, enabled: bool) {
        self.animations.set_enabled(enabled);
    }

    // --- animation frames ----------------------------------------------------

    pub fn set_render_requester<F>(&self, requester: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.render_requester.lock() = Some(Arc::new(requester));
    }

    /// Buffer a frame callback; the first one since the last frame issues a
    /// single render request, further ones coalesce into it.
    pub fn request_animation_frame(&self, worklet: Arc<Shareable>) -> Result<(), ValueError> {
        worklet.expect_worklet()?;
        if self.frames.push(worklet) {
            // Clone out of the lock; the requester may re-enter this context.
            let requester = self.render_requester.lock().clone();
            match requester {
                Some(request) => request(),
                None => tracing::debug!("frame callback buffered with no render requester"),
            }
        }
        Ok(())
    }

    /// Run the current batch of frame callbacks with the frame timestamp.
    /// Callbacks registered while the batch runs go to the next frame. Must
    /// run on the UI thread.
    pub fn on_render(&self, timestamp: f64) {
        for callback in self.frames.take_batch() {
            self.ui_runtime
                .run_guarded(&callback, &[JsValue::Number(timestamp)]);
        }
    }
}
