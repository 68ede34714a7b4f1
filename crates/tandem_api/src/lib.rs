//! Application-facing surface
//!
//! `WorkletsContext` ties the value model, schedulers, worklet runtimes,
//! event registry and the host-tree props stack into one facade, plus the
//! layout-animation configuration registry and the JSON-loadable settings.

mod animation;
mod context;
mod frame;
mod settings;

pub use animation::{LayoutAnimationKind, LayoutAnimationRegistry};
pub use context::WorkletsContext;
pub use frame::FrameQueue;
pub use settings::Settings;
