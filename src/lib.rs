//! # trace-visualiser
//!
//! Event-driven replay engine for an educational programming environment.
//! An interpreter runs the learner's code and returns the full trace of what
//! happened; this crate replays that trace step by step through pluggable
//! visualiser modules that build the on-screen picture of program state.
//!
//! ## Core Components
//!
//! - **Events**: The trace event model and the derived "state at index" view
//! - **Bus**: Typed pub/sub between visualiser modules
//! - **Module**: The visualiser module contract, registry and catalog
//! - **Visualiser**: Per-level module lifecycle orchestration
//! - **Session**: Timed playback with pause, resume and restart
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex};
//! use trace_visualiser::{
//!     LevelConfig, LevelSession, ModuleCatalog, PlaybackConfig, RecordingRenderer,
//!     StaticInterpreter, Visualiser,
//! };
//!
//! let level = LevelConfig::new("variables-1", "Declaring variables").with_module("variables");
//! let visualiser = Visualiser::new(ModuleCatalog::builtin(), Arc::new(RecordingRenderer::new()));
//! let session = LevelSession::new(
//!     Arc::new(level),
//!     Arc::new(Mutex::new(visualiser)),
//!     Arc::new(StaticInterpreter::new(trace)),
//!     PlaybackConfig::default(),
//! );
//!
//! session.init()?;
//! session.start().await?;
//! ```

pub mod bus;
pub mod error;
pub mod events;
pub mod interpreter;
pub mod level;
pub mod module;
pub mod modules;
pub mod render;
pub mod session;
pub mod visualiser;

// Re-exports for convenience
pub use bus::{ModuleEvent, ModuleEventBus, ModuleEventType, SubscriptionId};
pub use error::{Error, Result};
pub use events::{
    format_data_source, format_trace_event, format_value, parse_trace, state_at, DataSource,
    FunctionType, Location, StateMap, Symbol, TraceEvent, TraceEventKind, TrackedValue, Type,
    Value,
};
pub use interpreter::{CommandInterpreter, CommandInterpreterConfig, Interpreter, StaticInterpreter};
pub use level::{Level, LevelConfig};
pub use module::{
    ModuleCatalog, ModuleFactory, ModuleHandle, ModuleRegistry, VisualiserContext,
    VisualiserModule,
};
pub use modules::{Variable, VariablesModule};
pub use render::{
    ElementHandle, ElementId, ElementKind, ElementSpec, NullRenderer, RecordingRenderer,
    RenderSurface, Renderer, SurfaceHandle, SurfaceId,
};
pub use session::{LevelSession, PlaybackConfig, PlaybackState, Timeline};
pub use visualiser::{Visualiser, ROOT_SCOPE};
