//! Trace event model shared between the interpreter and the visualiser.
//!
//! The interpreter produces an ordered list of [`TraceEvent`]s describing what
//! happened while the user's code ran. Events are plain immutable data; the
//! full list is the authoritative history of a session and is only ever
//! replayed up to an index, never reordered.
//!
//! ## Wire format
//!
//! Events use serde's externally tagged representation, which is what the
//! interpreter's tracer emits:
//!
//! ```text
//! {"Init":{"location":{"Variable":"x"},"value":{"value":{"Integer":5},"source":"Literal"}}}
//! ```
//!
//! Every enum carries a final `Unknown` arm that captures any shape this
//! version does not recognise, so a newer interpreter never breaks an older
//! visualiser.

mod format;
mod state;

pub use format::{format_data_source, format_trace_event, format_value};
pub use state::{state_at, StateMap};

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Identifier of an array allocated by the interpreter.
pub type Symbol = u64;

/// Where a value lives or came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataSource {
    /// A named variable.
    Variable(String),
    /// A slot inside an array.
    ArraySlot { id: Symbol, index: usize },
    /// The result of evaluating an expression.
    Expression,
    /// A literal in the source code.
    Literal,
    /// No provenance.
    None,
    /// A source shape this version does not recognise.
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

impl DataSource {
    /// Create a variable source.
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Create an array slot source.
    pub fn array_slot(id: Symbol, index: usize) -> Self {
        Self::ArraySlot { id, index }
    }

    /// The addressable location this source names, if any.
    ///
    /// Only variables and array slots are locations; the remaining variants
    /// are provenance markers.
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::Variable(name) => Some(Location::Variable(name.clone())),
            Self::ArraySlot { id, index } => Some(Location::ArraySlot {
                id: *id,
                index: *index,
            }),
            Self::Expression | Self::Literal | Self::None | Self::Unknown(_) => None,
        }
    }

    /// The variable name, if this source is a variable.
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Self::Variable(name) => Some(name),
            _ => None,
        }
    }
}

/// An addressable storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Location {
    Variable(String),
    ArraySlot { id: Symbol, index: usize },
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "Variable({})", name),
            Self::ArraySlot { id, index } => write!(f, "ArraySlot(id={}, index={})", id, index),
        }
    }
}

/// Static type of array elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Integer,
    Float,
    Boolean,
    String,
    Array(Box<Type>),
    Nil,
}

/// Kind of callable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionType {
    /// A function provided by the interpreter runtime.
    Native(String),
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Nil,
    Array {
        id: Symbol,
        elements: Vec<TrackedValue>,
        element_type: Type,
    },
    Function(FunctionType),
    /// A value shape this version does not recognise.
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

/// A value paired with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedValue {
    pub value: Value,
    pub source: DataSource,
}

impl TrackedValue {
    /// Create a tracked value.
    pub fn new(value: Value, source: DataSource) -> Self {
        Self { value, source }
    }

    /// Create a tracked value that originates from a literal.
    pub fn literal(value: Value) -> Self {
        Self::new(value, DataSource::Literal)
    }
}

/// Coarse classification of trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceEventKind {
    Init,
    Assign,
    Compare,
    Unknown,
}

impl std::fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "Init",
            Self::Assign => "Assign",
            Self::Compare => "Compare",
            Self::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

/// One atomic semantic action recorded by the interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// A storage location receives its first value.
    Init {
        location: DataSource,
        value: TrackedValue,
    },
    /// A value moves or derives from one source into another.
    Assign {
        from: DataSource,
        to: DataSource,
        value: TrackedValue,
    },
    /// A comparison occurred. No location is touched.
    Compare {
        left: TrackedValue,
        right: TrackedValue,
        result: bool,
    },
    /// An event shape this version does not recognise.
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

impl TraceEvent {
    /// Create an init event for a variable.
    pub fn init_variable(name: impl Into<String>, value: TrackedValue) -> Self {
        Self::Init {
            location: DataSource::variable(name),
            value,
        }
    }

    /// Create an assign event into a variable.
    pub fn assign_variable(from: DataSource, name: impl Into<String>, value: TrackedValue) -> Self {
        Self::Assign {
            from,
            to: DataSource::variable(name),
            value,
        }
    }

    /// Create a compare event.
    pub fn compare(left: TrackedValue, right: TrackedValue, result: bool) -> Self {
        Self::Compare {
            left,
            right,
            result,
        }
    }

    /// Get the event kind.
    pub fn kind(&self) -> TraceEventKind {
        match self {
            Self::Init { .. } => TraceEventKind::Init,
            Self::Assign { .. } => TraceEventKind::Assign,
            Self::Compare { .. } => TraceEventKind::Compare,
            Self::Unknown(_) => TraceEventKind::Unknown,
        }
    }

    /// The addressable location this event writes, if any.
    pub fn target(&self) -> Option<Location> {
        match self {
            Self::Init { location, .. } => location.location(),
            Self::Assign { to, .. } => to.location(),
            Self::Compare { .. } | Self::Unknown(_) => None,
        }
    }

    /// The value this event writes, if any.
    pub fn written_value(&self) -> Option<&TrackedValue> {
        match self {
            Self::Init { value, .. } | Self::Assign { value, .. } => Some(value),
            Self::Compare { .. } | Self::Unknown(_) => None,
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl std::fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_trace_event(self))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_value(self))
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_data_source(self))
    }
}

/// Parse a complete trace (a JSON array of events).
pub fn parse_trace(json: &str) -> Result<Vec<TraceEvent>> {
    Ok(serde_json::from_str(json)?)
}
