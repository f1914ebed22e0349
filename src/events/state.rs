//! Derived "state at index" view over a trace.

use std::collections::BTreeMap;

use super::{Location, TraceEvent, TrackedValue};

/// Current value of every addressable location.
pub type StateMap = BTreeMap<Location, TrackedValue>;

/// Compute the value held by every location after applying the first `count`
/// events of `events`.
///
/// `count` is clamped to the trace length. Compare events and writes into
/// non-addressable sources leave the map untouched.
pub fn state_at(events: &[TraceEvent], count: usize) -> StateMap {
    let mut state = StateMap::new();
    for event in &events[..count.min(events.len())] {
        if let (Some(location), Some(value)) = (event.target(), event.written_value()) {
            state.insert(location, value.clone());
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DataSource, Value};

    fn trace() -> Vec<TraceEvent> {
        vec![
            TraceEvent::init_variable("x", TrackedValue::literal(Value::Integer(1))),
            TraceEvent::compare(
                TrackedValue::literal(Value::Integer(1)),
                TrackedValue::literal(Value::Integer(2)),
                false,
            ),
            TraceEvent::Assign {
                from: DataSource::Expression,
                to: DataSource::array_slot(7, 0),
                value: TrackedValue::new(Value::Integer(9), DataSource::Expression),
            },
            TraceEvent::assign_variable(
                DataSource::Literal,
                "x",
                TrackedValue::literal(Value::Integer(2)),
            ),
            TraceEvent::Assign {
                from: DataSource::Literal,
                to: DataSource::Expression,
                value: TrackedValue::literal(Value::Nil),
            },
        ]
    }

    #[test]
    fn test_empty_prefix() {
        assert!(state_at(&trace(), 0).is_empty());
    }

    #[test]
    fn test_prefix_tracks_latest_write() {
        let events = trace();

        let state = state_at(&events, 1);
        assert_eq!(state.len(), 1);
        assert_eq!(
            state[&Location::Variable("x".into())].value,
            Value::Integer(1)
        );

        let state = state_at(&events, 4);
        assert_eq!(state.len(), 2);
        assert_eq!(
            state[&Location::Variable("x".into())].value,
            Value::Integer(2)
        );
        assert_eq!(
            state[&Location::ArraySlot { id: 7, index: 0 }].value,
            Value::Integer(9)
        );
    }

    #[test]
    fn test_count_is_clamped() {
        let events = trace();
        assert_eq!(state_at(&events, 100), state_at(&events, events.len()));
    }
}
