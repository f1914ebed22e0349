//! Property-based tests for trace replay using proptest.
//!
//! These tests check that module state is a pure function of the delivered
//! prefix of a trace:
//!
//! - Replaying a prefix gives the same variables and boxes every time
//! - The variables module agrees with the derived `state_at` view
//! - Reset is idempotent and a replay after reset matches a fresh replay

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::events::{state_at, DataSource, Location, TraceEvent, TrackedValue, Value};
    use crate::level::LevelConfig;
    use crate::module::ModuleCatalog;
    use crate::modules::VariablesModule;
    use crate::render::{ElementSpec, RecordingRenderer};
    use crate::visualiser::Visualiser;

    // Small name pool so Init and Assign collide often
    fn name() -> impl Strategy<Value = String> {
        prop_oneof![Just("a"), Just("b"), Just("c"), Just("i")].prop_map(String::from)
    }

    fn tracked() -> impl Strategy<Value = TrackedValue> {
        let value = prop_oneof![
            (-50i64..50).prop_map(Value::Integer),
            any::<bool>().prop_map(Value::Boolean),
            "[a-z]{0,4}".prop_map(Value::String),
            Just(Value::Nil),
        ];
        let source = prop_oneof![
            Just(DataSource::Literal),
            Just(DataSource::Expression),
            name().prop_map(DataSource::Variable),
        ];
        (value, source).prop_map(|(value, source)| TrackedValue::new(value, source))
    }

    fn event() -> impl Strategy<Value = TraceEvent> {
        prop_oneof![
            3 => (name(), tracked()).prop_map(|(n, v)| TraceEvent::init_variable(n, v)),
            4 => (name(), tracked()).prop_map(|(n, v)| TraceEvent::assign_variable(DataSource::Expression, n, v)),
            1 => (tracked(), tracked(), any::<bool>()).prop_map(|(l, r, b)| TraceEvent::compare(l, r, b)),
            1 => ((0u64..4), (0usize..4), tracked()).prop_map(|(id, index, v)| TraceEvent::Init {
                location: DataSource::array_slot(id, index),
                value: v,
            }),
        ]
    }

    fn trace_with_prefix() -> impl Strategy<Value = (Vec<TraceEvent>, usize)> {
        prop::collection::vec(event(), 0..40).prop_flat_map(|events| {
            let len = events.len();
            (Just(events), 0..=len)
        })
    }

    struct Harness {
        renderer: Arc<RecordingRenderer>,
        visualiser: Visualiser,
    }

    fn harness() -> Harness {
        let renderer = Arc::new(RecordingRenderer::new());
        let mut visualiser = Visualiser::new(ModuleCatalog::builtin(), renderer.clone());
        visualiser
            .init_level(&LevelConfig::new("prop", "Prop").with_module(VariablesModule::NAME))
            .unwrap();
        Harness { renderer, visualiser }
    }

    fn replay(visualiser: &Visualiser, events: &[TraceEvent], count: usize) {
        for i in 0..count {
            visualiser.handle_event(&events[i], &events[..=i]);
        }
    }

    fn variables(visualiser: &Visualiser) -> BTreeMap<String, TrackedValue> {
        visualiser
            .registry()
            .with_module::<VariablesModule, _>(VariablesModule::NAME, |m| {
                m.variables()
                    .iter()
                    .map(|(name, var)| (name.clone(), var.data.clone()))
                    .collect()
            })
            .unwrap()
    }

    fn boxes(renderer: &RecordingRenderer) -> Vec<ElementSpec> {
        let mut boxes = renderer.elements_in_scope(VariablesModule::NAME);
        boxes.sort_by(|a, b| a.label.cmp(&b.label));
        boxes
    }

    proptest! {
        /// Two visualisers fed the same prefix end up in the same state.
        #[test]
        fn replay_is_deterministic((events, count) in trace_with_prefix()) {
            let first = harness();
            let second = harness();
            replay(&first.visualiser, &events, count);
            replay(&second.visualiser, &events, count);

            prop_assert_eq!(variables(&first.visualiser), variables(&second.visualiser));
            prop_assert_eq!(boxes(&first.renderer), boxes(&second.renderer));
        }

        /// Every declared variable holds the value `state_at` reports for it.
        #[test]
        fn variables_agree_with_state_at((events, count) in trace_with_prefix()) {
            let h = harness();
            replay(&h.visualiser, &events, count);

            let state = state_at(&events, count);
            let vars = variables(&h.visualiser);
            for (name, data) in &vars {
                prop_assert_eq!(Some(data), state.get(&Location::Variable(name.clone())));
            }

            // A name is declared iff some Init targeted it within the prefix.
            let declared: std::collections::BTreeSet<&str> = events[..count]
                .iter()
                .filter_map(|e| match e {
                    TraceEvent::Init { location, .. } => location.variable_name(),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(vars.keys().map(String::as_str).collect::<std::collections::BTreeSet<_>>(), declared);
            prop_assert_eq!(h.renderer.element_count(), vars.len());
        }

        /// Reset twice equals reset once, and a replay afterwards matches a fresh one.
        #[test]
        fn reset_then_replay_matches_fresh((events, count) in trace_with_prefix()) {
            let mut used = harness();
            replay(&used.visualiser, &events, events.len());
            used.visualiser.reset();
            used.visualiser.reset();
            prop_assert!(variables(&used.visualiser).is_empty());
            prop_assert_eq!(used.renderer.element_count(), 0);

            replay(&used.visualiser, &events, count);
            let fresh = harness();
            replay(&fresh.visualiser, &events, count);

            prop_assert_eq!(variables(&used.visualiser), variables(&fresh.visualiser));
            prop_assert_eq!(boxes(&used.renderer), boxes(&fresh.renderer));
        }
    }
}
