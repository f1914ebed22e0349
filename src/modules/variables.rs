//! Variables module: one box per live variable.
//!
//! Tracks named storage locations and their current values. `Init` into a
//! variable is the only way a variable comes into existence; `Assign` into a
//! name that was never initialised is ignored.

use std::any::Any;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::ModuleEvent;
use crate::events::{format_data_source, format_value, DataSource, TraceEvent, TrackedValue};
use crate::module::{VisualiserContext, VisualiserModule};
use crate::render::{ElementHandle, ElementKind, ElementSpec, RenderSurface};

/// A declared variable and its current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub data: TrackedValue,
}

impl Variable {
    fn element_spec(&self) -> ElementSpec {
        ElementSpec::new(
            ElementKind::VariableBox,
            &self.name,
            format_value(&self.data.value),
        )
        .with_source(format_data_source(&self.data.source))
    }
}

/// Module rendering variable boxes.
#[derive(Debug, Default)]
pub struct VariablesModule {
    variables: BTreeMap<String, Variable>,
    elements: BTreeMap<String, ElementHandle>,
    context: Option<VisualiserContext>,
    surface: Option<RenderSurface>,
    destroyed: bool,
}

impl VariablesModule {
    /// Catalog name and module id.
    pub const NAME: &'static str = "variables";

    /// Create an uninitialised module.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current variables keyed by name.
    pub fn variables(&self) -> &BTreeMap<String, Variable> {
        &self.variables
    }

    /// Look up one variable.
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Number of live visual elements owned by this module.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Whether `destroy` has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Remove a variable and its element.
    ///
    /// No trace event drives this; it exists for hosts and sibling modules
    /// that track scope lifetimes themselves.
    pub fn remove_variable(&mut self, name: &str) -> Option<Variable> {
        // Dropping the handle releases the element.
        self.elements.remove(name);
        self.variables.remove(name)
    }

    fn publish(&self, event: ModuleEvent) {
        if let Some(context) = &self.context {
            context.bus.publish(event);
        }
    }

    fn handle_init(&mut self, name: &str, data: &TrackedValue) {
        if let Some(existing) = self.variables.get_mut(name) {
            // Re-declaration of a live name: keep the single box, refresh it.
            let old_data = std::mem::replace(&mut existing.data, data.clone());
            let spec = existing.element_spec();
            if let Some(element) = self.elements.get(name) {
                element.update(&spec);
            }
            debug!(name, "Variable re-declared");
            self.publish(ModuleEvent::VariableChanged {
                name: name.to_string(),
                old_data,
                new_data: data.clone(),
            });
            return;
        }

        let variable = Variable {
            name: name.to_string(),
            data: data.clone(),
        };

        if let Some(surface) = &self.surface {
            let element = surface.create_element(&variable.element_spec());
            self.elements.insert(name.to_string(), element);
        }
        self.variables.insert(name.to_string(), variable);

        debug!(name, "Variable declared");
        self.publish(ModuleEvent::VariableDeclared {
            name: name.to_string(),
            data: data.clone(),
        });
    }

    fn handle_assign(&mut self, name: &str, data: &TrackedValue) {
        let Some(variable) = self.variables.get_mut(name) else {
            debug!(name, "Ignoring assignment to undeclared variable");
            return;
        };

        let old_data = std::mem::replace(&mut variable.data, data.clone());
        let spec = variable.element_spec();
        if let Some(element) = self.elements.get(name) {
            element.update(&spec);
        }

        self.publish(ModuleEvent::VariableChanged {
            name: name.to_string(),
            old_data,
            new_data: data.clone(),
        });
    }

    fn clear(&mut self) {
        self.elements.clear();
        self.variables.clear();
    }
}

impl VisualiserModule for VariablesModule {
    fn id(&self) -> &str {
        Self::NAME
    }

    fn init(&mut self, context: VisualiserContext, surface: RenderSurface) {
        self.context = Some(context);
        self.surface = Some(surface);
        self.destroyed = false;
    }

    fn handle_event(&mut self, event: &TraceEvent, _history: &[TraceEvent]) {
        if self.destroyed {
            return;
        }

        match event {
            TraceEvent::Init {
                location: DataSource::Variable(name),
                value,
            } => self.handle_init(name, value),
            TraceEvent::Assign {
                to: DataSource::Variable(name),
                value,
                ..
            } => self.handle_assign(name, value),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.clear();
    }

    fn destroy(&mut self) {
        self.clear();
        self.surface = None;
        self.context = None;
        self.destroyed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
