//! Human-readable rendering of trace events for logs and debug panels.

use super::{DataSource, FunctionType, TraceEvent, Value};

/// Render a value in its canonical short form.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Integer(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s),
        Value::Boolean(b) => if *b { "True" } else { "False" }.to_string(),
        Value::Nil => "Nil".to_string(),
        Value::Array { elements, .. } => {
            let elements: Vec<String> = elements.iter().map(|e| format_value(&e.value)).collect();
            format!("[{}]", elements.join(", "))
        }
        Value::Function(FunctionType::Native(name)) => format!("<native fn {}>", name),
        Value::Unknown(_) => "Unknown".to_string(),
    }
}

/// Render a data source in its canonical short form.
pub fn format_data_source(source: &DataSource) -> String {
    match source {
        DataSource::Variable(name) => format!("Variable({})", name),
        DataSource::ArraySlot { id, index } => format!("ArraySlot(id={}, index={})", id, index),
        DataSource::Expression => "Expression".to_string(),
        DataSource::Literal => "Literal".to_string(),
        DataSource::None => "None".to_string(),
        DataSource::Unknown(_) => "Unknown DataSource".to_string(),
    }
}

/// Render a trace event as a single deterministic line.
pub fn format_trace_event(event: &TraceEvent) -> String {
    match event {
        TraceEvent::Init { location, value } => format!(
            "Init {} at {}",
            format_value(&value.value),
            format_data_source(location)
        ),
        TraceEvent::Assign { from, to, value } => format!(
            "Assign {} from {} to {}",
            format_value(&value.value),
            format_data_source(from),
            format_data_source(to)
        ),
        TraceEvent::Compare {
            left,
            right,
            result,
        } => format!(
            "Compare {} and {}: {}",
            format_value(&left.value),
            format_value(&right.value),
            result
        ),
        TraceEvent::Unknown(_) => "Unknown TraceEvent".to_string(),
    }
}
