//! Renderer collaborator and the visual handles modules own.
//!
//! The core never draws anything itself. A [`Renderer`] is injected into the
//! visualiser and asked to create or destroy logical visual handles:
//!
//! - a *surface* is a mount point (one root, one per module)
//! - an *element* is a single visual item living on a surface
//!
//! Handles are RAII: dropping an [`ElementHandle`] or [`SurfaceHandle`]
//! releases it, and explicit `release()` calls are idempotent, so a handle is
//! released exactly once however teardown is sequenced.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier of a surface issued by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(pub u64);

/// Identifier of an element issued by a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

/// What kind of visual item an element is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// A named box showing a variable's current value
    VariableBox,
}

/// Description of an element's content. Layout and styling belong to the
/// renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub kind: ElementKind,
    /// Primary label (e.g. the variable name)
    pub label: String,
    /// Rendered content (e.g. the formatted value)
    pub text: String,
    /// Where the content came from, for provenance highlighting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ElementSpec {
    /// Create a new element spec.
    pub fn new(kind: ElementKind, label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            text: text.into(),
            source: None,
        }
    }

    /// Attach provenance.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Creates and destroys visual handles on behalf of the visualiser.
///
/// Removing an id that is unknown or already removed must be a no-op.
pub trait Renderer: Send + Sync {
    /// Create a surface, optionally nested in a parent surface.
    fn create_surface(&self, parent: Option<SurfaceId>, scope: &str) -> SurfaceId;

    /// Remove a surface together with everything mounted on it.
    fn remove_surface(&self, surface: SurfaceId);

    /// Create an element on a surface.
    fn create_element(&self, surface: SurfaceId, spec: &ElementSpec) -> ElementId;

    /// Replace an element's content.
    fn update_element(&self, element: ElementId, spec: &ElementSpec);

    /// Remove an element.
    fn remove_element(&self, element: ElementId);
}

/// Non-owning view of a surface handed to a module.
///
/// Elements created through it are children of this surface only.
#[derive(Clone)]
pub struct RenderSurface {
    id: SurfaceId,
    scope: String,
    renderer: Arc<dyn Renderer>,
}

impl RenderSurface {
    /// Get the surface id.
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Get the scope this surface was created for (the module id, or `root`).
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Create an element on this surface.
    pub fn create_element(&self, spec: &ElementSpec) -> ElementHandle {
        let id = self.renderer.create_element(self.id, spec);
        ElementHandle {
            id,
            renderer: Arc::clone(&self.renderer),
            released: false,
        }
    }
}

impl std::fmt::Debug for RenderSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSurface")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Owning handle to a surface. Released on drop.
pub struct SurfaceHandle {
    view: RenderSurface,
    released: bool,
}

impl SurfaceHandle {
    /// Ask the renderer for a new surface.
    pub fn create(renderer: Arc<dyn Renderer>, parent: Option<SurfaceId>, scope: &str) -> Self {
        let id = renderer.create_surface(parent, scope);
        debug!(?id, scope, "Surface created");
        Self {
            view: RenderSurface {
                id,
                scope: scope.to_string(),
                renderer,
            },
            released: false,
        }
    }

    /// Get a non-owning view of this surface.
    pub fn surface(&self) -> RenderSurface {
        self.view.clone()
    }

    /// Get the surface id.
    pub fn id(&self) -> SurfaceId {
        self.view.id
    }

    /// Whether the surface has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the surface. Subsequent calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.view.renderer.remove_surface(self.view.id);
            debug!(id = ?self.view.id, scope = %self.view.scope, "Surface released");
        }
    }
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owning handle to an element. Released on drop.
pub struct ElementHandle {
    id: ElementId,
    renderer: Arc<dyn Renderer>,
    released: bool,
}

impl ElementHandle {
    /// Get the element id.
    pub fn id(&self) -> ElementId {
        self.id
    }

    /// Replace the element's content. Ignored once released.
    pub fn update(&self, spec: &ElementSpec) {
        if !self.released {
            self.renderer.update_element(self.id, spec);
        }
    }

    /// Whether the element has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Remove the element. Subsequent calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.renderer.remove_element(self.id);
        }
    }
}

impl Drop for ElementHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

// =============================================================================
// Renderers
// =============================================================================

/// Renderer that issues ids and draws nothing.
#[derive(Debug, Default)]
pub struct NullRenderer {
    next_id: std::sync::atomic::AtomicU64,
}

impl NullRenderer {
    /// Create a new null renderer.
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1
    }
}

impl Renderer for NullRenderer {
    fn create_surface(&self, _parent: Option<SurfaceId>, _scope: &str) -> SurfaceId {
        SurfaceId(self.next())
    }
    fn remove_surface(&self, _surface: SurfaceId) {}
    fn create_element(&self, _surface: SurfaceId, _spec: &ElementSpec) -> ElementId {
        ElementId(self.next())
    }
    fn update_element(&self, _element: ElementId, _spec: &ElementSpec) {}
    fn remove_element(&self, _element: ElementId) {}
}

/// A surface as recorded by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRecord {
    pub parent: Option<SurfaceId>,
    pub scope: String,
}

/// An element as recorded by [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRecord {
    pub surface: SurfaceId,
    pub spec: ElementSpec,
}

#[derive(Debug, Default)]
struct RecordingState {
    next_id: u64,
    surfaces: BTreeMap<SurfaceId, SurfaceRecord>,
    elements: BTreeMap<ElementId, ElementRecord>,
    created_elements: usize,
}

/// In-memory renderer keeping the live surface/element tree.
///
/// Used for headless replays and for asserting on visual state in tests.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    state: Mutex<RecordingState>,
}

impl RecordingRenderer {
    /// Create an empty recording renderer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live surfaces.
    pub fn surface_count(&self) -> usize {
        self.lock().surfaces.len()
    }

    /// Number of live elements.
    pub fn element_count(&self) -> usize {
        self.lock().elements.len()
    }

    /// Total elements ever created.
    pub fn created_element_count(&self) -> usize {
        self.lock().created_elements
    }

    /// Live surfaces, keyed by id.
    pub fn surfaces(&self) -> BTreeMap<SurfaceId, SurfaceRecord> {
        self.lock().surfaces.clone()
    }

    /// Find a live surface by scope.
    pub fn surface_by_scope(&self, scope: &str) -> Option<SurfaceId> {
        self.lock()
            .surfaces
            .iter()
            .find(|(_, record)| record.scope == scope)
            .map(|(id, _)| *id)
    }

    /// Live elements mounted on a surface, in creation order.
    pub fn elements_in(&self, surface: SurfaceId) -> Vec<ElementSpec> {
        self.lock()
            .elements
            .values()
            .filter(|record| record.surface == surface)
            .map(|record| record.spec.clone())
            .collect()
    }

    /// Live elements on the surface with the given scope.
    pub fn elements_in_scope(&self, scope: &str) -> Vec<ElementSpec> {
        match self.surface_by_scope(scope) {
            Some(surface) => self.elements_in(surface),
            None => Vec::new(),
        }
    }
}

impl Renderer for RecordingRenderer {
    fn create_surface(&self, parent: Option<SurfaceId>, scope: &str) -> SurfaceId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = SurfaceId(state.next_id);
        state.surfaces.insert(
            id,
            SurfaceRecord {
                parent,
                scope: scope.to_string(),
            },
        );
        id
    }

    fn remove_surface(&self, surface: SurfaceId) {
        let mut state = self.lock();
        let mut doomed = vec![surface];
        while let Some(id) = doomed.pop() {
            if state.surfaces.remove(&id).is_none() {
                continue;
            }
            state.elements.retain(|_, record| record.surface != id);
            doomed.extend(
                state
                    .surfaces
                    .iter()
                    .filter(|(_, record)| record.parent == Some(id))
                    .map(|(child, _)| *child),
            );
        }
    }

    fn create_element(&self, surface: SurfaceId, spec: &ElementSpec) -> ElementId {
        let mut state = self.lock();
        state.next_id += 1;
        state.created_elements += 1;
        let id = ElementId(state.next_id);
        state.elements.insert(
            id,
            ElementRecord {
                surface,
                spec: spec.clone(),
            },
        );
        id
    }

    fn update_element(&self, element: ElementId, spec: &ElementSpec) {
        if let Some(record) = self.lock().elements.get_mut(&element) {
            record.spec = spec.clone();
        }
    }

    fn remove_element(&self, element: ElementId) {
        self.lock().elements.remove(&element);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(label: &str) -> ElementSpec {
        ElementSpec::new(ElementKind::VariableBox, label, "1")
    }

    #[test]
    fn test_element_handle_releases_once() {
        let renderer = Arc::new(RecordingRenderer::new());
        let surface = SurfaceHandle::create(renderer.clone(), None, "root");

        let mut element = surface.surface().create_element(&spec("x"));
        assert_eq!(renderer.element_count(), 1);

        element.release();
        element.release();
        assert!(element.is_released());
        assert_eq!(renderer.element_count(), 0);

        element.update(&spec("y"));
        assert_eq!(renderer.element_count(), 0);
    }

    #[test]
    fn test_drop_releases_element() {
        let renderer = Arc::new(RecordingRenderer::new());
        let surface = SurfaceHandle::create(renderer.clone(), None, "root");
        {
            let _element = surface.surface().create_element(&spec("x"));
            assert_eq!(renderer.element_count(), 1);
        }
        assert_eq!(renderer.element_count(), 0);
    }

    #[test]
    fn test_surface_removal_cascades() {
        let renderer = Arc::new(RecordingRenderer::new());
        let mut root = SurfaceHandle::create(renderer.clone(), None, "root");
        let child = SurfaceHandle::create(renderer.clone(), Some(root.id()), "variables");
        let element = child.surface().create_element(&spec("x"));

        assert_eq!(renderer.surface_count(), 2);
        root.release();
        assert_eq!(renderer.surface_count(), 0);
        assert_eq!(renderer.element_count(), 0);

        // Late releases of already-removed handles are no-ops.
        drop(element);
        drop(child);
        root.release();
        assert_eq!(renderer.surface_count(), 0);
    }

    #[test]
    fn test_update_element_content() {
        let renderer = Arc::new(RecordingRenderer::new());
        let surface = SurfaceHandle::create(renderer.clone(), None, "variables");
        let element = surface.surface().create_element(&spec("x"));

        let updated = ElementSpec::new(ElementKind::VariableBox, "x", "7").with_source("Literal");
        element.update(&updated);

        assert_eq!(renderer.elements_in_scope("variables"), vec![updated]);
    }
}
