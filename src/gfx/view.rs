//! View Registry
//!
//! A *view* is a named submission slot with a numeric priority. Views own no
//! GPU resources; they only establish the execution order of passes within a
//! frame (ascending priority, ties broken by registration order). Views are
//! registered once at stage construction and never destroyed mid-run.
//!
//! Registration is idempotent: asking for an existing name returns the same
//! [`ViewId`] and ignores the supplied priority. Omitting the priority
//! assigns "previous registration's priority + 1", which is how sequential
//! pass groups (e.g. the four shadow cascades) are laid out.

use rustc_hash::FxHashMap;

/// Identifier of a registered view.
///
/// Stable for the lifetime of the registry; does **not** encode priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u16);

struct ViewSlot {
    name: String,
    priority: u16,
}

/// Registry of named, priority-ordered views.
#[derive(Default)]
pub struct ViewRegistry {
    slots: Vec<ViewSlot>,
    by_name: FxHashMap<String, ViewId>,
    last_priority: u16,
}

impl ViewRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up or creates the view with the given name.
    ///
    /// On creation, `priority` fixes the view's execution order; `None`
    /// continues sequentially after the most recent registration. On lookup
    /// the stored priority wins and `priority` is ignored.
    pub fn get_view(&mut self, name: &str, priority: Option<u16>) -> ViewId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }

        let priority = priority.unwrap_or_else(|| self.last_priority.saturating_add(1));
        self.last_priority = priority;

        let id = ViewId(self.slots.len() as u16);
        self.slots.push(ViewSlot {
            name: name.to_owned(),
            priority,
        });
        self.by_name.insert(name.to_owned(), id);
        log::debug!("registered view '{name}' (priority {priority})");
        id
    }

    /// Returns the id of an already-registered view, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ViewId> {
        self.by_name.get(name).copied()
    }

    /// Name of a registered view.
    #[must_use]
    pub fn name(&self, id: ViewId) -> &str {
        &self.slots[id.0 as usize].name
    }

    /// Priority of a registered view.
    #[must_use]
    pub fn priority(&self, id: ViewId) -> u16 {
        self.slots[id.0 as usize].priority
    }

    /// All views in execution order: ascending priority, registration
    /// order for equal priorities.
    #[must_use]
    pub fn ordered(&self) -> Vec<ViewId> {
        let mut ids: Vec<ViewId> = (0..self.slots.len() as u16).map(ViewId).collect();
        ids.sort_by_key(|id| self.slots[id.0 as usize].priority);
        ids
    }

    /// Number of registered views.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no views have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_view_is_idempotent() {
        let mut reg = ViewRegistry::new();
        let a = reg.get_view("DeferredGeometry", Some(1000));
        let b = reg.get_view("DeferredGeometry", Some(9999));
        assert_eq!(a, b);
        assert_eq!(reg.priority(a), 1000);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn omitted_priority_continues_sequentially() {
        let mut reg = ViewRegistry::new();
        let c0 = reg.get_view("Cascade0", Some(500));
        let c1 = reg.get_view("Cascade1", None);
        let c2 = reg.get_view("Cascade2", None);
        assert_eq!(reg.priority(c0), 500);
        assert_eq!(reg.priority(c1), 501);
        assert_eq!(reg.priority(c2), 502);
    }

    #[test]
    fn ordered_sorts_by_priority_then_registration() {
        let mut reg = ViewRegistry::new();
        let late = reg.get_view("Late", Some(5000));
        let early = reg.get_view("Early", Some(100));
        let mid_a = reg.get_view("MidA", Some(1000));
        let mid_b = reg.get_view("MidB", Some(1000));
        assert_eq!(reg.ordered(), vec![early, mid_a, mid_b, late]);
    }
}
