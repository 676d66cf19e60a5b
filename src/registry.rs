//! Named entries with at most one of them selected.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::error::AudioError;

/// Keyed collection of interchangeable implementations, in registration
/// order, with a single active selection.
///
/// Callers get `Arc` clones, so swapping the selection never affects work
/// already running on the previous entry.
pub struct ProviderRegistry<T: ?Sized> {
    entries: RwLock<Vec<(String, Arc<T>)>>,
    active: RwLock<Option<String>>,
}

impl<T: ?Sized> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            active: RwLock::new(None),
        }
    }
}

impl<T: ?Sized> ProviderRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. The selection is left alone.
    pub fn register(&self, name: impl Into<String>, provider: Arc<T>) {
        let name = name.into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = provider,
            None => entries.push((name.clone(), provider)),
        }
        info!("Registered audio provider '{}'", name);
    }

    /// Select `name`; an unknown name leaves the selection unchanged.
    pub fn set_active(&self, name: &str) -> Result<(), AudioError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if !entries.iter().any(|(existing, _)| existing == name) {
            return Err(AudioError::UnknownProvider(name.to_string()));
        }
        // Entries stay read-locked so `name` cannot vanish in between.
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(name.to_string());
        drop(entries);

        info!("Active audio provider is now '{}'", name);
        Ok(())
    }

    pub fn active_name(&self) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn active(&self) -> Option<Arc<T>> {
        let name = self.active_name()?;
        self.get(&name)
    }

    pub fn require_active(&self) -> Result<Arc<T>, AudioError> {
        self.active().ok_or(AudioError::NoActiveProvider)
    }

    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, provider)| Arc::clone(provider))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_scenario() {
        let registry: ProviderRegistry<str> = ProviderRegistry::new();
        registry.register("local", Arc::from("local device"));
        registry.register("cloud", Arc::from("cloud api"));
        assert!(registry.active().is_none());

        registry.set_active("local").unwrap();
        assert_eq!(registry.active_name().as_deref(), Some("local"));

        let err = registry.set_active("missing").unwrap_err();
        assert!(matches!(err, AudioError::UnknownProvider(ref name) if name == "missing"));
        assert_eq!(registry.active_name().as_deref(), Some("local"));
        assert_eq!(&*registry.active().unwrap(), "local device");
    }

    #[test]
    fn test_register_replaces_in_place() {
        let registry: ProviderRegistry<str> = ProviderRegistry::new();
        registry.register("a", Arc::from("first"));
        registry.register("b", Arc::from("second"));
        registry.set_active("a").unwrap();

        let held = registry.active().unwrap();
        registry.register("a", Arc::from("replacement"));

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.active_name().as_deref(), Some("a"));
        assert_eq!(&*registry.active().unwrap(), "replacement");
        assert_eq!(&*held, "first");
    }

    #[test]
    fn test_no_active_provider() {
        let registry: ProviderRegistry<str> = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.require_active(),
            Err(AudioError::NoActiveProvider)
        ));
    }
}
