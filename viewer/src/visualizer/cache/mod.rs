//! Render cache: a set of independently configured keyed stores.
//!
//! Stores are addressed through typed [`StoreKey`] handles so a caller can
//! never read a `SurfaceDims` out of the image store. Stores are materialised
//! on first write, from the configuration registered under their name.
//! Entries may depend on entries in other stores; invalidating a key removes
//! everything that transitively depends on it.

pub mod persist;
pub mod store;

pub use persist::{FileStorage, MemoryStorage, PreferenceStorage};
pub use store::{
    CacheEntry, CacheStats, CacheStore, DependencyKey, EvictionPolicy, SetOptions, StoreConfig,
};

use crate::clock::SharedClock;
use crate::error::CacheError;
use crate::visualizer::canvas::surface::DisplayList;
use indexmap::{IndexMap, IndexSet};
use shared::{SurfaceDims, VarFormat, generate_fingerprint};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Typed name of a store.
pub struct StoreKey<V> {
    name: &'static str,
    _value: PhantomData<fn() -> V>,
}

impl<V> StoreKey<V> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<V> Clone for StoreKey<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for StoreKey<V> {}

impl<V> fmt::Debug for StoreKey<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({})", self.name)
    }
}

pub const WAVEFORM_IMAGES: StoreKey<Rc<DisplayList>> = StoreKey::new("rendered-waveform-images");
pub const MEASURED_DIMENSIONS: StoreKey<SurfaceDims> = StoreKey::new("measured-dimensions");
pub const FORMATTED_VALUES: StoreKey<String> = StoreKey::new("formatted-values");
pub const RADIX_PREFERENCES: StoreKey<VarFormat> = StoreKey::new("radix-preferences");

pub fn default_store_configs() -> BTreeMap<String, StoreConfig> {
    BTreeMap::from([
        (
            WAVEFORM_IMAGES.name().to_string(),
            StoreConfig::new(512, EvictionPolicy::Lfu),
        ),
        (
            MEASURED_DIMENSIONS.name().to_string(),
            StoreConfig::new(2048, EvictionPolicy::Lru),
        ),
        (
            FORMATTED_VALUES.name().to_string(),
            StoreConfig::new(4096, EvictionPolicy::Fifo),
        ),
        (
            RADIX_PREFERENCES.name().to_string(),
            StoreConfig::new(0, EvictionPolicy::None).guarded(),
        ),
    ])
}

enum Slot<V> {
    Direct(CacheStore<V>),
    Guarded(String, Rc<RefCell<CacheStore<V>>>),
}

/// Operations the manager performs without knowing a store's value type.
trait ErasedStore {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn invalidate(&mut self, key: &str) -> Result<bool, CacheError>;
    fn dependents_of(&self, dependency: &DependencyKey) -> Result<Vec<String>, CacheError>;
    fn clear(&mut self) -> Result<(), CacheError>;
    fn ensure_writable(&self) -> Result<(), CacheError>;
    fn stats(&self) -> Option<CacheStats>;
    fn len(&self) -> usize;
}

impl<V: 'static> Slot<V> {
    fn with<R>(&mut self, f: impl FnOnce(&mut CacheStore<V>) -> R) -> Result<R, CacheError> {
        match self {
            Slot::Direct(store) => Ok(f(store)),
            Slot::Guarded(name, shared) => {
                let mut store = shared
                    .try_borrow_mut()
                    .map_err(|_| CacheError::StoreBusy { store: name.clone() })?;
                Ok(f(&mut store))
            }
        }
    }

    fn read<R>(&self, f: impl FnOnce(&CacheStore<V>) -> R) -> Option<R> {
        match self {
            Slot::Direct(store) => Some(f(store)),
            Slot::Guarded(_, shared) => shared.try_borrow().ok().map(|store| f(&store)),
        }
    }

    fn name(&self) -> &str {
        match self {
            Slot::Direct(store) => store.name(),
            Slot::Guarded(name, _) => name,
        }
    }
}

impl<V: 'static> ErasedStore for Slot<V> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn invalidate(&mut self, key: &str) -> Result<bool, CacheError> {
        self.with(|store| store.invalidate(key))
    }

    fn dependents_of(&self, dependency: &DependencyKey) -> Result<Vec<String>, CacheError> {
        self.read(|store| store.dependents_of(dependency))
            .ok_or_else(|| CacheError::StoreBusy {
                store: self.name().to_string(),
            })
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.with(CacheStore::clear)
    }

    fn ensure_writable(&self) -> Result<(), CacheError> {
        match self {
            Slot::Guarded(name, shared) if shared.try_borrow_mut().is_err() => {
                Err(CacheError::StoreBusy { store: name.clone() })
            }
            _ => Ok(()),
        }
    }

    fn stats(&self) -> Option<CacheStats> {
        self.read(CacheStore::stats)
    }

    fn len(&self) -> usize {
        self.read(CacheStore::len).unwrap_or(0)
    }
}

pub struct RenderCache {
    configs: BTreeMap<String, StoreConfig>,
    stores: IndexMap<String, Box<dyn ErasedStore>>,
    clock: SharedClock,
}

impl RenderCache {
    pub fn new(configs: BTreeMap<String, StoreConfig>, clock: SharedClock) -> Self {
        Self {
            configs,
            stores: IndexMap::new(),
            clock,
        }
    }

    /// Registers an additional store; an existing store keeps its entries.
    pub fn configure_store(&mut self, name: impl Into<String>, config: StoreConfig) {
        self.configs.insert(name.into(), config);
    }

    pub fn store_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.configs.keys().map(String::as_str)
    }

    /// Identifies the store layout; persisted state from another layout is ignored.
    pub fn fingerprint(&self) -> String {
        generate_fingerprint(&self.configs)
    }

    pub fn get<V: Clone + 'static>(&mut self, store: StoreKey<V>, key: &str) -> Option<V> {
        let slot = match self.slot_mut(store) {
            Ok(Some(slot)) => slot,
            Ok(None) => return None,
            Err(error) => {
                log::warn!("Cache read skipped: {error}");
                return None;
            }
        };
        match slot.with(|s| s.get(key).cloned()) {
            Ok(value) => value,
            Err(error) => {
                log::warn!("Cache read skipped: {error}");
                None
            }
        }
    }

    pub fn get_or<V: Clone + 'static>(&mut self, store: StoreKey<V>, key: &str, default: V) -> V {
        self.get(store, key).unwrap_or(default)
    }

    pub fn has<V: 'static>(&mut self, store: StoreKey<V>, key: &str) -> bool {
        match self.slot_mut(store) {
            Ok(Some(slot)) => slot.with(|s| s.has(key)).unwrap_or(false),
            _ => false,
        }
    }

    pub fn set<V: 'static>(
        &mut self,
        store: StoreKey<V>,
        key: impl Into<String>,
        value: V,
        options: SetOptions,
    ) -> Result<(), CacheError> {
        let slot = self.slot_or_create(store)?;
        slot.with(|s| {
            s.set(key, value, options);
        })
    }

    /// Returns the cached value or computes, stores and returns it.
    pub fn get_or_insert_with<V: Clone + 'static>(
        &mut self,
        store: StoreKey<V>,
        key: &str,
        options: SetOptions,
        compute: impl FnOnce() -> V,
    ) -> Result<V, CacheError> {
        if let Some(value) = self.get(store, key) {
            return Ok(value);
        }
        let value = compute();
        self.set(store, key, value.clone(), options)?;
        Ok(value)
    }

    pub fn delete<V: 'static>(&mut self, store: StoreKey<V>, key: &str) -> Result<bool, CacheError> {
        match self.slot_mut(store)? {
            Some(slot) => slot.with(|s| s.remove(key).is_some()),
            None => Ok(false),
        }
    }

    /// Removes `key` from `store` and, transitively, every entry in any store
    /// that depends on it. Returns how many entries were removed.
    ///
    /// All or nothing: if a store on the cascade is busy, nothing is removed.
    pub fn invalidate(&mut self, store: &str, key: &str) -> Result<usize, CacheError> {
        if !self.configs.contains_key(store) {
            return Err(CacheError::UnknownStore {
                store: store.to_string(),
            });
        }

        let mut queue = VecDeque::from([DependencyKey::new(store, key)]);
        let mut visited = IndexSet::new();
        while let Some(target) = queue.pop_front() {
            if !visited.insert(target.clone()) {
                continue;
            }
            for (name, slot) in &self.stores {
                for dependent in slot.dependents_of(&target)? {
                    queue.push_back(DependencyKey::new(name.clone(), dependent));
                }
            }
        }

        for target in &visited {
            if let Some(slot) = self.stores.get(&target.store) {
                slot.ensure_writable()?;
            }
        }
        let mut removed = 0;
        for target in &visited {
            if let Some(slot) = self.stores.get_mut(&target.store) {
                if slot.invalidate(&target.key)? {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            log::debug!("Invalidated {removed} cache entries from {store}/{key}");
        }
        Ok(removed)
    }

    pub fn clear(&mut self, store: &str) -> Result<(), CacheError> {
        if !self.configs.contains_key(store) {
            return Err(CacheError::UnknownStore {
                store: store.to_string(),
            });
        }
        match self.stores.get_mut(store) {
            Some(slot) => slot.clear(),
            None => Ok(()),
        }
    }

    pub fn clear_all(&mut self) -> Result<(), CacheError> {
        for slot in self.stores.values_mut() {
            slot.clear()?;
        }
        Ok(())
    }

    /// `None` for unknown stores. Stores that were never written report zeroes.
    pub fn stats(&self, store: &str) -> Option<CacheStats> {
        if !self.configs.contains_key(store) {
            return None;
        }
        match self.stores.get(store) {
            Some(slot) => slot.stats(),
            None => Some(CacheStats::default()),
        }
    }

    pub fn len(&self, store: &str) -> usize {
        self.stores.get(store).map_or(0, |slot| slot.len())
    }

    /// Copies every fresh entry of `store`, for persistence.
    pub fn snapshot<V: Clone + 'static>(&mut self, store: StoreKey<V>) -> Vec<(String, V)> {
        match self.slot_mut(store) {
            Ok(Some(slot)) => slot
                .read(|s| {
                    s.fresh_entries()
                        .map(|(key, value)| (key.to_string(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(error) => {
                log::warn!("Cache snapshot skipped: {error}");
                Vec::new()
            }
        }
    }

    /// Shared handle to a guarded store. While a borrow of it is held every
    /// write through the manager fails with [`CacheError::StoreBusy`].
    pub fn shared_handle<V: 'static>(
        &mut self,
        store: StoreKey<V>,
    ) -> Result<Rc<RefCell<CacheStore<V>>>, CacheError> {
        match self.slot_or_create(store)? {
            Slot::Guarded(_, shared) => Ok(shared.clone()),
            Slot::Direct(_) => Err(CacheError::NotGuarded {
                store: store.name().to_string(),
            }),
        }
    }

    fn slot_mut<V: 'static>(&mut self, store: StoreKey<V>) -> Result<Option<&mut Slot<V>>, CacheError> {
        if !self.configs.contains_key(store.name()) {
            return Err(CacheError::UnknownStore {
                store: store.name().to_string(),
            });
        }
        match self.stores.get_mut(store.name()) {
            Some(slot) => slot
                .as_any_mut()
                .downcast_mut::<Slot<V>>()
                .map(Some)
                .ok_or_else(|| CacheError::TypeMismatch {
                    store: store.name().to_string(),
                }),
            None => Ok(None),
        }
    }

    fn slot_or_create<V: 'static>(&mut self, store: StoreKey<V>) -> Result<&mut Slot<V>, CacheError> {
        let name = store.name();
        let config = self
            .configs
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::UnknownStore {
                store: name.to_string(),
            })?;

        if !self.stores.contains_key(name) {
            let inner = CacheStore::<V>::new(name, config.clone(), self.clock.clone());
            let slot = if config.guarded {
                Slot::Guarded(name.to_string(), Rc::new(RefCell::new(inner)))
            } else {
                Slot::Direct(inner)
            };
            self.stores.insert(name.to_string(), Box::new(slot));
        }

        self.stores
            .get_mut(name)
            .and_then(|slot| slot.as_any_mut().downcast_mut::<Slot<V>>())
            .ok_or_else(|| CacheError::TypeMismatch {
                store: name.to_string(),
            })
    }
}

impl fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCache")
            .field("stores", &self.configs.keys().collect::<Vec<_>>())
            .finish()
    }
}
