//! Named collections with stable typed ids

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;

use crate::resources::TextureId;

/// A typed index into one [`Registry`]
pub trait RegistryId: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    fn from_raw(raw: u32) -> Self;
    fn raw(&self) -> u32;
}

macro_rules! registry_ids {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u32);

            impl RegistryId for $name {
                fn from_raw(raw: u32) -> Self {
                    Self(raw)
                }

                fn raw(&self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

registry_ids!(
    /// Id of a program in the scene
    ShaderId,
    /// Id of a material in the scene
    MaterialId,
    /// Id of a light in the scene
    LightId,
    /// Id of a drawable in the scene
    ObjectId,
);

impl RegistryId for TextureId {
    fn from_raw(raw: u32) -> Self {
        TextureId(raw)
    }

    fn raw(&self) -> u32 {
        self.0
    }
}

/// Entries keyed by unique name, iterated in insertion order.
///
/// Inserting under an existing name keeps that name's id and hands back the
/// previous value so the caller can release it.
#[derive(Debug)]
pub struct Registry<I, T> {
    next: u32,
    names: HashMap<String, u32>,
    entries: BTreeMap<u32, (String, T)>,
    _id: PhantomData<I>,
}

impl<I: RegistryId, T> Registry<I, T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            names: HashMap::new(),
            entries: BTreeMap::new(),
            _id: PhantomData,
        }
    }

    /// Insert or replace by name. Returns the id and any replaced value.
    pub fn insert(&mut self, name: &str, value: T) -> (I, Option<T>) {
        if let Some(&raw) = self.names.get(name) {
            let previous = self
                .entries
                .insert(raw, (name.to_string(), value))
                .map(|(_, old)| old);
            return (I::from_raw(raw), previous);
        }
        let raw = self.next;
        self.next += 1;
        self.names.insert(name.to_string(), raw);
        self.entries.insert(raw, (name.to_string(), value));
        (I::from_raw(raw), None)
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.entries.get(&id.raw()).map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.entries.get_mut(&id.raw()).map(|(_, value)| value)
    }

    pub fn id(&self, name: &str) -> Option<I> {
        self.names.get(name).map(|&raw| I::from_raw(raw))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn name(&self, id: I) -> Option<&str> {
        self.entries.get(&id.raw()).map(|(name, _)| name.as_str())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        let (name, value) = self.entries.remove(&id.raw())?;
        self.names.remove(&name);
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &str, &T)> {
        self.entries
            .iter()
            .map(|(&raw, (name, value))| (I::from_raw(raw), name.as_str(), value))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, in insertion order
    pub fn drain(&mut self) -> Vec<T> {
        self.names.clear();
        std::mem::take(&mut self.entries)
            .into_values()
            .map(|(_, value)| value)
            .collect()
    }
}

impl<I: RegistryId, T> Default for Registry<I, T> {
    fn default() -> Self {
        Self::new()
    }
}
