//! Runtime-tunable config variables.
//!
//! The registry is an explicit context object owned by the application,
//! not a process-wide singleton. Values live in typed arrays; a lookup
//! table maps a hash of the registered name to the typed slot. Callers
//! that touch a variable every frame hold the [`ConfigHandle`] returned
//! at registration and skip the name lookup entirely.

use std::marker::PhantomData;
use crate::collections::hashmap::HashMap;
use crate::collections::hash_value;

/// Edit semantics for a config variable, surfaced by debug UIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfigFlags(u32);

impl ConfigFlags {
    pub const NONE: ConfigFlags = ConfigFlags(0);
    pub const NO_EDIT: ConfigFlags = ConfigFlags(1 << 1);
    pub const EDIT_READ_ONLY: ConfigFlags = ConfigFlags(1 << 2);
    pub const ADVANCED: ConfigFlags = ConfigFlags(1 << 3);
    pub const EDIT_CHECKBOX: ConfigFlags = ConfigFlags(1 << 8);
    pub const EDIT_FLOAT_DRAG: ConfigFlags = ConfigFlags(1 << 9);

    pub fn contains(self, other: ConfigFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ConfigFlags {
    type Output = ConfigFlags;
    fn bitor(self, rhs: Self) -> Self {
        ConfigFlags(self.0 | rhs.0)
    }
}

/// Typed accessor for a registered variable. Copyable, cheap, and only
/// valid with the registry that produced it.
pub struct ConfigHandle<T> {
    index: u32,
    _marker: PhantomData<T>,
}

impl<T> Clone for ConfigHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConfigHandle<T> {}

struct ConfigValue<T> {
    name: String,
    description: String,
    flags: ConfigFlags,
    default: T,
    current: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Int,
    Float,
    Str,
}

#[derive(Clone, Copy)]
struct Slot {
    kind: SlotKind,
    index: u32,
}

/// Registry of named, typed config variables.
#[derive(Default)]
pub struct ConfigRegistry {
    ints: Vec<ConfigValue<i32>>,
    floats: Vec<ConfigValue<f64>>,
    strings: Vec<ConfigValue<String>>,
    lookup: HashMap<u64, Slot>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_int(
        &mut self,
        name: &str,
        description: &str,
        default: i32,
        flags: ConfigFlags,
    ) -> ConfigHandle<i32> {
        let hash = hash_value(&name);
        if let Some(slot) = self.lookup.get(&hash) {
            assert_eq!(slot.kind, SlotKind::Int, "config variable '{name}' re-registered with a different type");
            return ConfigHandle { index: slot.index, _marker: PhantomData };
        }

        let index = self.ints.len() as u32;
        self.ints.push(ConfigValue {
            name: name.to_owned(),
            description: description.to_owned(),
            flags,
            default,
            current: default,
        });
        self.lookup.insert(hash, Slot { kind: SlotKind::Int, index });
        ConfigHandle { index, _marker: PhantomData }
    }

    pub fn register_float(
        &mut self,
        name: &str,
        description: &str,
        default: f64,
        flags: ConfigFlags,
    ) -> ConfigHandle<f64> {
        let hash = hash_value(&name);
        if let Some(slot) = self.lookup.get(&hash) {
            assert_eq!(slot.kind, SlotKind::Float, "config variable '{name}' re-registered with a different type");
            return ConfigHandle { index: slot.index, _marker: PhantomData };
        }

        let index = self.floats.len() as u32;
        self.floats.push(ConfigValue {
            name: name.to_owned(),
            description: description.to_owned(),
            flags,
            default,
            current: default,
        });
        self.lookup.insert(hash, Slot { kind: SlotKind::Float, index });
        ConfigHandle { index, _marker: PhantomData }
    }

    pub fn register_string(
        &mut self,
        name: &str,
        description: &str,
        default: &str,
        flags: ConfigFlags,
    ) -> ConfigHandle<String> {
        let hash = hash_value(&name);
        if let Some(slot) = self.lookup.get(&hash) {
            assert_eq!(slot.kind, SlotKind::Str, "config variable '{name}' re-registered with a different type");
            return ConfigHandle { index: slot.index, _marker: PhantomData };
        }

        let index = self.strings.len() as u32;
        self.strings.push(ConfigValue {
            name: name.to_owned(),
            description: description.to_owned(),
            flags,
            default: default.to_owned(),
            current: default.to_owned(),
        });
        self.lookup.insert(hash, Slot { kind: SlotKind::Str, index });
        ConfigHandle { index, _marker: PhantomData }
    }

    #[inline]
    pub fn get_int(&self, handle: ConfigHandle<i32>) -> i32 {
        self.ints[handle.index as usize].current
    }

    #[inline]
    pub fn set_int(&mut self, handle: ConfigHandle<i32>, value: i32) {
        self.ints[handle.index as usize].current = value;
    }

    #[inline]
    pub fn get_float(&self, handle: ConfigHandle<f64>) -> f64 {
        self.floats[handle.index as usize].current
    }

    #[inline]
    pub fn set_float(&mut self, handle: ConfigHandle<f64>, value: f64) {
        self.floats[handle.index as usize].current = value;
    }

    #[inline]
    pub fn get_string(&self, handle: ConfigHandle<String>) -> &str {
        &self.strings[handle.index as usize].current
    }

    #[inline]
    pub fn set_string(&mut self, handle: ConfigHandle<String>, value: impl Into<String>) {
        self.strings[handle.index as usize].current = value.into();
    }

    /// Look up an int variable by name. Slow path; prefer the handle.
    pub fn find_int(&self, name: &str) -> Option<i32> {
        match self.lookup.get(&hash_value(&name)) {
            Some(slot) if slot.kind == SlotKind::Int => Some(self.ints[slot.index as usize].current),
            _ => None,
        }
    }

    pub fn find_float(&self, name: &str) -> Option<f64> {
        match self.lookup.get(&hash_value(&name)) {
            Some(slot) if slot.kind == SlotKind::Float => Some(self.floats[slot.index as usize].current),
            _ => None,
        }
    }

    pub fn find_string(&self, name: &str) -> Option<&str> {
        match self.lookup.get(&hash_value(&name)) {
            Some(slot) if slot.kind == SlotKind::Str => {
                Some(self.strings[slot.index as usize].current.as_str())
            }
            _ => None,
        }
    }

    pub fn set_int_by_name(&mut self, name: &str, value: i32) -> bool {
        match self.lookup.get(&hash_value(&name)) {
            Some(slot) if slot.kind == SlotKind::Int => {
                let index = slot.index as usize;
                self.ints[index].current = value;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self, name: &str) -> bool {
        let Some(slot) = self.lookup.get(&hash_value(&name)).copied() else {
            return false;
        };
        match slot.kind {
            SlotKind::Int => {
                let v = &mut self.ints[slot.index as usize];
                v.current = v.default;
            }
            SlotKind::Float => {
                let v = &mut self.floats[slot.index as usize];
                v.current = v.default;
            }
            SlotKind::Str => {
                let v = &mut self.strings[slot.index as usize];
                v.current = v.default.clone();
            }
        }
        true
    }

    /// Visit every registered variable, e.g. to build a debug editor.
    pub fn for_each_description(&self, mut visit: impl FnMut(&str, &str, ConfigFlags)) {
        for v in &self.ints {
            visit(&v.name, &v.description, v.flags);
        }
        for v in &self.floats {
            visit(&v.name, &v.description, v.flags);
        }
        for v in &self.strings {
            visit(&v.name, &v.description, v.flags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_access_skips_name_lookup() {
        let mut registry = ConfigRegistry::new();
        let shadows = registry.register_int("render.shadow_resolution", "shadow map size", 2048, ConfigFlags::NONE);

        assert_eq!(registry.get_int(shadows), 2048);
        registry.set_int(shadows, 4096);
        assert_eq!(registry.get_int(shadows), 4096);
        assert_eq!(registry.find_int("render.shadow_resolution"), Some(4096));
    }

    #[test]
    fn duplicate_registration_returns_same_slot() {
        let mut registry = ConfigRegistry::new();
        let a = registry.register_float("camera.fov", "vertical fov", 70.0, ConfigFlags::EDIT_FLOAT_DRAG);
        let b = registry.register_float("camera.fov", "vertical fov", 90.0, ConfigFlags::NONE);

        registry.set_float(a, 55.0);
        assert_eq!(registry.get_float(b), 55.0);
    }

    #[test]
    fn lookup_respects_type() {
        let mut registry = ConfigRegistry::new();
        registry.register_string("app.name", "window title", "cinder", ConfigFlags::NO_EDIT);

        assert_eq!(registry.find_int("app.name"), None);
        assert_eq!(registry.find_string("app.name"), Some("cinder"));
        assert!(!registry.set_int_by_name("app.name", 1));
    }

    #[test]
    fn reset_restores_default() {
        let mut registry = ConfigRegistry::new();
        let h = registry.register_int("gpu.vsync", "enable vsync", 1, ConfigFlags::EDIT_CHECKBOX);
        registry.set_int(h, 0);
        assert!(registry.reset("gpu.vsync"));
        assert_eq!(registry.get_int(h), 1);
    }
}
