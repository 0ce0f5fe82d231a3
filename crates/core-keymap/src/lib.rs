//! Hierarchical keymaps with hash-bucket lookup.
//!
//! A keymap is 64 buckets of collision chains keyed by the 32-bit key code;
//! the hash is a MurmurHash-style finalizer masked to 6 bits. Bindings are a
//! tagged variant: a command id, or a child map for prefix keys. The four root
//! maps — global, C-x, Meta, C-h — live in one arena addressed by [`MapId`];
//! lookups that miss follow the parent link (inheritance).
//!
//! The whole set is built before it is shared, and every structural change
//! bumps a release-published generation counter so concurrent readers (the
//! mode line, a future help subsystem) can detect staleness with an acquire
//! load. Bucket chains themselves are only ever touched from the edit loop.

use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use core_events::key::{CONTROL, CTLX, META};
use core_events::{Key, Result, Status};

pub const KEYMAP_HASH_SIZE: usize = 64;
pub const KEYMAP_HASH_MASK: u32 = (KEYMAP_HASH_SIZE as u32) - 1;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
pub mod stats {
    use std::sync::atomic::AtomicU64;

    pub static LOOKUPS: AtomicU64 = AtomicU64::new(0);
    pub static HITS: AtomicU64 = AtomicU64::new(0);
    pub static MISSES: AtomicU64 = AtomicU64::new(0);
    pub static COLLISIONS: AtomicU64 = AtomicU64::new(0);
}

/// Index into the command registry owned by the action layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(pub u16);

/// Index of a keymap within its [`KeymapSet`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Command(CommandId),
    Prefix(MapId),
}

#[derive(Debug, Clone)]
struct Entry {
    key: Key,
    binding: Binding,
}

/// MurmurHash3 finalizer over the key code, masked to the bucket count.
#[inline]
fn hash_key(key: Key) -> usize {
    let mut k = key.0;
    k ^= k >> 16;
    k = k.wrapping_mul(0x85eb_ca6b);
    k ^= k >> 13;
    k = k.wrapping_mul(0xc2b2_ae35);
    k ^= k >> 16;
    (k & KEYMAP_HASH_MASK) as usize
}

pub struct Keymap {
    pub name: String,
    parent: Option<MapId>,
    buckets: Vec<SmallVec<[Entry; 2]>>,
    binding_count: usize,
    generation: AtomicU64,
}

impl Keymap {
    fn new(name: impl Into<String>, parent: Option<MapId>) -> Self {
        Self {
            name: name.into(),
            parent,
            buckets: vec![SmallVec::new(); KEYMAP_HASH_SIZE],
            binding_count: 0,
            generation: AtomicU64::new(0),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn binding_count(&self) -> usize {
        self.binding_count
    }

    fn set(&mut self, key: Key, binding: Binding) {
        let bucket = &mut self.buckets[hash_key(key)];
        if let Some(entry) = bucket.iter_mut().find(|e| e.key == key) {
            entry.binding = binding;
        } else {
            if !bucket.is_empty() {
                stats::COLLISIONS.fetch_add(1, Ordering::Relaxed);
            }
            bucket.push(Entry { key, binding });
            self.binding_count += 1;
        }
        self.generation.fetch_add(1, Ordering::Release);
    }

    fn remove(&mut self, key: Key) -> bool {
        let bucket = &mut self.buckets[hash_key(key)];
        let before = bucket.len();
        bucket.retain(|e| e.key != key);
        let removed = bucket.len() != before;
        if removed {
            self.binding_count -= 1;
            self.generation.fetch_add(1, Ordering::Release);
        }
        removed
    }

    fn get(&self, key: Key) -> Option<Binding> {
        stats::LOOKUPS.fetch_add(1, Ordering::Relaxed);
        let hit = self.buckets[hash_key(key)]
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.binding);
        match hit {
            Some(_) => stats::HITS.fetch_add(1, Ordering::Relaxed),
            None => stats::MISSES.fetch_add(1, Ordering::Relaxed),
        };
        hit
    }

    /// Chains must agree with the binding count; debug builds assert it.
    pub fn validate(&self) -> bool {
        let counted: usize = self.buckets.iter().map(|b| b.len()).sum();
        debug_assert_eq!(counted, self.binding_count);
        counted == self.binding_count
    }
}

/// One row of the legacy binding table: a command name, its historical key
/// code (with CTLX/META routing bits), and the command it resolves to.
#[derive(Debug, Clone, Copy)]
pub struct LegacyBinding {
    pub name: &'static str,
    pub code: u32,
    pub command: CommandId,
}

pub struct KeymapSet {
    maps: Vec<Keymap>,
    global: MapId,
    ctlx: MapId,
    meta: MapId,
    help: MapId,
    generation: AtomicU64,
}

impl Default for KeymapSet {
    fn default() -> Self {
        Self::new()
    }
}

impl KeymapSet {
    /// Build the four root maps and wire the prefix bindings that route
    /// C-x, C-h, and ESC into their child maps. The prefix maps inherit from
    /// global so chords like C-x C-g still resolve the global abort binding.
    pub fn new() -> Self {
        let maps = vec![
            Keymap::new("global", None),
            Keymap::new("C-x", Some(MapId(0))),
            Keymap::new("Meta", Some(MapId(0))),
            Keymap::new("C-h", Some(MapId(0))),
        ];
        let mut set = Self {
            maps,
            global: MapId(0),
            ctlx: MapId(1),
            meta: MapId(2),
            help: MapId(3),
            generation: AtomicU64::new(0),
        };
        set.install_prefixes();
        set
    }

    fn install_prefixes(&mut self) {
        let (ctlx, help, meta) = (self.ctlx, self.help, self.meta);
        let global = &mut self.maps[self.global.0 as usize];
        global.set(Key::control('X'), Binding::Prefix(ctlx));
        global.set(Key::control('H'), Binding::Prefix(help));
        global.set(Key::ESC, Binding::Prefix(meta));
    }

    pub fn global(&self) -> MapId {
        self.global
    }

    pub fn ctlx(&self) -> MapId {
        self.ctlx
    }

    pub fn meta(&self) -> MapId {
        self.meta
    }

    pub fn help(&self) -> MapId {
        self.help
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn map(&self, id: MapId) -> Result<&Keymap> {
        self.maps.get(id.0 as usize).ok_or(Status::InvalidArgument)
    }

    /// Create a fresh child map inheriting from `parent`.
    pub fn create_map(&mut self, name: &str, parent: Option<MapId>) -> MapId {
        let id = MapId(self.maps.len() as u32);
        self.maps.push(Keymap::new(name, parent));
        self.generation.fetch_add(1, Ordering::Release);
        id
    }

    pub fn bind(&mut self, map: MapId, key: Key, command: CommandId) -> Result<()> {
        let map = self
            .maps
            .get_mut(map.0 as usize)
            .ok_or(Status::InvalidArgument)?;
        map.set(key, Binding::Command(command));
        self.generation.fetch_add(1, Ordering::Release);
        trace!(target: "keymap", map = %map.name, key = %key, cmd = command.0, "bind");
        Ok(())
    }

    pub fn bind_prefix(&mut self, map: MapId, key: Key, child: MapId) -> Result<()> {
        if child.0 as usize >= self.maps.len() {
            return Err(Status::InvalidArgument);
        }
        let map = self
            .maps
            .get_mut(map.0 as usize)
            .ok_or(Status::InvalidArgument)?;
        map.set(key, Binding::Prefix(child));
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn unbind(&mut self, map: MapId, key: Key) -> Result<()> {
        let map = self
            .maps
            .get_mut(map.0 as usize)
            .ok_or(Status::InvalidArgument)?;
        if map.remove(key) {
            self.generation.fetch_add(1, Ordering::Release);
            Ok(())
        } else {
            Err(Status::NotFound)
        }
    }

    /// Exact-map lookup, no inheritance.
    pub fn lookup(&self, map: MapId, key: Key) -> Option<Binding> {
        self.maps.get(map.0 as usize)?.get(key)
    }

    /// Lookup following the parent chain on miss.
    pub fn lookup_chain(&self, map: MapId, key: Key) -> Option<Binding> {
        let mut cursor = Some(map);
        while let Some(id) = cursor {
            let map = self.maps.get(id.0 as usize)?;
            if let Some(binding) = map.get(key) {
                return Some(binding);
            }
            cursor = map.parent;
        }
        None
    }

    /// Import a legacy binding table, routing each entry into the root map
    /// selected by its modifier bits: CTLX-flagged codes into the C-x map
    /// (bit stripped), Control-H combinations into the help map, META-flagged
    /// codes into the Meta map (bit stripped), everything else global.
    pub fn install_legacy(&mut self, table: &[LegacyBinding]) {
        for row in table {
            let code = row.code;
            let (map, key) = if code & CTLX != 0 {
                (self.ctlx, Key(code & !CTLX))
            } else if code & CONTROL != 0 && (code & 0xFF) == ('H' as u32 - '@' as u32) {
                (self.help, Key(code))
            } else if code & META != 0 {
                (self.meta, Key(code & !META))
            } else {
                (self.global, Key(code))
            };
            // Bind cannot fail for root map ids.
            let _ = self.bind(map, key, row.command);
        }
        // Route the prefix keys themselves (idempotent re-install).
        self.install_prefixes();
        debug!(
            target: "keymap",
            bindings = table.len(),
            generation = self.generation(),
            "legacy_import"
        );
    }

    pub fn validate(&self) -> bool {
        self.maps.iter().all(Keymap::validate)
    }
}
