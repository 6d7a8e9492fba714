//! Insertion-ordered (name, value) container with a checksum pre-filter
//!
//! Maps back request headers and per-call attributes. Lookup is a linear scan
//! that compares a 4-byte case-folded prefix checksum before falling back to a
//! full string compare. This is a deliberate fast-path/slow-path split rather
//! than a hash table: connector maps hold a handful of entries, and the
//! checksum rejects almost every non-match with one integer comparison.

use crate::error::{Result, TallyError};
use crate::pool::Arena;

/// Capacity growth increment for map entry storage
pub const MAP_CAPACITY_INCREMENT: usize = 50;

/// Compute the 4-byte case-folded prefix checksum of a name.
///
/// Up to the first four bytes, ASCII-lowercased, packed big-endian. Equal
/// checksums are necessary but not sufficient for name equality.
pub fn checksum(name: &str) -> u32 {
    name.bytes()
        .take(4)
        .fold(0u32, |acc, b| (acc << 8) | u32::from(b.to_ascii_lowercase()))
}

/// An entry name, with its ownership contract made explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Name<'p> {
    /// Duplicated into arena-owned storage by [`Map::put`]
    Owned(&'p str),
    /// Caller-supplied and stored verbatim by [`Map::add`]
    Borrowed(&'p str),
}

impl<'p> Name<'p> {
    /// The name string regardless of ownership
    pub fn as_str(&self) -> &'p str {
        match self {
            Name::Owned(s) | Name::Borrowed(s) => s,
        }
    }
}

struct Entry<'p, V> {
    name: Name<'p>,
    checksum: u32,
    value: V,
}

/// Insertion-ordered associative container backed by an [`Arena`]
///
/// Name, checksum and value for each entry live together in one entry vector,
/// so growth is all-or-nothing by construction; capacity still grows in
/// [`MAP_CAPACITY_INCREMENT`] steps and a failed growth leaves the map
/// untouched.
///
/// Not thread-safe; a map belongs to the unit of work that owns its pool.
pub struct Map<'p, V> {
    arena: &'p dyn Arena,
    entries: Vec<Entry<'p, V>>,
}

impl<'p, V> Map<'p, V> {
    /// Create an empty map drawing name storage from `arena`
    pub fn new(arena: &'p dyn Arena) -> Self {
        Self {
            arena,
            entries: Vec::new(),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the map holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Grow entry storage by one increment when full; failure leaves the map
    /// in its prior state.
    fn ensure_room(&mut self) -> Result<()> {
        if self.entries.len() == self.entries.capacity() {
            self.entries.try_reserve_exact(MAP_CAPACITY_INCREMENT)?;
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        let sum = checksum(name);
        self.entries
            .iter()
            .position(|e| e.checksum == sum && e.name.as_str() == name)
    }

    /// Look up a value by name. Misses (including the empty name, which can
    /// never be inserted) return `None`.
    pub fn get(&self, name: &str) -> Option<&V> {
        self.index_of(name).map(|i| &self.entries[i].value)
    }

    /// Mutable variant of [`Map::get`]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.index_of(name).map(|i| &mut self.entries[i].value)
    }

    /// Upsert: replace the value of an existing entry and return the previous
    /// value, or duplicate `name` into arena-owned storage and append.
    pub fn put(&mut self, name: &str, value: V) -> Result<Option<V>> {
        if name.is_empty() {
            return Err(TallyError::invalid_parameter(
                "name",
                "Map entry name must not be empty",
            ));
        }

        if let Some(i) = self.index_of(name) {
            let old = std::mem::replace(&mut self.entries[i].value, value);
            return Ok(Some(old));
        }

        self.ensure_room()?;
        let arena = self.arena;
        let owned = arena.dup_str(name)?;
        self.entries.push(Entry {
            name: Name::Owned(owned),
            checksum: checksum(owned),
            value,
        });
        Ok(None)
    }

    /// Unconditional append storing the caller's `name` reference verbatim.
    ///
    /// The fast path for call sites that already guarantee uniqueness; no
    /// duplicate check is performed, and a duplicate name shadows the earlier
    /// entry for lookup. Contrast with [`Map::put`], the safe owning variant.
    pub fn add(&mut self, name: &'p str, value: V) -> Result<()> {
        if name.is_empty() {
            return Err(TallyError::invalid_parameter(
                "name",
                "Map entry name must not be empty",
            ));
        }

        self.ensure_room()?;
        self.entries.push(Entry {
            name: Name::Borrowed(name),
            checksum: checksum(name),
            value,
        });
        Ok(())
    }

    /// Name at insertion index `i`, or `None` out of range
    pub fn name_at(&self, i: usize) -> Option<&'p str> {
        self.entries.get(i).map(|e| e.name.as_str())
    }

    /// Value at insertion index `i`, or `None` out of range
    pub fn value_at(&self, i: usize) -> Option<&V> {
        self.entries.get(i).map(|e| &e.value)
    }

    /// Ownership marker of the entry at index `i`
    pub fn entry_name(&self, i: usize) -> Option<Name<'p>> {
        self.entries.get(i).map(|e| e.name)
    }

    /// Remove all entries; allocated storage is retained for reuse
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate entries in insertion order
    pub fn iter<'s>(&'s self) -> impl Iterator<Item = (&'p str, &'s V)> + 's {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    /// Sort entries by descending name length.
    ///
    /// Used by callers that need deterministic longest-key-first ordering for
    /// concatenation and prefix-elimination.
    pub fn sort_by_len_desc(&mut self) {
        self.entries
            .sort_unstable_by(|a, b| b.name.as_str().len().cmp(&a.name.as_str().len()));
    }
}

impl<'p, V: Clone> Map<'p, V> {
    /// Merge `src` into `self`, skipping any name already present
    /// (first-writer-wins across merges). Copied names are duplicated into
    /// this map's arena.
    pub fn append(&mut self, src: &Map<'p, V>) -> Result<()> {
        for (name, value) in src.iter() {
            if self.index_of(name).is_some() {
                continue;
            }
            self.ensure_room()?;
            let arena = self.arena;
            let owned = arena.dup_str(name)?;
            self.entries.push(Entry {
                name: Name::Owned(owned),
                checksum: checksum(owned),
                value: value.clone(),
            });
        }
        Ok(())
    }
}

impl<'p, V> std::fmt::Debug for Map<'p, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map").field("len", &self.len()).finish()
    }
}
