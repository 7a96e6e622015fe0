//! # Shared Identifiers
//!
//! Ids, positions and item kinds passed between the core, the storage
//! layer and the host adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Item quantities keyed by kind.
///
/// Ordered so that serialized payloads and clamping are deterministic.
pub type ItemMap = BTreeMap<ItemKind, u64>;

/// Player identity as handed over by the host (UUID bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u128);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Kind of an item stored by a spawner (`"bone"`, `"arrow"`, ...).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKind(String);

impl ItemKind {
    /// Creates an item kind, normalizing case and the `minecraft:` namespace.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref().trim().to_ascii_lowercase();
        let name = name.strip_prefix("minecraft:").unwrap_or(&name);
        Self(name.to_string())
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Creature tag selecting a loot table (`"zombie"`, `"skeleton"`, ...).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CreatureType(String);

impl CreatureType {
    /// Creates a creature tag, normalized like [`ItemKind::new`].
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref().trim().to_ascii_lowercase();
        let name = name.strip_prefix("minecraft:").unwrap_or(&name);
        Self(name.to_string())
    }

    /// Returns the normalized tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CreatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CreatureType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// World-relative block coordinate.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// World name.
    pub world: String,
    /// Block X.
    pub x: i32,
    /// Block Y.
    pub y: i32,
    /// Block Z.
    pub z: i32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Chebyshev distance in blocks, `None` across worlds.
    #[must_use]
    pub fn distance(&self, other: &Self) -> Option<u32> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        Some(dx.max(dy).max(dz))
    }

    /// Same cell or one of the 26 neighbours.
    #[must_use]
    pub fn is_adjacent(&self, other: &Self) -> bool {
        matches!(self.distance(other), Some(d) if d <= 1)
    }

    /// All positions within `radius` blocks, nearest first.
    ///
    /// Cells past the edge of the coordinate range are skipped.
    #[must_use]
    pub fn neighbours(&self, radius: i32) -> Vec<Self> {
        let mut out = Vec::new();
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                for dz in -radius..=radius {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let (Some(x), Some(y), Some(z)) = (
                        self.x.checked_add(dx),
                        self.y.checked_add(dy),
                        self.z.checked_add(dz),
                    ) else {
                        continue;
                    };
                    let steps = dx.unsigned_abs() + dy.unsigned_abs() + dz.unsigned_abs();
                    out.push((steps, Self::new(self.world.clone(), x, y, z)));
                }
            }
        }
        out.sort_by_key(|(steps, _)| *steps);
        out.into_iter().map(|(_, p)| p).collect()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {}, {})", self.world, self.x, self.y, self.z)
    }
}

/// Stable spawner identity, derived from the anchor block position.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpawnerId(String);

impl SpawnerId {
    /// Derives the id of the spawner anchored at `position`.
    #[must_use]
    pub fn at(position: &Position) -> Self {
        Self(format!(
            "{}_{}_{}_{}",
            position.world, position.x, position.y, position.z
        ))
    }

    /// Wraps a raw id read back from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpawnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Items and experience handed to the rendering layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldSnapshot {
    /// Item quantities.
    pub items: ItemMap,
    /// Experience points.
    pub experience: u64,
}

impl YieldSnapshot {
    /// Returns true when there is neither an item nor experience.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experience == 0 && self.items.values().all(|q| *q == 0)
    }

    /// Sum of all item quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        total_quantity(&self.items)
    }
}

/// Sum of quantities in an item map.
#[must_use]
pub fn total_quantity(items: &ItemMap) -> u64 {
    items.values().fold(0u64, |acc, q| acc.saturating_add(*q))
}

/// Adds `quantity` of `item`, ignoring zero quantities.
pub fn add_item(items: &mut ItemMap, item: &ItemKind, quantity: u64) {
    if quantity == 0 {
        return;
    }
    let slot = items.entry(item.clone()).or_insert(0);
    *slot = slot.saturating_add(quantity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_kind_normalizes_namespace() {
        assert_eq!(ItemKind::new("minecraft:BONE"), ItemKind::new("bone"));
        assert_eq!(CreatureType::new(" Zombie "), CreatureType::from("zombie"));
    }

    #[test]
    fn test_adjacency() {
        let a = Position::new("world", 0, 64, 0);
        assert!(a.is_adjacent(&Position::new("world", 1, 65, -1)));
        assert!(!a.is_adjacent(&Position::new("world", 2, 64, 0)));
        assert!(!a.is_adjacent(&Position::new("nether", 0, 64, 0)));
    }

    #[test]
    fn test_neighbours_nearest_first() {
        let a = Position::new("world", 0, 0, 0);
        let n = a.neighbours(1);
        assert_eq!(n.len(), 26);
        assert_eq!(a.distance(&n[0]), Some(1));
        let first = &n[0];
        assert_eq!((first.x.abs() + first.y.abs() + first.z.abs()), 1);
    }

    #[test]
    fn test_neighbours_at_coordinate_edge() {
        let corner = Position::new("world", i32::MAX, i32::MAX, i32::MIN);
        let n = corner.neighbours(1);
        assert_eq!(n.len(), 7);
        assert!(n.iter().all(|p| corner.is_adjacent(p)));
    }

    #[test]
    fn test_id_derived_from_position() {
        let id = SpawnerId::at(&Position::new("world", -3, 70, 12));
        assert_eq!(id.as_str(), "world_-3_70_12");
    }
}
