// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.
use crate::ids::GraphId;
use fxhash::FxHashMap;

/// Bidirectional external-id ↔ slot mapping.
///
/// The forward map owns one entry per live binding; the reverse side is a
/// dense vector indexed by slot so lookups during rendering stay
/// allocation-free.
#[derive(Clone, Debug, Default)]
pub struct IdMap {
    forward: FxHashMap<GraphId, u32>,
    reverse: Vec<Option<GraphId>>,
}

impl IdMap {
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn contains(&self, id: &GraphId) -> bool {
        self.forward.contains_key(id)
    }

    pub fn get(&self, id: &GraphId) -> Option<u32> {
        self.forward.get(id).copied()
    }

    pub fn id_of(&self, slot: u32) -> Option<&GraphId> {
        self.reverse.get(slot as usize).and_then(|id| id.as_ref())
    }

    /// Bind `id` to `slot`. Idempotent for an identical binding; returns the
    /// previously bound slot when the id is already present.
    pub fn bind(&mut self, id: GraphId, slot: u32) -> u32 {
        if let Some(&existing) = self.forward.get(&id) {
            return existing;
        }
        let index = slot as usize;
        if index >= self.reverse.len() {
            self.reverse.resize(index + 1, None);
        }
        self.reverse[index] = Some(id.clone());
        self.forward.insert(id, slot);
        slot
    }

    /// Remove the binding for `id`, returning the slot it occupied.
    pub fn unbind(&mut self, id: &GraphId) -> Option<u32> {
        let slot = self.forward.remove(id)?;
        self.reverse[slot as usize] = None;
        Some(slot)
    }

    /// Rebind whatever id occupies `from` onto `to`; used when swap-remove
    /// relocates an edge.
    pub fn move_slot(&mut self, from: u32, to: u32) {
        if from == to {
            return;
        }
        if let Some(id) = self.reverse[from as usize].take() {
            let index = to as usize;
            if index >= self.reverse.len() {
                self.reverse.resize(index + 1, None);
            }
            *self.forward.get_mut(&id).expect("forward entry for live id") = to;
            self.reverse[index] = Some(id);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GraphId, u32)> {
        self.forward.iter().map(|(id, &slot)| (id, slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_both_directions() {
        let mut map = IdMap::default();
        map.bind(GraphId::from("a"), 0);
        map.bind(GraphId::from(7u64), 3);
        for (id, slot) in [(GraphId::from("a"), 0), (GraphId::from(7u64), 3)] {
            assert_eq!(map.get(&id), Some(slot));
            assert_eq!(map.id_of(slot), Some(&id));
            assert_eq!(map.get(map.id_of(slot).unwrap()), Some(slot));
        }
    }

    #[test]
    fn duplicate_bind_returns_existing_slot() {
        let mut map = IdMap::default();
        assert_eq!(map.bind(GraphId::from("a"), 2), 2);
        assert_eq!(map.bind(GraphId::from("a"), 9), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.id_of(9), None);
    }

    #[test]
    fn unbind_clears_both_sides_until_reallocated() {
        let mut map = IdMap::default();
        map.bind(GraphId::from("a"), 1);
        assert_eq!(map.unbind(&GraphId::from("a")), Some(1));
        assert_eq!(map.get(&GraphId::from("a")), None);
        assert_eq!(map.id_of(1), None);
        map.bind(GraphId::from("b"), 1);
        assert_eq!(map.id_of(1), Some(&GraphId::from("b")));
    }

    #[test]
    fn move_slot_follows_swap_remove() {
        let mut map = IdMap::default();
        map.bind(GraphId::from("e0"), 0);
        map.bind(GraphId::from("e1"), 1);
        map.bind(GraphId::from("e2"), 2);
        map.unbind(&GraphId::from("e0"));
        map.move_slot(2, 0);
        assert_eq!(map.get(&GraphId::from("e2")), Some(0));
        assert_eq!(map.id_of(0), Some(&GraphId::from("e2")));
        assert_eq!(map.id_of(2), None);
    }

    #[test]
    fn random_add_remove_streams_stay_consistent() {
        fastrand::seed(0x1DAB);
        let mut map = IdMap::default();
        let mut live: Vec<(GraphId, u32)> = Vec::new();
        let mut next_slot = 0u32;
        for _ in 0..2000 {
            if live.is_empty() || fastrand::bool() {
                let id = GraphId::from(format!("n{}", next_slot));
                map.bind(id.clone(), next_slot);
                live.push((id, next_slot));
                next_slot += 1;
            } else {
                let (id, slot) = live.swap_remove(fastrand::usize(..live.len()));
                assert_eq!(map.unbind(&id), Some(slot));
            }
            for (id, slot) in &live {
                assert_eq!(map.get(id), Some(*slot));
                assert_eq!(map.id_of(*slot), Some(id));
            }
        }
    }
}
