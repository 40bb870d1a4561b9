//! Consumable Spawning and Collection
//!
//! Placement is a uniformly random cell inside the arena. Overlap with
//! agents or other consumables is not checked.

use crate::core::cell::Cell;
use crate::core::rng::DeterministicRng;
use crate::game::collision::position_at;
use crate::game::state::{Arena, Consumable, ConsumableKind};

/// Pick a random cell and tag.
pub fn random_consumable(rng: &mut DeterministicRng, arena: &Arena) -> Consumable {
    let cell = rng.random_cell(arena.columns, arena.rows);
    let kind = ConsumableKind::from_index(rng.next_int(ConsumableKind::COUNT))
        .unwrap_or(ConsumableKind::Apple);
    Consumable { cell, kind }
}

/// Top the field up by at most one consumable.
///
/// Returns the consumable that was added, if any.
pub fn replenish(
    consumables: &mut Vec<Consumable>,
    rng: &mut DeterministicRng,
    arena: &Arena,
    minimum: usize,
) -> Option<Consumable> {
    if consumables.len() >= minimum {
        return None;
    }

    let consumable = random_consumable(rng, arena);
    consumables.push(consumable);
    Some(consumable)
}

/// Remove and return the consumable on `cell`, if there is one.
pub fn take_at(consumables: &mut Vec<Consumable>, cell: Cell) -> Option<Consumable> {
    position_at(consumables, cell, |c| c.cell).map(|idx| consumables.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replenish_adds_one_at_a_time() {
        let arena = Arena::default();
        let mut rng = DeterministicRng::new(1);
        let mut consumables = Vec::new();

        assert!(replenish(&mut consumables, &mut rng, &arena, 3).is_some());
        assert_eq!(consumables.len(), 1);
        assert!(replenish(&mut consumables, &mut rng, &arena, 3).is_some());
        assert!(replenish(&mut consumables, &mut rng, &arena, 3).is_some());
        assert_eq!(consumables.len(), 3);

        assert!(replenish(&mut consumables, &mut rng, &arena, 3).is_none());
        assert_eq!(consumables.len(), 3);
    }

    #[test]
    fn test_random_consumable_in_bounds() {
        let arena = Arena::from_units(100, 60, 20);
        let mut rng = DeterministicRng::new(99);

        for _ in 0..500 {
            let c = random_consumable(&mut rng, &arena);
            assert!(arena.contains(c.cell));
        }
    }

    #[test]
    fn test_take_at() {
        let mut consumables = vec![
            Consumable { cell: Cell::new(1, 1), kind: ConsumableKind::Apple },
            Consumable { cell: Cell::new(2, 2), kind: ConsumableKind::Star },
        ];

        let taken = take_at(&mut consumables, Cell::new(2, 2));
        assert_eq!(taken.map(|c| c.kind), Some(ConsumableKind::Star));
        assert_eq!(consumables.len(), 1);

        assert!(take_at(&mut consumables, Cell::new(9, 9)).is_none());
        assert_eq!(consumables.len(), 1);
    }

    #[test]
    fn test_seeded_placement_is_reproducible() {
        let arena = Arena::default();
        let mut rng1 = DeterministicRng::new(2024);
        let mut rng2 = DeterministicRng::new(2024);

        for _ in 0..50 {
            assert_eq!(
                random_consumable(&mut rng1, &arena),
                random_consumable(&mut rng2, &arena)
            );
        }
    }
}
