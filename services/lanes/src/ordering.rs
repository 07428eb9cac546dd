//! Position allocation for ordered sibling sets.
//!
//! Events within a lane and images within an event are ordered by an integer
//! `position` that must stay unique among live siblings. This module holds
//! the pure planning side of that contract:
//!
//! - **Append**: the next position for a new sibling
//! - **Promotion**: the full renumbering that makes one image the primary
//!   (position 0) while keeping every other sibling's relative order
//! - **Explicit reorder**: validation of caller-supplied position batches
//!
//! Plans computed here are applied by the store inside a single database
//! transaction, so a half-applied renumbering is never visible.

use thiserror::Error;
use uuid::Uuid;

/// Position reserved for an event's primary image.
pub const PRIMARY_POSITION: i32 = 0;

/// A sibling's current position, as read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingPosition {
    pub id: Uuid,
    pub position: i32,
}

/// A single position write to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub id: Uuid,
    pub position: i32,
}

/// Errors produced when validating an explicit reorder batch
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReorderError {
    #[error("assignment references a sibling not in this set: {0}")]
    UnknownSibling(Uuid),

    #[error("sibling {0} appears more than once in the batch")]
    DuplicateSibling(Uuid),

    #[error("negative position {position} assigned to sibling {id}")]
    NegativePosition { id: Uuid, position: i32 },

    #[error("position {0} assigned to more than one sibling")]
    DuplicatePosition(i32),

    #[error("position {0} collides with a sibling not mentioned in the batch")]
    PositionCollision(i32),
}

/// Position for a sibling appended to the set.
///
/// Returns one past the current maximum, or `floor` when the set is empty.
/// Events start at 1; images start at [`PRIMARY_POSITION`] so the first
/// image of an event becomes its primary.
pub fn next_position(existing: &[i32], floor: i32) -> i32 {
    existing.iter().copied().max().map_or(floor, |max| max + 1)
}

/// Plan the renumbering that promotes `target` to the primary position.
///
/// The target gets position 0. Every other sibling is assigned 1, 2, 3… in
/// ascending order of its current position (stable on ties), which preserves
/// the displayed order and repairs any gaps or duplicate positions the set
/// may have accumulated. Siblings already at their assigned position are
/// omitted from the plan.
///
/// The target does not have to be present in `siblings`, so the same plan
/// covers promote-on-insert, where the new row is written at position 0
/// directly.
pub fn plan_promotion(target: Uuid, siblings: &[SiblingPosition]) -> Vec<PositionUpdate> {
    let mut others: Vec<SiblingPosition> = siblings
        .iter()
        .copied()
        .filter(|s| s.id != target)
        .collect();
    others.sort_by_key(|s| s.position);

    let mut updates = Vec::with_capacity(others.len() + 1);
    if siblings.iter().any(|s| s.id == target && s.position != PRIMARY_POSITION) {
        updates.push(PositionUpdate {
            id: target,
            position: PRIMARY_POSITION,
        });
    }

    for (index, sibling) in others.iter().enumerate() {
        let position = index as i32 + 1;
        if sibling.position != position {
            updates.push(PositionUpdate {
                id: sibling.id,
                position,
            });
        }
    }

    updates
}

/// Validate an explicit reorder batch against the live sibling set.
///
/// Siblings not mentioned in the batch keep their current position, so the
/// batch is rejected when it would collide with one of them, as well as when
/// it references unknown ids, repeats a sibling, repeats a target position,
/// or assigns a negative position. A rejected batch leaves the set untouched.
pub fn validate_reorder(
    assignments: &[PositionUpdate],
    siblings: &[SiblingPosition],
) -> Result<(), ReorderError> {
    let mut seen_ids: Vec<Uuid> = Vec::with_capacity(assignments.len());
    let mut seen_positions: Vec<i32> = Vec::with_capacity(assignments.len());

    for assignment in assignments {
        if !siblings.iter().any(|s| s.id == assignment.id) {
            return Err(ReorderError::UnknownSibling(assignment.id));
        }
        if seen_ids.contains(&assignment.id) {
            return Err(ReorderError::DuplicateSibling(assignment.id));
        }
        if assignment.position < 0 {
            return Err(ReorderError::NegativePosition {
                id: assignment.id,
                position: assignment.position,
            });
        }
        if seen_positions.contains(&assignment.position) {
            return Err(ReorderError::DuplicatePosition(assignment.position));
        }
        seen_ids.push(assignment.id);
        seen_positions.push(assignment.position);
    }

    for sibling in siblings {
        if seen_ids.contains(&sibling.id) {
            continue;
        }
        if seen_positions.contains(&sibling.position) {
            return Err(ReorderError::PositionCollision(sibling.position));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sibling(id: Uuid, position: i32) -> SiblingPosition {
        SiblingPosition { id, position }
    }

    /// Apply a plan to a sibling set and return the resulting id -> position map.
    fn apply(siblings: &[SiblingPosition], updates: &[PositionUpdate]) -> HashMap<Uuid, i32> {
        let mut state: HashMap<Uuid, i32> =
            siblings.iter().map(|s| (s.id, s.position)).collect();
        for update in updates {
            state.insert(update.id, update.position);
        }
        state
    }

    #[test]
    fn test_append_to_empty_set_uses_floor() {
        assert_eq!(next_position(&[], 1), 1);
        assert_eq!(next_position(&[], PRIMARY_POSITION), 0);
    }

    #[test]
    fn test_append_is_one_past_max() {
        assert_eq!(next_position(&[1, 2, 3], 1), 4);
        assert_eq!(next_position(&[0, 1, 2], 0), 3);
        // Gaps don't matter, only the maximum does
        assert_eq!(next_position(&[1, 7], 1), 8);
    }

    #[test]
    fn test_sequential_appends_stay_unique() {
        let mut positions: Vec<i32> = Vec::new();
        for _ in 0..20 {
            let next = next_position(&positions, 1);
            assert!(!positions.contains(&next));
            positions.push(next);
        }
        assert_eq!(positions, (1..=20).collect::<Vec<i32>>());
    }

    #[test]
    fn test_promotion_moves_target_to_zero() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let siblings = vec![sibling(a, 0), sibling(b, 1), sibling(c, 2)];

        let updates = plan_promotion(c, &siblings);
        let state = apply(&siblings, &updates);

        assert_eq!(state[&c], 0);
        assert_eq!(state[&a], 1);
        assert_eq!(state[&b], 2);
    }

    #[test]
    fn test_promotion_leaves_exactly_one_primary() {
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let siblings: Vec<SiblingPosition> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| sibling(*id, i as i32))
            .collect();

        let updates = plan_promotion(ids[3], &siblings);
        let state = apply(&siblings, &updates);

        let primaries: Vec<_> = state.values().filter(|p| **p == 0).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(state[&ids[3]], 0);
    }

    #[test]
    fn test_promotion_remaps_contiguously_in_prior_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let d = Uuid::new_v4();
        // Gapped positions: prior display order is a, b, c, d
        let siblings = vec![sibling(a, 0), sibling(b, 3), sibling(c, 7), sibling(d, 9)];

        let updates = plan_promotion(c, &siblings);
        let state = apply(&siblings, &updates);

        assert_eq!(state[&c], 0);
        // Remaining siblings are 1..n in their prior relative order
        assert_eq!(state[&a], 1);
        assert_eq!(state[&b], 2);
        assert_eq!(state[&d], 3);
    }

    #[test]
    fn test_promotion_heals_duplicate_positions() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // A corrupt set where two siblings share a position
        let siblings = vec![sibling(a, 1), sibling(b, 1), sibling(c, 2)];

        let updates = plan_promotion(c, &siblings);
        let state = apply(&siblings, &updates);

        assert_eq!(state[&c], 0);
        let mut rest: Vec<i32> = vec![state[&a], state[&b]];
        rest.sort_unstable();
        assert_eq!(rest, vec![1, 2]);
    }

    #[test]
    fn test_promotion_of_new_sibling_renumbers_existing() {
        let existing_a = Uuid::new_v4();
        let existing_b = Uuid::new_v4();
        let incoming = Uuid::new_v4();
        let siblings = vec![sibling(existing_a, 0), sibling(existing_b, 1)];

        // Promote-on-insert: the target is not part of the read snapshot
        let updates = plan_promotion(incoming, &siblings);

        assert!(updates.iter().all(|u| u.id != incoming));
        let state = apply(&siblings, &updates);
        assert_eq!(state[&existing_a], 1);
        assert_eq!(state[&existing_b], 2);
    }

    #[test]
    fn test_promotion_of_current_primary_is_a_no_op() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let siblings = vec![sibling(a, 0), sibling(b, 1)];

        let updates = plan_promotion(a, &siblings);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_validate_accepts_full_permutation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let siblings = vec![sibling(a, 1), sibling(b, 2), sibling(c, 3)];
        let assignments = vec![
            PositionUpdate { id: a, position: 3 },
            PositionUpdate { id: b, position: 1 },
            PositionUpdate { id: c, position: 2 },
        ];

        assert_eq!(validate_reorder(&assignments, &siblings), Ok(()));
    }

    #[test]
    fn test_validate_accepts_partial_batch_without_collision() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let siblings = vec![sibling(a, 1), sibling(b, 2), sibling(c, 3)];
        // Only a moves, to a position nobody holds
        let assignments = vec![PositionUpdate { id: a, position: 4 }];

        assert_eq!(validate_reorder(&assignments, &siblings), Ok(()));
    }

    #[test]
    fn test_validate_rejects_unknown_sibling() {
        let a = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let siblings = vec![sibling(a, 1)];
        let assignments = vec![PositionUpdate {
            id: stranger,
            position: 2,
        }];

        assert_eq!(
            validate_reorder(&assignments, &siblings),
            Err(ReorderError::UnknownSibling(stranger))
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_target_position() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let siblings = vec![sibling(a, 1), sibling(b, 2)];
        let assignments = vec![
            PositionUpdate { id: a, position: 5 },
            PositionUpdate { id: b, position: 5 },
        ];

        assert_eq!(
            validate_reorder(&assignments, &siblings),
            Err(ReorderError::DuplicatePosition(5))
        );
    }

    #[test]
    fn test_validate_rejects_collision_with_unmentioned_sibling() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let siblings = vec![sibling(a, 1), sibling(b, 2)];
        // b keeps position 2; assigning 2 to a would duplicate it
        let assignments = vec![PositionUpdate { id: a, position: 2 }];

        assert_eq!(
            validate_reorder(&assignments, &siblings),
            Err(ReorderError::PositionCollision(2))
        );
    }

    #[test]
    fn test_validate_rejects_repeated_sibling() {
        let a = Uuid::new_v4();
        let siblings = vec![sibling(a, 1)];
        let assignments = vec![
            PositionUpdate { id: a, position: 2 },
            PositionUpdate { id: a, position: 3 },
        ];

        assert_eq!(
            validate_reorder(&assignments, &siblings),
            Err(ReorderError::DuplicateSibling(a))
        );
    }

    #[test]
    fn test_validate_rejects_negative_position() {
        let a = Uuid::new_v4();
        let siblings = vec![sibling(a, 1)];
        let assignments = vec![PositionUpdate { id: a, position: -1 }];

        assert_eq!(
            validate_reorder(&assignments, &siblings),
            Err(ReorderError::NegativePosition {
                id: a,
                position: -1
            })
        );
    }
}
