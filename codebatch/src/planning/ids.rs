//! Deterministic task ids: `task_<n>` for whole batches, `task_<n>_<k>` for
//! the parts of one split file.

use super::strategy::PlannedUnit;
use crate::state::types::{Batch, BatchKind, TaskId};

const PREFIX: &str = "task_";

/// Numbers planned units in plan order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskIdAssigner;

impl TaskIdAssigner {
    pub fn new() -> Self {
        Self
    }

    pub fn whole_id(number: usize) -> TaskId {
        format!("{}{}", PREFIX, number)
    }

    pub fn part_id(number: usize, part_index: usize) -> TaskId {
        format!("{}{}_{}", PREFIX, number, part_index)
    }

    /// Assign ids and sequence indices. Numbering starts at 1.
    pub fn assign(&self, units: Vec<PlannedUnit>) -> Vec<Batch> {
        let mut batches = Vec::new();
        for (idx, unit) in units.into_iter().enumerate() {
            let number = idx + 1;
            match unit {
                PlannedUnit::Whole(planned) => batches.push(Batch {
                    id: Self::whole_id(number),
                    sequence_index: batches.len(),
                    total_tokens: planned.total_tokens,
                    kind: planned.kind,
                }),
                PlannedUnit::Parts(parts) => {
                    for planned in parts {
                        let part_index = match planned.kind {
                            BatchKind::Multi { part_index, .. } => part_index,
                            _ => 1,
                        };
                        batches.push(Batch {
                            id: Self::part_id(number, part_index),
                            sequence_index: batches.len(),
                            total_tokens: planned.total_tokens,
                            kind: planned.kind,
                        });
                    }
                }
            }
        }
        batches
    }
}
