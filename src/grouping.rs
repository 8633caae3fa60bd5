use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::{Read, ReadId};

/// Reads of one run as they are displayed: mates side by side, single-end
/// reads on their own.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadGroups {
    pub raw: Vec<Vec<Read>>,
    pub processed: Vec<Vec<Read>>,
}

impl ReadGroups {
    pub fn group_count(&self) -> usize {
        self.raw.len() + self.processed.len()
    }
}

/// Rebuilds sibling groups from persisted reads.
///
/// Each read lands in exactly one group. A sibling is only honoured when it
/// is present in `reads`, shares the processed flag and points back; anything
/// else is shown as a single read.
pub fn reconstruct(reads: &[Read]) -> ReadGroups {
    let by_id = reads
        .iter()
        .map(|read| (read.id, read))
        .collect::<HashMap<ReadId, &Read>>();
    let mut grouped = HashSet::new();
    let mut groups = ReadGroups::default();

    for read in reads {
        if grouped.contains(&read.id) {
            continue;
        }
        grouped.insert(read.id);

        let mate = read
            .sibling
            .and_then(|id| by_id.get(&id).copied())
            .filter(|mate| mate.processed == read.processed)
            .filter(|mate| mate.sibling == Some(read.id))
            .filter(|mate| !grouped.contains(&mate.id));

        let group = match mate {
            Some(mate) => {
                grouped.insert(mate.id);
                vec![read.clone(), mate.clone()]
            }
            None => vec![read.clone()],
        };

        if read.processed {
            groups.processed.push(group);
        } else {
            groups.raw.push(group);
        }
    }

    groups
}
