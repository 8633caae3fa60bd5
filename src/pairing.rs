use std::collections::HashMap;

use tracing::warn;

use crate::domain::{Mate, ReadId, ReadKey};

/// Links mated reads of one batch by their form index rather than by the
/// order they were processed in.
///
/// The first mate of an index to be persisted waits here; the other mate
/// completes the pair whichever order they arrive in.
#[derive(Debug, Default)]
pub struct PairLinker {
    waiting: HashMap<u32, (Mate, ReadId)>,
}

impl PairLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly persisted read and returns its sibling if this read
    /// completes a pair.
    pub fn observe(&mut self, key: ReadKey, read: ReadId) -> Option<ReadId> {
        let mate = key.mate?;
        match self.waiting.remove(&key.index) {
            Some((waiting_mate, sibling)) if waiting_mate != mate => Some(sibling),
            Some(_) => {
                warn!(key = %key, "same mate seen twice, keeping the latest");
                self.waiting.insert(key.index, (mate, read));
                None
            }
            None => {
                self.waiting.insert(key.index, (mate, read));
                None
            }
        }
    }

    /// Reads whose mate never showed up.
    pub fn unmatched(&self) -> Vec<ReadId> {
        self.waiting.values().map(|(_, read)| *read).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(index: u32, mate: Option<Mate>) -> ReadKey {
        ReadKey { index, mate }
    }

    #[test]
    fn mates_in_order_are_linked() {
        let mut linker = PairLinker::new();
        let first = ReadId::new();
        let second = ReadId::new();
        assert_eq!(linker.observe(key(1, Some(Mate::First)), first), None);
        assert_eq!(linker.observe(key(1, Some(Mate::Second)), second), Some(first));
        assert!(linker.unmatched().is_empty());
    }

    #[test]
    fn mates_out_of_order_are_linked() {
        let mut linker = PairLinker::new();
        let a1 = ReadId::new();
        let b1 = ReadId::new();
        let b2 = ReadId::new();
        let a2 = ReadId::new();
        assert_eq!(linker.observe(key(1, Some(Mate::Second)), a2), None);
        assert_eq!(linker.observe(key(2, Some(Mate::First)), b1), None);
        assert_eq!(linker.observe(key(1, Some(Mate::First)), a1), Some(a2));
        assert_eq!(linker.observe(key(2, Some(Mate::Second)), b2), Some(b1));
    }

    #[test]
    fn single_end_reads_never_pair() {
        let mut linker = PairLinker::new();
        assert_eq!(linker.observe(key(2, None), ReadId::new()), None);
        assert_eq!(linker.observe(key(2, None), ReadId::new()), None);
        assert!(linker.unmatched().is_empty());
    }

    #[test]
    fn lone_mate_is_reported() {
        let mut linker = PairLinker::new();
        let lone = ReadId::new();
        linker.observe(key(4, Some(Mate::First)), lone);
        assert_eq!(linker.unmatched(), vec![lone]);
    }
}
