use std::collections::HashSet;

use tracing::debug;

/// Splits at the first dot, so `a.fq.gz` is `("a", ".fq.gz")`.
pub fn split_first_dot(name: &str) -> (&str, &str) {
    match name.find('.') {
        Some(pos) => name.split_at(pos),
        None => (name, ""),
    }
}

/// Tracks the name stems already handed out within one ingestion batch.
///
/// Only in-batch names are considered; collisions with files stored by
/// earlier batches are resolved by the relocator.
#[derive(Debug, Default)]
pub struct NameRegistry {
    used: HashSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a collision-free name for `original`, keeping its extension.
    pub fn claim(&mut self, original: &str) -> String {
        let (stem, exts) = split_first_dot(original);
        if !self.used.contains(stem) {
            self.used.insert(stem.to_string());
            return original.to_string();
        }

        let mut counter = 1usize;
        let mut candidate = format!("{stem}{counter}");
        while self.used.contains(&candidate) {
            counter += 1;
            candidate = format!("{stem}{counter}");
        }
        debug!(original, renamed = %format!("{candidate}{exts}"), "deduplicated file name");
        self.used.insert(candidate.clone());
        format!("{candidate}{exts}")
    }
}
