use std::collections::HashSet;

use super::message::OutboxMessage;

/// Keep only the last message for each key, preserving the order of the
/// messages that survive.
///
/// Keyless messages cannot supersede each other and are always kept.
pub fn compact(batch: Vec<OutboxMessage>) -> Vec<OutboxMessage> {
    let mut seen = HashSet::new();
    let mut kept: Vec<OutboxMessage> = batch
        .into_iter()
        .rev()
        .filter(|message| match &message.key {
            Some(key) => seen.insert(key.clone()),
            None => true,
        })
        .collect();
    kept.reverse();
    kept
}
