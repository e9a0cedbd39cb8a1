//! Reconciles freshly registered recommendations with stored ones.

use crate::storage::Recommendation;

/// Merges `incoming` into `current`.
///
/// Each stored entry is replaced by the first incoming entry with the same
/// `(source_id, extension_id)` key, keeping the stored `user_ignored` flag.
/// Stored entries with no match pass through. Incoming entries that did not
/// replace anything are appended in input order.
///
/// Consumption is tracked by position in `incoming`, not by value identity:
/// sources build fresh values on every call, and duplicate keys within one
/// batch must still collapse to a single stored entry.
pub fn merge_recommendations(
    current: Vec<Recommendation>,
    incoming: &[Recommendation],
) -> Vec<Recommendation> {
    let mut consumed = vec![false; incoming.len()];
    let mut merged = Vec::with_capacity(current.len() + incoming.len());

    for stored in current {
        match incoming.iter().position(|rec| rec.same_key(&stored)) {
            Some(idx) => {
                consumed[idx] = true;
                let mut replacement = incoming[idx].clone();
                replacement.user_ignored = stored.user_ignored;
                merged.push(replacement);
            }
            None => merged.push(stored),
        }
    }

    for (idx, rec) in incoming.iter().enumerate() {
        if consumed[idx] {
            continue;
        }
        // A key repeated within the batch collapses onto its first occurrence.
        if merged.iter().any(|m| m.same_key(rec)) {
            continue;
        }
        let mut added = rec.clone();
        added.user_ignored = false;
        merged.push(added);
    }

    merged
}
