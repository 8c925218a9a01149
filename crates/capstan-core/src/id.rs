//! Monotone record identifiers.
//!
//! Claims and results are keyed by opaque strings whose lexicographic order
//! must equal their creation order; every `read_last_*` query depends on
//! it. ULIDs give the time-sortable prefix, and a process-wide monotonic
//! generator keeps ids issued within the same millisecond strictly
//! increasing.

// Mutex poisoning indicates a panic in another thread, which is
// unrecoverable.
#![allow(clippy::missing_panics_doc)]

use std::sync::{Mutex, OnceLock};

use ulid::Generator;

static GENERATOR: OnceLock<Mutex<Generator>> = OnceLock::new();

/// Issues the next record id.
///
/// Ids are 26-character Crockford base32 ULIDs. Within a single process the
/// returned strings are strictly increasing, so sorting them as strings
/// yields chronological order.
#[must_use]
pub fn new_record_id() -> String {
    let generator = GENERATOR.get_or_init(|| Mutex::new(Generator::new()));
    let mut generator = generator.lock().expect("lock poisoned");
    loop {
        // Generation only fails when the random component overflows within
        // one millisecond; waiting out the tick resolves it.
        match generator.generate() {
            Ok(id) => return id.to_string(),
            Err(_) => std::thread::yield_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let mut previous = new_record_id();
        for _ in 0..1000 {
            let next = new_record_id();
            assert!(next > previous, "{next} should sort after {previous}");
            previous = next;
        }
    }

    #[test]
    fn ids_have_ulid_shape() {
        let id = new_record_id();
        assert_eq!(id.len(), 26);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
