//! Identifier helpers.

use uuid::Uuid;

/// Generate a fresh event id. UUIDv7 is monotonic-time-ordered, which keeps
/// ids roughly sorted by creation time without a separate sequence column.
pub fn new_event_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_time_ordered() {
        let a = new_event_id();
        let b = new_event_id();
        assert!(a <= b);
    }
}
