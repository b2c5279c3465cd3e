//! Wall-clock helpers shared by the store and the sync engine.

/// Current Unix timestamp in milliseconds.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Change-collection baseline for a session starting now.
///
/// One millisecond behind the clock, so an edit stamped in the same
/// millisecond as the session start is collected again next time.
pub fn sync_baseline() -> i64 {
    unix_millis_now().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_trails_the_clock() {
        let before = unix_millis_now();
        let baseline = sync_baseline();
        assert!(baseline < unix_millis_now());
        assert!(baseline >= before - 1);
    }
}
