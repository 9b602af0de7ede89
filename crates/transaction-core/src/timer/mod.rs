//! RFC 3261 transaction timers.
//!
//! - [`TimerType`]: the lettered timers of RFC 3261 Section 17 (plus Timer M from RFC 6026)
//! - [`TimerSettings`]: T1/T2/T4 and the durations derived from them
//!
//! Timers are plain tokio tasks owned by the transaction that armed them; see
//! [`TimerSlots`](crate::transaction::TimerSlots).

pub mod types;

pub use types::{TimerSettings, TimerType};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_re_exports_exist_and_usable() {
        let settings = TimerSettings::default();
        assert_eq!(settings.t1, Duration::from_millis(500));
        assert_eq!(TimerType::A.to_string(), "A");
    }
}
