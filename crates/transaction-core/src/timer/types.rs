//! Timer letters and durations.
//!
//! - **Retransmission timers** (A, E, G) start at T1 and double up to T2 on unreliable transports.
//! - **Transaction timeout timers** (B, F, H) fire after 64*T1.
//! - **Wait timers** (D, I, J, K, M) absorb retransmissions before a transaction
//!   terminates. On reliable transports D, I, J and K are zero.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A timer from RFC 3261 Section 17 (M is from RFC 6026).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerType {
    /// INVITE client: request retransmission interval.
    A,
    /// INVITE client: transaction timeout.
    B,
    /// INVITE client: wait time for response retransmissions after a non-2xx.
    D,
    /// Non-INVITE client: request retransmission interval.
    E,
    /// Non-INVITE client: transaction timeout.
    F,
    /// INVITE server: final response retransmission interval.
    G,
    /// INVITE server: wait time for ACK.
    H,
    /// INVITE server: wait time for ACK retransmissions.
    I,
    /// Non-INVITE server: wait time for request retransmissions.
    J,
    /// Non-INVITE client: wait time for response retransmissions.
    K,
    /// INVITE client: wait time for 2xx retransmissions in the Accepted state.
    M,
}

impl TimerType {
    /// Timers whose expiry means the peer never answered.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimerType::B | TimerType::F | TimerType::H)
    }

    /// Timers that trigger a retransmission and re-arm themselves.
    pub fn is_retransmission(&self) -> bool {
        matches!(self, TimerType::A | TimerType::E | TimerType::G)
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            TimerType::A => "A",
            TimerType::B => "B",
            TimerType::D => "D",
            TimerType::E => "E",
            TimerType::F => "F",
            TimerType::G => "G",
            TimerType::H => "H",
            TimerType::I => "I",
            TimerType::J => "J",
            TimerType::K => "K",
            TimerType::M => "M",
        };
        f.write_str(letter)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Base timer values. Serialized as milliseconds.
///
/// ```
/// use std::time::Duration;
/// use sipmesh_transaction_core::timer::TimerSettings;
///
/// let settings = TimerSettings::default();
/// assert_eq!(settings.timer_h(), Duration::from_secs(32));
/// assert_eq!(settings.timer_j(true), Duration::ZERO);
///
/// // Faster timers for a LAN
/// let fast = TimerSettings {
///     t1: Duration::from_millis(100),
///     ..Default::default()
/// };
/// assert_eq!(fast.timer_b(), Duration::from_millis(6400));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// RTT estimate (default 500 ms).
    #[serde(with = "millis")]
    pub t1: Duration,
    /// Maximum retransmission interval for non-INVITE requests and INVITE responses (default 4 s).
    #[serde(with = "millis")]
    pub t2: Duration,
    /// Maximum time a message stays in the network (default 5 s).
    #[serde(with = "millis")]
    pub t4: Duration,
    /// Timer D on unreliable transports; RFC 3261 requires at least 32 s.
    #[serde(with = "millis")]
    pub wait_time_d: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
            t4: Duration::from_secs(5),
            wait_time_d: Duration::from_secs(32),
        }
    }
}

impl TimerSettings {
    /// 64*T1, the shared value of Timers B, F, H, J and M.
    pub fn transaction_timeout(&self) -> Duration {
        self.t1 * 64
    }

    pub fn timer_a(&self) -> Duration {
        self.t1
    }

    pub fn timer_b(&self) -> Duration {
        self.transaction_timeout()
    }

    pub fn timer_d(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.wait_time_d }
    }

    pub fn timer_e(&self) -> Duration {
        self.t1
    }

    pub fn timer_f(&self) -> Duration {
        self.transaction_timeout()
    }

    pub fn timer_g(&self) -> Duration {
        self.t1
    }

    pub fn timer_h(&self) -> Duration {
        self.transaction_timeout()
    }

    pub fn timer_i(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.t4 }
    }

    pub fn timer_j(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.transaction_timeout() }
    }

    pub fn timer_k(&self, reliable: bool) -> Duration {
        if reliable { Duration::ZERO } else { self.t4 }
    }

    pub fn timer_m(&self) -> Duration {
        self.transaction_timeout()
    }

    /// Initial duration for `timer`.
    pub fn duration(&self, timer: TimerType, reliable: bool) -> Duration {
        match timer {
            TimerType::A => self.timer_a(),
            TimerType::B => self.timer_b(),
            TimerType::D => self.timer_d(reliable),
            TimerType::E => self.timer_e(),
            TimerType::F => self.timer_f(),
            TimerType::G => self.timer_g(),
            TimerType::H => self.timer_h(),
            TimerType::I => self.timer_i(reliable),
            TimerType::J => self.timer_j(reliable),
            TimerType::K => self.timer_k(reliable),
            TimerType::M => self.timer_m(),
        }
    }

    /// Next interval of a doubling retransmission timer, capped at T2.
    pub fn next_interval(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.t2)
    }
}
