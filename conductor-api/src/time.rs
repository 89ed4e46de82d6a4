use std::fmt::Debug;
use std::time::SystemTime;

/// Interface for reading wall-clock time.
///
/// The daemon injects a clock into every time-dependent collaborator so
/// tests can pin timestamps; production code uses [`SystemClock`].
pub trait Clock: Send + Sync + Debug {
    /// The current wall-clock instant.
    fn now(&self) -> SystemTime;
}

/// Default [`Clock`] reading the system clock.
#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
