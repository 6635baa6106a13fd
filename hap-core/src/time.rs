//! Monotonic time APIs used for session and procedure timeouts.
//!
//! These are deliberately coarse (millisecond resolution, `u64` arithmetic) since nothing in the
//! pairing or transport core needs more precision than that. The concrete clock is supplied by the
//! host through [`Clock`].

use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};

/// A duration with millisecond resolution.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Self = Duration(0);

    pub fn from_millis(millis: u64) -> Self {
        Duration(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        Duration(secs * 1_000)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000
    }
}

impl Add for Duration {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Duration(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A point in time, relative to an unspecified epoch.
///
/// `Instant`s are only meaningful when compared against other `Instant`s obtained from the same
/// [`Clock`] implementation.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(u64);

impl Instant {
    /// Creates an `Instant` from raw milliseconds since an implementation-defined reference point.
    ///
    /// This should only be called from a [`Clock`] implementation.
    pub fn from_raw_millis(millis: u64) -> Self {
        Instant(millis)
    }

    pub fn raw_millis(&self) -> u64 {
        self.0
    }

    /// Duration elapsed between `earlier` and `self`. Saturates to zero if `earlier` is later.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }

    pub fn checked_add(&self, d: Duration) -> Self {
        Instant(self.0.saturating_add(d.0))
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;
    fn sub(self, rhs: Self) -> Duration {
        self.duration_since(rhs)
    }
}

impl Add<Duration> for Instant {
    type Output = Self;
    fn add(self, d: Duration) -> Self {
        self.checked_add(d)
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, d: Duration) {
        *self = *self + d;
    }
}

impl fmt::Debug for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Trait for monotonic clock providers.
///
/// The host must provide an implementation with millisecond accuracy. `now()` must never move
/// backwards in time.
pub trait Clock {
    fn now(&self) -> Instant;
}
