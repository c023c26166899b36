use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current instant. Ledgers take it as a handle so that
/// expiry checks do not depend on the wall clock in tests.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

#[cfg(test)]
#[derive(Clone, Copy, Debug)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_uuids() {
        let first = new_id();
        let second = new_id();

        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }
}
