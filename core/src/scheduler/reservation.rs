use crate::prelude::{VvmError, VvmResult};
use std::collections::BTreeMap;

/// Tick-indexed bookings of a resource that can serve one user per tick.
///
/// Bookings are checked once while a schedule is built; nothing arbitrates
/// at run time.
#[derive(Debug, Clone)]
pub struct ReservationTable {
    resource: &'static str,
    slots: BTreeMap<usize, String>,
}

impl ReservationTable {
    pub fn new(resource: &'static str) -> Self {
        Self {
            resource,
            slots: BTreeMap::new(),
        }
    }

    pub fn reserve(&mut self, tick: usize, owner: impl Into<String>) -> VvmResult<()> {
        let owner = owner.into();
        if let Some(existing) = self.slots.get(&tick) {
            return Err(VvmError::ScheduleConflict {
                offset: tick,
                detail: format!("{} claimed by {} and {}", self.resource, existing, owner),
            });
        }
        self.slots.insert(tick, owner);
        Ok(())
    }

    pub fn owner(&self, tick: usize) -> Option<&str> {
        self.slots.get(&tick).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
