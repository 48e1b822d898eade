use std::collections::{BTreeMap, VecDeque};

/// Tapped delay line that fires registered actions at fixed offsets after a
/// single-tick trigger.
///
/// The trigger is shifted into a history covering `max_offset + 1` ticks.
/// Position `k` of the history is set when the trigger fired `k` ticks ago;
/// the actions registered at offset `k` are then due in the current tick.
#[derive(Debug, Clone)]
pub struct Timeline<A> {
    events: BTreeMap<usize, Vec<A>>,
    history: VecDeque<bool>,
    retriggered: bool,
}

impl<A: Clone> Timeline<A> {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            history: VecDeque::new(),
            retriggered: false,
        }
    }

    /// Appends `actions` to the batch fired at `offset`.
    pub fn register<I>(&mut self, offset: usize, actions: I)
    where
        I: IntoIterator<Item = A>,
    {
        self.events.entry(offset).or_default().extend(actions);
    }

    pub fn max_offset(&self) -> Option<usize> {
        self.events.keys().next_back().copied()
    }

    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.events.keys().copied()
    }

    pub fn actions_at(&self, offset: usize) -> &[A] {
        self.events.get(&offset).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ticks a trigger must stay quiet after firing before the next one.
    pub fn dead_time(&self) -> usize {
        self.max_offset().unwrap_or(0)
    }

    /// Shifts the trigger history by one tick and returns every action due in
    /// this tick, ordered by offset.
    pub fn tick(&mut self, trigger: bool) -> Vec<A> {
        let dead_time = self.dead_time();
        // position j of the old history holds the trigger from j + 1 ticks ago
        self.retriggered = trigger
            && self
                .history
                .iter()
                .take(dead_time.saturating_sub(1))
                .any(|&fired| fired);
        self.history.push_front(trigger);
        self.history.truncate(dead_time + 1);

        let mut due = Vec::new();
        for (&offset, actions) in &self.events {
            if self.history.get(offset).copied().unwrap_or(false) {
                due.extend(actions.iter().cloned());
            }
        }
        due
    }

    /// Whether the trigger of the last tick arrived inside the dead time of
    /// an earlier one.
    pub fn retriggered(&self) -> bool {
        self.retriggered
    }

    /// Whether any trigger is still travelling down the history.
    pub fn in_flight(&self) -> bool {
        self.history.iter().any(|&fired| fired)
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.retriggered = false;
    }
}

impl<A: Clone> Default for Timeline<A> {
    fn default() -> Self {
        Self::new()
    }
}
