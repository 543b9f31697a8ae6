//! Live-object accounting for heap-backed runtime values.
//!
//! Counters are per thread because values are single-threaded `Rc` graphs and
//! the test harness runs tests on parallel threads.

use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeakStats {
    pub arrays: usize,
    pub dicts: usize,
    pub functions: usize,
    pub effects: usize,
    pub cells: usize,
}

impl LeakStats {
    pub fn total(&self) -> usize {
        self.arrays + self.dicts + self.functions + self.effects + self.cells
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Tracked {
    Array,
    Dict,
    Function,
    Effect,
    Cell,
}

thread_local! {
    static LIVE: [Cell<usize>; 5] = const {
        [Cell::new(0), Cell::new(0), Cell::new(0), Cell::new(0), Cell::new(0)]
    };
}

fn slot(kind: Tracked) -> usize {
    match kind {
        Tracked::Array => 0,
        Tracked::Dict => 1,
        Tracked::Function => 2,
        Tracked::Effect => 3,
        Tracked::Cell => 4,
    }
}

pub(crate) fn record_alloc(kind: Tracked) {
    let _ = LIVE.try_with(|live| {
        let c = &live[slot(kind)];
        c.set(c.get() + 1);
    });
}

// Values dropped during thread-local teardown may outlive the counters.
pub(crate) fn record_release(kind: Tracked) {
    let _ = LIVE.try_with(|live| {
        let c = &live[slot(kind)];
        c.set(c.get().saturating_sub(1));
    });
}

pub fn snapshot() -> LeakStats {
    LIVE.try_with(|live| LeakStats {
        arrays: live[0].get(),
        dicts: live[1].get(),
        functions: live[2].get(),
        effects: live[3].get(),
        cells: live[4].get(),
    })
    .unwrap_or_default()
}
