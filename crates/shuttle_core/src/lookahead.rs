//! "Current stop plus the next K" previews.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    Result,
    error::poisoned,
    model::{LineId, Stop},
    traversal::{TraversalState, step},
};

/// Replays `depth` advances on a copy of the working route. Every on-demand
/// stop met is treated as served for the preview only.
pub fn lookahead(state: &TraversalState, depth: usize) -> Result<Vec<Stop>> {
    let mut route = state.route().to_vec();
    let mut index = state.index();
    let mut forward = state.forward();

    let mut out = Vec::with_capacity(depth + 1);
    out.push(state.current()?.clone());
    for _ in 0..depth {
        step(&mut route, &mut index, &mut forward)?;
        out.push(route[index].clone());
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct LookaheadKey {
    line: LineId,
    line_version: u64,
    revision: u64,
    index: usize,
    forward: bool,
    depth: usize,
}

impl LookaheadKey {
    fn of(state: &TraversalState, depth: usize) -> Self {
        Self {
            line: state.line_id,
            line_version: state.line_version,
            revision: state.revision(),
            index: state.index(),
            forward: state.forward(),
            depth,
        }
    }
}

/// Memoized previews keyed by everything a preview depends on, so a repeated
/// poll is free and an advanced vehicle never sees a stale list.
#[derive(Debug)]
pub struct LookaheadCache {
    capacity: usize,
    entries: Mutex<HashMap<LookaheadKey, Arc<[Stop]>>>,
}

impl LookaheadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::default(),
        }
    }

    pub fn get_or_build(&self, state: &TraversalState, depth: usize) -> Result<Arc<[Stop]>> {
        let key = LookaheadKey::of(state, depth);
        {
            let entries = self.entries.lock().map_err(poisoned("lookahead cache"))?;
            if let Some(hit) = entries.get(&key) {
                return Ok(Arc::clone(hit));
            }
        }

        let built: Arc<[Stop]> = lookahead(state, depth)?.into();
        if self.capacity == 0 {
            return Ok(built);
        }

        let mut entries = self.entries.lock().map_err(poisoned("lookahead cache"))?;
        if entries.len() >= self.capacity {
            log::debug!("lookahead: cache full entries={} clearing", entries.len());
            entries.clear();
        }
        entries.insert(key, Arc::clone(&built));
        Ok(built)
    }

    pub fn len(&self) -> Result<usize> {
        let entries = self.entries.lock().map_err(poisoned("lookahead cache"))?;
        Ok(entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::{LookaheadCache, lookahead};
    use crate::{
        Error,
        model::StopKind,
        traversal::{
            TraversalState,
            tests::{order, stop},
        },
    };

    fn state() -> TraversalState {
        TraversalState::new(
            3,
            &order(vec![
                stop(1, StopKind::Static),
                stop(2, StopKind::PassengerPickup),
                stop(3, StopKind::Static),
                stop(4, StopKind::ParcelDropoff),
            ]),
            false,
        )
        .expect("state")
    }

    fn ids(stops: &[crate::model::Stop]) -> Vec<u64> {
        stops.iter().map(|s| s.id).collect()
    }

    #[test]
    fn lookahead_replays_removal_and_reversal() {
        let state = state();
        // 1 -> 2 (served) -> 3 -> 4 (served, end reached) -> reversed [3,1] at 1.
        let preview = lookahead(&state, 5).expect("lookahead");
        assert_eq!(ids(&preview), vec![1, 2, 3, 4, 1, 3]);
    }

    #[test]
    fn lookahead_zero_depth_is_current_stop() {
        let preview = lookahead(&state(), 0).expect("lookahead");
        assert_eq!(ids(&preview), vec![1]);
    }

    #[test]
    fn lookahead_does_not_touch_the_vehicle_state() {
        let mut state = state();
        state.advance().expect("advance");
        let before = state.clone();

        let preview = lookahead(&state, 6).expect("lookahead");
        assert_eq!(preview.len(), 7);
        assert_eq!(state, before);
        assert_eq!(state.route().len(), 4);
    }

    #[test]
    fn cache_reuses_until_the_state_moves() {
        let cache = LookaheadCache::new(16);
        let mut state = state();

        let first = cache.get_or_build(&state, 2).expect("build");
        let again = cache.get_or_build(&state, 2).expect("hit");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.len().expect("len"), 1);

        state.advance().expect("advance");
        let moved = cache.get_or_build(&state, 2).expect("build");
        assert_eq!(ids(&first), vec![1, 2, 3]);
        assert_eq!(ids(&moved), vec![2, 3, 4]);

        let deeper = cache.get_or_build(&state, 3).expect("build");
        assert_eq!(deeper.len(), 4);
        assert_eq!(cache.len().expect("len"), 3);
    }

    #[test]
    fn cache_distinguishes_vehicles_on_the_same_line() {
        let cache = LookaheadCache::new(16);
        let parked = state();
        let mut moving = state();
        moving.advance().expect("advance");
        moving.advance().expect("advance");

        let a = cache.get_or_build(&parked, 2).expect("build");
        let b = cache.get_or_build(&moving, 2).expect("build");
        assert_eq!(ids(&a), vec![1, 2, 3]);
        assert_eq!(ids(&b), vec![3, 4, 1]);
    }

    #[test]
    fn cache_clears_when_full() {
        let cache = LookaheadCache::new(2);
        let state = state();
        for depth in 0..3 {
            cache.get_or_build(&state, depth).expect("build");
        }
        assert_eq!(cache.len().expect("len"), 1);

        let disabled = LookaheadCache::new(0);
        disabled.get_or_build(&state, 1).expect("build");
        assert!(disabled.is_empty().expect("len"));
    }

    #[test]
    fn poisoned_cache_reports_an_invariant_instead_of_a_size() {
        let cache = Arc::new(LookaheadCache::new(4));
        cache.get_or_build(&state(), 1).expect("build");

        let holder = Arc::clone(&cache);
        let outcome = thread::spawn(move || {
            let _entries = holder.entries.lock().expect("lock");
            panic!("poison the lookahead cache");
        })
        .join();
        assert!(outcome.is_err());

        assert!(matches!(cache.len(), Err(Error::Invariant(_))));
        assert!(matches!(cache.is_empty(), Err(Error::Invariant(_))));
    }
}
