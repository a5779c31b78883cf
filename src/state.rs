//! Shared competition state
//!
//! Holds the canonical entity collections behind a single reader/writer
//! lock. Reads copy out; all producers publish through
//! [`State::update_from_meos`], which swaps in the new generation and
//! notifies registered callbacks only when the data materially changed.

use std::sync::{Arc, Mutex, RwLock, RwLockWriteGuard};

use tracing::debug;

use crate::models::{Class, Club, Competitor, Control, Event};

type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// The canonical collections, visible to producers through [`State::lock`].
#[derive(Debug, Default)]
pub struct StateInner {
    pub event: Option<Event>,
    pub controls: Vec<Control>,
    pub classes: Vec<Class>,
    pub clubs: Vec<Club>,
    pub competitors: Vec<Competitor>,
}

/// Process-wide competition state with change detection.
///
/// Constructed explicitly and passed as an `Arc<State>` handle to every
/// component that needs it; nothing reaches in except through the
/// accessors here.
pub struct State {
    inner: RwLock<StateInner>,
    callbacks: Mutex<Vec<UpdateCallback>>,
}

impl State {
    pub fn new() -> Self {
        State {
            inner: RwLock::new(StateInner::default()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Write access for producers that seed several collections at once
    /// outside the change-detecting publish path. Held for the duration
    /// of the guard; no callbacks fire.
    pub fn lock(&self) -> RwLockWriteGuard<'_, StateInner> {
        self.inner.write().unwrap()
    }

    pub fn event(&self) -> Option<Event> {
        self.inner.read().unwrap().event.clone()
    }

    pub fn controls(&self) -> Vec<Control> {
        self.inner.read().unwrap().controls.clone()
    }

    pub fn classes(&self) -> Vec<Class> {
        self.inner.read().unwrap().classes.clone()
    }

    pub fn clubs(&self) -> Vec<Club> {
        self.inner.read().unwrap().clubs.clone()
    }

    pub fn competitors(&self) -> Vec<Competitor> {
        self.inner.read().unwrap().competitors.clone()
    }

    pub fn competitors_by_class(&self, class_id: u32) -> Vec<Competitor> {
        self.inner
            .read()
            .unwrap()
            .competitors
            .iter()
            .filter(|c| c.class.id == class_id)
            .cloned()
            .collect()
    }

    pub fn competitor(&self, id: u32) -> Option<Competitor> {
        self.inner
            .read()
            .unwrap()
            .competitors
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    /// Register a callback invoked once per materially-different update.
    /// Safe to call concurrently with delivery.
    pub fn on_update<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.lock().unwrap().push(Arc::new(callback));
    }

    /// Publish a new generation of state.
    ///
    /// Always swaps in the new collections so readers see the latest
    /// generation, but fires the update callbacks only when the new
    /// generation differs from the previous one. The write lock is
    /// released before any callback runs.
    pub fn update_from_meos(
        &self,
        event: Option<Event>,
        controls: Vec<Control>,
        classes: Vec<Class>,
        clubs: Vec<Club>,
        competitors: Vec<Competitor>,
    ) {
        let has_changes = {
            let mut inner = self.inner.write().unwrap();
            let changed = detect_changes(&inner, &event, &controls, &classes, &clubs, &competitors);

            inner.event = event;
            inner.controls = controls;
            inner.classes = classes;
            inner.clubs = clubs;
            inner.competitors = competitors;
            changed
        };

        if has_changes {
            debug!("state changed, notifying update callbacks");
            self.notify_update();
        } else {
            debug!("no state changes detected");
        }
    }

    fn notify_update(&self) {
        // Copy the list out so slow callbacks never block registration.
        let snapshot: Vec<UpdateCallback> = self.callbacks.lock().unwrap().clone();
        for callback in snapshot {
            callback();
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

/// Compare the incoming generation against the current one, cheapest
/// check first, short-circuiting on the first difference.
fn detect_changes(
    current: &StateInner,
    event: &Option<Event>,
    controls: &[Control],
    classes: &[Class],
    clubs: &[Club],
    competitors: &[Competitor],
) -> bool {
    if current.event.is_some() != event.is_some() {
        return true;
    }

    if current.controls.len() != controls.len()
        || current.classes.len() != classes.len()
        || current.clubs.len() != clubs.len()
        || current.competitors.len() != competitors.len()
    {
        return true;
    }

    if let (Some(old), Some(new)) = (&current.event, event) {
        if old.name != new.name || old.organizer != new.organizer || old.start != new.start {
            return true;
        }
    }

    let previous: std::collections::HashMap<u32, &Competitor> =
        current.competitors.iter().map(|c| (c.id, c)).collect();

    for incoming in competitors {
        let Some(old) = previous.get(&incoming.id) else {
            return true;
        };

        if old.status != incoming.status
            || old.card != incoming.card
            || old.name != incoming.name
            || old.start_time != incoming.start_time
            || old.class.id != incoming.class.id
            || old.club.id != incoming.club.id
        {
            debug!(
                competitor = incoming.id,
                "competitor fields changed between generations"
            );
            return true;
        }

        if old.finish_time != incoming.finish_time {
            debug!(competitor = incoming.id, "competitor finish time changed");
            return true;
        }

        if old.splits.len() != incoming.splits.len() {
            debug!(
                competitor = incoming.id,
                old = old.splits.len(),
                new = incoming.splits.len(),
                "competitor split count changed"
            );
            return true;
        }
        for (old_split, new_split) in old.splits.iter().zip(incoming.splits.iter()) {
            if old_split.control.id != new_split.control.id
                || old_split.passing_time != new_split.passing_time
            {
                debug!(competitor = incoming.id, "competitor split changed");
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompetitorStatus, Split};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_event() -> Event {
        Event {
            name: "Test Event".to_string(),
            organizer: "Test Club".to_string(),
            start: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        }
    }

    fn sample_competitor(id: u32) -> Competitor {
        Competitor {
            id,
            card: 500_000 + id,
            club: Club {
                id: 1,
                country_code: "SWE".to_string(),
                name: "OK Silva".to_string(),
            },
            class: Class {
                id: 1,
                order_key: 10,
                radio_controls: vec![],
                name: "Men Elite".to_string(),
            },
            status: CompetitorStatus::NotStarted,
            start_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap()),
            finish_time: None,
            name: format!("Runner {id}"),
            splits: vec![],
        }
    }

    #[test]
    fn reads_return_copies() {
        let state = State::new();
        state.update_from_meos(
            Some(sample_event()),
            vec![Control {
                id: 1,
                name: "Radio 1".to_string(),
            }],
            vec![],
            vec![],
            vec![],
        );

        let mut controls = state.controls();
        controls[0].name = "Mutated".to_string();
        assert_eq!(state.controls()[0].name, "Radio 1");
    }

    #[test]
    fn callback_fires_once_per_material_change() {
        let state = State::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        state.on_update(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let competitors = vec![sample_competitor(1), sample_competitor(2)];
        state.update_from_meos(
            Some(sample_event()),
            vec![],
            vec![],
            vec![],
            competitors.clone(),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Field-for-field identical generation: swap happens, no callback.
        state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], competitors);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn status_change_is_detected() {
        let state = State::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        state.on_update(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let before = vec![sample_competitor(1)];
        let mut after = before.clone();
        after[0].status = CompetitorStatus::Running;

        state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], before);
        state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], after);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn split_time_change_is_detected() {
        let state = State::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        state.on_update(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let control = Control {
            id: 1,
            name: "Radio 1".to_string(),
        };
        let mut first = sample_competitor(1);
        first.splits = vec![Split {
            control: control.clone(),
            passing_time: Utc.with_ymd_and_hms(2024, 6, 1, 10, 40, 0).unwrap(),
        }];
        let mut second = first.clone();
        second.splits[0].passing_time = Utc.with_ymd_and_hms(2024, 6, 1, 10, 41, 0).unwrap();

        state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], vec![first]);
        state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], vec![second]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn event_presence_flip_is_a_change() {
        let state = State::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        state.on_update(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], vec![]);
        state.update_from_meos(None, vec![], vec![], vec![], vec![]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn swap_always_happens_even_without_changes() {
        let state = State::new();
        let competitors = vec![sample_competitor(1)];
        state.update_from_meos(
            Some(sample_event()),
            vec![],
            vec![],
            vec![],
            competitors.clone(),
        );
        state.update_from_meos(Some(sample_event()), vec![], vec![], vec![], competitors);
        assert_eq!(state.competitors().len(), 1);
    }

    #[test]
    fn competitors_by_class_filters() {
        let state = State::new();
        let mut other = sample_competitor(2);
        other.class.id = 9;
        state.update_from_meos(
            Some(sample_event()),
            vec![],
            vec![],
            vec![],
            vec![sample_competitor(1), other],
        );

        let in_class = state.competitors_by_class(1);
        assert_eq!(in_class.len(), 1);
        assert_eq!(in_class[0].id, 1);
        assert!(state.competitor(2).is_some());
        assert!(state.competitor(3).is_none());
    }
}
