use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crosswind_core::prelude::ShutdownListener;

use crate::slot_pool::Slot;
use crate::ticker::Tick;

/// Bound for the private state kept in each slot, such as an HTTP client with its own connection
/// pool. A fresh value is created with [Default] for every slot when a scenario starts.
pub trait UserValuesConstraint: Default + Debug + Send + 'static {}

/// Everything an iteration function can see while it runs.
///
/// The context owns the slot for the duration of the iteration, so the slot's values are never
/// visible to any other iteration running at the same time.
pub struct IterationContext<S: UserValuesConstraint> {
    scenario_name: Arc<str>,
    tick: Tick,
    slot: Slot<S>,
    shutdown_listener: ShutdownListener,
    request_durations: Vec<Duration>,
}

impl<S: UserValuesConstraint> IterationContext<S> {
    pub(crate) fn new(
        scenario_name: Arc<str>,
        tick: Tick,
        slot: Slot<S>,
        shutdown_listener: ShutdownListener,
    ) -> Self {
        Self {
            scenario_name,
            tick,
            slot,
            shutdown_listener,
            request_durations: Vec::new(),
        }
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// The tick this iteration was started for.
    pub fn tick(&self) -> &Tick {
        &self.tick
    }

    pub fn slot_id(&self) -> usize {
        self.slot.id()
    }

    /// Listener for the run being stopped. Long iterations, for example ones with think time, can
    /// race against it to finish early.
    pub fn shutdown_listener(&mut self) -> &mut ShutdownListener {
        &mut self.shutdown_listener
    }

    pub fn get(&self) -> &S {
        self.slot.values()
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.slot.values_mut()
    }

    /// Record how long one request to the system under test took.
    ///
    /// These are aggregated apart from the iteration duration, which also covers think time.
    pub fn record_request_duration(&mut self, duration: Duration) {
        self.request_durations.push(duration);
    }

    pub(crate) fn take_request_durations(&mut self) -> Vec<Duration> {
        std::mem::take(&mut self.request_durations)
    }

    /// Discard whatever the slot holds and start again from the default values.
    pub(crate) fn reset_values(&mut self) {
        *self.slot.values_mut() = S::default();
    }

    pub(crate) fn into_slot(self) -> Slot<S> {
        self.slot
    }
}
