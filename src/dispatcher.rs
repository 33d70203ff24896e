//! # Dispatcher
//!
//! Turns a sync item change into job invocations. `trigger` resolves the
//! item's subscriptions through the [`EventRegistry`], runs every reached
//! event's job in order and reports each outcome.
//!
//! The registry read lock is only held while resolving; jobs run with the
//! registry handle still acquired so the snapshot stays loaded for the
//! duration of the trigger.

use crate::error::{JobError, Result};
use crate::events::{Event, EventRegistry};
use crate::item::SyncItem;
use crate::job::{DefaultRunner, JobRunner};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one job invocation.
#[derive(Debug)]
pub struct JobOutcome {
    pub listener: String,
    pub event: String,
    pub result: std::result::Result<(), JobError>,
}

/// Everything a single `trigger` call invoked.
#[derive(Debug)]
pub struct TriggerReport {
    pub item: String,
    pub outcomes: Vec<JobOutcome>,
    pub elapsed: Duration,
}

impl TriggerReport {
    /// Number of jobs invoked.
    pub fn invoked(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Fires the jobs subscribed to sync item changes.
#[derive(Clone)]
pub struct Dispatcher {
    registry: EventRegistry,
    runner: Arc<dyn JobRunner>,
}

impl Dispatcher {
    pub fn new(registry: EventRegistry) -> Self {
        Self::with_runner(registry, Arc::new(DefaultRunner))
    }

    pub fn with_runner(registry: EventRegistry, runner: Arc<dyn JobRunner>) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Run every job reachable from `item.name`. Unknown listeners and
    /// events are skipped; job failures are collected in the report.
    pub fn trigger(&self, item: &SyncItem) -> Result<TriggerReport> {
        let start = Instant::now();
        let handle = self.registry.acquire()?;
        let fired: Vec<(String, Event)> = handle.read().resolve(&item.name);

        if fired.is_empty() {
            debug!("No subscriptions for '{}'", item.name);
        }

        let mut outcomes = Vec::with_capacity(fired.len());
        for (listener, event) in fired {
            let result = self.runner.run(&event, item);
            if let Err(e) = &result {
                warn!("Event '{}' (listener '{}') failed for '{}': {}", event.name, listener, item.name, e);
            }
            outcomes.push(JobOutcome {
                listener,
                event: event.name,
                result,
            });
        }
        drop(handle);

        let report = TriggerReport {
            item: item.name.clone(),
            outcomes,
            elapsed: start.elapsed(),
        };
        info!(
            "Triggered '{}': {} job(s), {} failed in {:?}",
            report.item,
            report.invoked(),
            report.failures().count(),
            report.elapsed
        );
        Ok(report)
    }
}
