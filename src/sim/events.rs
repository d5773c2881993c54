//! Simulation notifications
//!
//! Observers receive events by reference and have no access to body state,
//! so a notification can't invalidate a solve in progress.

use std::cell::RefCell;
use std::rc::Rc;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::body::BodyId;

/// Something observable happened in the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    BodyAdded {
        id: BodyId,
        name: String,
    },
    BodyRemoved {
        id: BodyId,
    },
    /// An impulse was applied at a collision
    Collision {
        time: f64,
        primary: BodyId,
        normal_body: Option<BodyId>,
        impulse: f64,
        point: DVec2,
    },
    /// A resolve finished
    CollisionsResolved {
        time: f64,
        count: usize,
        passes: usize,
    },
    /// The advancer gave up
    Stuck {
        time: f64,
    },
}

/// Receiver of simulation events
pub trait SimObserver {
    fn notify(&mut self, event: &SimEvent);
}

/// Observer that records every event; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<SimEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl SimObserver for EventLog {
    fn notify(&mut self, event: &SimEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_log() {
        let log = EventLog::new();
        let mut observer = log.clone();
        observer.notify(&SimEvent::BodyRemoved { id: BodyId(4) });
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0], SimEvent::BodyRemoved { id: BodyId(4) });
        log.clear();
        assert!(observer.is_empty());
    }
}
