//! Process-wide stream registry: `(app, stream)` to the live publisher.
//!
//! The runtime's session set holds the strong `Rc`s; the registry keeps
//! weak references only, so a closed session disappears from lookups once
//! the runtime drops it. All calls happen on the runtime thread.


use crate::media::{MediaPublisher, MediaSubscriber};
use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Default)]
pub struct StreamRegistry {
    streams: HashMap<(String, String), Weak<RefCell<dyn MediaPublisher>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        StreamRegistry::default()
    }

    /// Upsert the publisher for `(app, stream)`; the last writer wins.
    pub fn register_stream(
        &mut self,
        app: &str,
        stream: &str,
        publisher: Weak<RefCell<dyn MediaPublisher>>,
    ) {
        info!("register stream {}/{}", app, stream);
        self.streams
            .insert((app.to_owned(), stream.to_owned()), publisher);
    }

    pub fn media_publisher_by_app_stream(
        &self,
        app: &str,
        stream: &str,
    ) -> Option<Rc<RefCell<dyn MediaPublisher>>> {
        self.streams
            .get(&(app.to_owned(), stream.to_owned()))
            .and_then(Weak::upgrade)
    }

    /// Attach a subscriber to a publisher; the publisher keeps one entry
    /// per subscriber no matter how often this is called.
    pub fn add_subscriber(
        &mut self,
        publisher: &Rc<RefCell<dyn MediaPublisher>>,
        subscriber: Weak<RefCell<dyn MediaSubscriber>>,
    ) {
        publisher.borrow_mut().add_subscriber(subscriber);
    }

    /// Any live publisher, kept for development against unsignaled streams.
    pub fn debug_random_media_publisher(
        &self,
    ) -> Option<(String, String, Rc<RefCell<dyn MediaPublisher>>)> {
        self.streams.iter().find_map(|((app, stream), publisher)| {
            publisher
                .upgrade()
                .map(|p| (app.clone(), stream.clone(), p))
        })
    }

    /// Drop entries whose publisher is gone.
    pub fn prune(&mut self) {
        self.streams.retain(|(app, stream), publisher| {
            let alive = publisher.upgrade().is_some();
            if !alive {
                debug!("prune dead stream {}/{}", app, stream);
            }
            alive
        });
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
