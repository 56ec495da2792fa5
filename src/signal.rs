//! Named publish/subscribe signals.
//!
//! A [`Signals`] table maps a signal name to the ordered list of handlers
//! connected to it.  [`emit`](Signals::emit) calls them synchronously, in
//! connection order, on the emitting thread.  There are no wildcards and no
//! priorities.
//!
//! Handlers receive the event and a read-only context (usually the state the
//! event refers to), so a subscriber can inspect the emitter's state without
//! holding a reference to the emitter itself.

use std::collections::HashMap;
use std::fmt;

type Handler<E, C> = Box<dyn FnMut(&E, &C)>;

pub struct Signals<E, C = ()> {
    handlers: HashMap<String, Vec<Handler<E, C>>>,
}

impl<E, C> Default for Signals<E, C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<E, C> fmt::Debug for Signals<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, handlers) in &self.handlers {
            map.entry(name, &handlers.len());
        }
        map.finish()
    }
}

impl<E, C> Signals<E, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the subscribers of `signal`.
    pub fn connect<F>(&mut self, signal: &str, handler: F)
    where
        F: FnMut(&E, &C) + 'static,
    {
        self.handlers
            .entry(signal.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Call every handler of `signal`; returns how many were called.
    pub fn emit(&mut self, signal: &str, event: &E, context: &C) -> usize {
        match self.handlers.get_mut(signal) {
            Some(handlers) => {
                for handler in handlers.iter_mut() {
                    handler(event, context);
                }
                handlers.len()
            }
            None => 0,
        }
    }

    pub fn handler_count(&self, signal: &str) -> usize {
        self.handlers.get(signal).map_or(0, Vec::len)
    }
}
