//! Value: the observed cell backing a property.
//!
//! A [`Value`] caches the last known state of something (a lamp's on/off
//! state, a sensor reading). Writes coming from clients go through
//! [`Value::set`], which first hands the new value to the optional
//! forwarder (typically the code that drives the hardware) and then updates
//! the cache. State changes observed from the device side go through
//! [`Value::notify_of_external_update`], which only updates the cache.
//!
//! Observers fire only when the cached value actually changes. Updates are
//! serialized per value, so observers see changes in the order they were
//! applied. An observer may write back into the value it observes: the
//! cache is updated at once and the new value is delivered to every
//! observer after the current one.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, RwLock};

use parking_lot::ReentrantMutex;

use crate::sync::{read, write};

/// Callback applied to every value written through [`Value::set`].
pub type ValueForwarder<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Callback invoked after the cached value changed.
pub type ValueObserver<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`Value::add_observer`], used to remove the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Delivery state of the thread holding the update lock.
struct Delivery<T> {
    active: bool,
    queued: VecDeque<T>,
}

/// Ends a delivery even when an observer panics.
struct DeliveryGuard<'a, T>(&'a RefCell<Delivery<T>>);

impl<T> Drop for DeliveryGuard<'_, T> {
    fn drop(&mut self) {
        let mut delivery = self.0.borrow_mut();
        delivery.active = false;
        delivery.queued.clear();
    }
}

struct Observers<T> {
    next_id: u64,
    entries: Vec<(ObserverId, ValueObserver<T>)>,
}

/// A single observed mutable cell.
pub struct Value<T> {
    last_value: RwLock<Option<T>>,
    forwarder: Option<ValueForwarder<T>>,
    observers: RwLock<Observers<T>>,
    update: ReentrantMutex<RefCell<Delivery<T>>>,
}

impl<T> Value<T>
where
    T: Clone + PartialEq + Send + Sync,
{
    /// A value with a known initial state and no forwarder.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self::build(Some(initial), None)
    }

    /// A value whose state is not known yet.
    #[must_use]
    pub fn unknown() -> Self {
        Self::build(None, None)
    }

    /// A value that forwards client writes to `forwarder` before caching them.
    #[must_use]
    pub fn with_forwarder(
        initial: Option<T>,
        forwarder: impl Fn(&T) + Send + Sync + 'static,
    ) -> Self {
        Self::build(initial, Some(Box::new(forwarder)))
    }

    fn build(initial: Option<T>, forwarder: Option<ValueForwarder<T>>) -> Self {
        Self {
            last_value: RwLock::new(initial),
            forwarder,
            observers: RwLock::new(Observers {
                next_id: 0,
                entries: Vec::new(),
            }),
            update: ReentrantMutex::new(RefCell::new(Delivery {
                active: false,
                queued: VecDeque::new(),
            })),
        }
    }

    /// The cached value, `None` while unknown.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        read(&self.last_value).clone()
    }

    /// Forward `value`, then cache it and notify observers on change.
    pub fn set(&self, value: T) {
        if let Some(forwarder) = &self.forwarder {
            forwarder(&value);
        }
        self.notify_of_external_update(value);
    }

    /// Cache `value` and notify observers on change, without forwarding.
    pub fn notify_of_external_update(&self, value: T) {
        // reentrant: an observer on this thread may write again
        let serialized = self.update.lock();
        {
            let mut last = write(&self.last_value);
            if last.as_ref() == Some(&value) {
                return;
            }
            *last = Some(value.clone());
        }
        {
            let mut delivery = serialized.borrow_mut();
            if delivery.active {
                delivery.queued.push_back(value);
                return;
            }
            delivery.active = true;
        }
        let _delivery = DeliveryGuard(&*serialized);
        let mut next = Some(value);
        while let Some(current) = next {
            let observers: Vec<ValueObserver<T>> = read(&self.observers)
                .entries
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect();
            for observer in observers {
                observer(&current);
            }
            next = serialized.borrow_mut().queued.pop_front();
        }
    }

    /// Register a change observer.
    pub fn add_observer(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> ObserverId {
        let mut observers = write(&self.observers);
        let id = ObserverId(observers.next_id);
        observers.next_id += 1;
        observers.entries.push((id, Arc::new(observer)));
        id
    }

    /// Unregister an observer. Returns `false` when it was already gone.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = write(&self.observers);
        let before = observers.entries.len();
        observers.entries.retain(|(entry, _)| *entry != id);
        observers.entries.len() != before
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        read(&self.observers).entries.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("last_value", &*read(&self.last_value))
            .field("forwarded", &self.forwarder.is_some())
            .finish_non_exhaustive()
    }
}
