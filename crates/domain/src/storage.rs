//! Bounded history storage for actions and events.
//!
//! Two buffer flavours share the [`Buffer`] interface:
//!
//! - [`RingBuffer`] overwrites the oldest slot in place once full. Events
//!   are kept here.
//! - [`RemovableRingBuffer`] keeps an ordered sequence, evicts from the front
//!   and can drop arbitrary elements. Actions are kept here so they can be
//!   deleted by id.
//!
//! [`HistoryStore`] puts a buffer behind a lock so it can be shared between
//! threads. Reads and writes are both guarded.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::sync::{read, write};

/// Default number of actions kept per action name.
pub const DEFAULT_ACTIONS_MAX: usize = 10_000;

/// Default number of events kept per thing.
pub const DEFAULT_EVENTS_MAX: usize = 100_000;

/// Capacity of a history store. `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub max_size: Option<NonZeroUsize>,
}

impl StorageConfig {
    /// No capacity limit.
    #[must_use]
    pub fn unbounded() -> Self {
        Self { max_size: None }
    }

    /// Keep at most `max_size` elements; zero means unbounded.
    #[must_use]
    pub fn bounded(max_size: usize) -> Self {
        Self {
            max_size: NonZeroUsize::new(max_size),
        }
    }

    /// Per-name action history default.
    #[must_use]
    pub fn actions() -> Self {
        Self::bounded(DEFAULT_ACTIONS_MAX)
    }

    /// Event history default.
    #[must_use]
    pub fn events() -> Self {
        Self::bounded(DEFAULT_EVENTS_MAX)
    }
}

/// Insertion-ordered storage with oldest-first eviction.
pub trait Buffer {
    type Item;

    fn with_config(config: StorageConfig) -> Self;

    /// Append `element`, evicting the oldest one when at capacity.
    fn add(&mut self, element: Self::Item);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at position `index`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfRange`] when `index >= len()`.
    fn get(&self, index: usize) -> Result<&Self::Item, StorageError>;

    /// Elements oldest first.
    fn iter(&self) -> impl Iterator<Item = &Self::Item>;
}

/// Fixed-slot circular buffer.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: Option<NonZeroUsize>,
    start: usize,
}

impl<T> Buffer for RingBuffer<T> {
    type Item = T;

    fn with_config(config: StorageConfig) -> Self {
        Self {
            slots: Vec::new(),
            capacity: config.max_size,
            start: 0,
        }
    }

    fn add(&mut self, element: T) {
        match self.capacity {
            Some(cap) if self.slots.len() == cap.get() => {
                self.slots[self.start] = element;
                self.start = (self.start + 1) % cap.get();
            }
            _ => self.slots.push(element),
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn get(&self, index: usize) -> Result<&T, StorageError> {
        let len = self.slots.len();
        if index >= len {
            return Err(StorageError::IndexOutOfRange { index, len });
        }
        let position = match self.capacity {
            Some(cap) => (self.start + index) % cap.get(),
            None => index,
        };
        self.slots
            .get(position)
            .ok_or(StorageError::IndexOutOfRange { index, len })
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots[self.start..]
            .iter()
            .chain(self.slots[..self.start].iter())
    }
}

/// Ordered buffer supporting removal of arbitrary elements.
#[derive(Debug, Clone)]
pub struct RemovableRingBuffer<T> {
    elements: VecDeque<T>,
    capacity: Option<NonZeroUsize>,
}

impl<T> RemovableRingBuffer<T> {
    /// Drop every element matching `predicate`, keeping the order of the
    /// rest. Returns how many were removed.
    pub fn remove_if(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.elements.len();
        self.elements.retain(|element| !predicate(element));
        before - self.elements.len()
    }
}

impl<T> Buffer for RemovableRingBuffer<T> {
    type Item = T;

    fn with_config(config: StorageConfig) -> Self {
        Self {
            elements: VecDeque::new(),
            capacity: config.max_size,
        }
    }

    fn add(&mut self, element: T) {
        self.elements.push_back(element);
        if let Some(cap) = self.capacity
            && self.elements.len() > cap.get()
        {
            self.elements.pop_front();
        }
    }

    fn len(&self) -> usize {
        self.elements.len()
    }

    fn get(&self, index: usize) -> Result<&T, StorageError> {
        self.elements.get(index).ok_or(StorageError::IndexOutOfRange {
            index,
            len: self.elements.len(),
        })
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }
}

/// A buffer shared between threads.
#[derive(Debug)]
pub struct HistoryStore<B> {
    config: StorageConfig,
    buffer: RwLock<B>,
}

impl<B> HistoryStore<B>
where
    B: Buffer,
    B::Item: Clone,
{
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            buffer: RwLock::new(B::with_config(config)),
        }
    }

    #[must_use]
    pub fn config(&self) -> StorageConfig {
        self.config
    }

    pub fn add(&self, element: B::Item) {
        write(&self.buffer).add(element);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.buffer).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.buffer).is_empty()
    }

    /// Element at position `index`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexOutOfRange`] when `index` is past the end.
    pub fn get(&self, index: usize) -> Result<B::Item, StorageError> {
        read(&self.buffer).get(index).cloned()
    }

    /// Copy of all elements, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<B::Item> {
        read(&self.buffer).iter().cloned().collect()
    }

    /// First element matching `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&B::Item) -> bool) -> Option<B::Item> {
        read(&self.buffer)
            .iter()
            .find(|element| predicate(element))
            .cloned()
    }
}

impl<T: Clone> HistoryStore<RemovableRingBuffer<T>> {
    /// Drop every element matching `predicate`. Returns how many were removed.
    pub fn remove_if(&self, predicate: impl FnMut(&T) -> bool) -> usize {
        write(&self.buffer).remove_if(predicate)
    }
}
