//! A value published by one thread and read lock-free by others.

use std::sync::Arc;

use arc_swap::ArcSwap;

/// A thread-safe, reference-counted slot holding the latest published value.
///
/// `MtResource` wraps an `Arc<ArcSwap<T>>`. Publishing a new value is a single atomic
/// pointer swap with release ordering and reading takes a matching acquire load, so a
/// reader always sees a fully built value and never blocks the writer. Values are
/// replaced wholesale, never mutated in place: readers keep whatever `Arc<T>` they
/// loaded for as long as they like.
///
/// # Type Parameters
/// - `T`: The type of the published value
///
/// # Examples
///
/// ## Sharing Between Threads
/// ```
/// # use std::{sync::Arc, thread};
/// use hashlife_voxels::core::MtResource;
///
/// let latest = MtResource::new(String::from("first"));
/// let reader = latest.clone();
///
/// latest.set(Arc::new(String::from("second")));
///
/// let handle = thread::spawn(move || reader.get().len());
/// assert_eq!(handle.join().unwrap(), 6);
/// ```
///
/// # Performance Considerations
/// - Reads are wait-free in the common case
/// - Old values are freed when the last reader holding them drops its `Arc`
pub struct MtResource<T> {
    /// The shared slot. Clones of the `MtResource` point at the same one.
    pub resource: Arc<ArcSwap<T>>,
}

impl<T> MtResource<T> {
    /// Creates a new `MtResource` publishing the given value.
    pub fn new(resource: T) -> Self {
        Self::from_arc(Arc::new(resource))
    }

    /// Creates a new `MtResource` publishing an already shared value.
    pub fn from_arc(resource: Arc<T>) -> Self {
        Self {
            resource: Arc::new(ArcSwap::new(resource)),
        }
    }

    /// Returns the most recently published value.
    pub fn get(&self) -> Arc<T> {
        self.resource.load_full()
    }

    /// Publishes a new value, replacing the previous one.
    pub fn set(&self, resource: Arc<T>) {
        self.resource.store(resource);
    }
}

impl<T> Clone for MtResource<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
        }
    }
}
