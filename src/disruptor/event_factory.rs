//! Event Factory Implementation
//!
//! Factories pre-populate every ring buffer slot once, at construction.
//! Afterwards slots are only ever mutated in place.

/// Factory for creating events in the ring buffer
///
/// Called exactly `buffer_size` times, when the ring buffer is created.
///
/// # Examples
/// ```
/// use seqring::disruptor::EventFactory;
///
/// struct Quote {
///     price: i64,
/// }
///
/// struct QuoteFactory;
///
/// impl EventFactory<Quote> for QuoteFactory {
///     fn new_instance(&self) -> Quote {
///         Quote { price: 0 }
///     }
/// }
/// ```
pub trait EventFactory<T>: Send + Sync {
    /// Create a new event instance in its initial state
    fn new_instance(&self) -> T;
}

/// Event factory that uses the `Default` trait
pub struct DefaultEventFactory<T: Default> {
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T: Default> DefaultEventFactory<T> {
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: Default> Default for DefaultEventFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> EventFactory<T> for DefaultEventFactory<T> {
    fn new_instance(&self) -> T {
        T::default()
    }
}

/// Event factory that uses a closure to create events
pub struct ClosureEventFactory<F> {
    factory_fn: F,
}

impl<F> ClosureEventFactory<F> {
    pub fn new(factory_fn: F) -> Self {
        Self { factory_fn }
    }
}

impl<T, F> EventFactory<T> for ClosureEventFactory<F>
where
    F: Fn() -> T + Send + Sync,
{
    fn new_instance(&self) -> T {
        (self.factory_fn)()
    }
}
