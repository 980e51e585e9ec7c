//! Event Translator Implementation
//!
//! Translators write into a pre-allocated slot in place, so publishing an
//! event never allocates. Plain closures implement every translator trait.

/// Populates a claimed slot
///
/// # Examples
/// ```
/// use seqring::disruptor::EventTranslator;
///
/// #[derive(Default)]
/// struct Tick {
///     value: i64,
///     sequence: i64,
/// }
///
/// struct TickTranslator {
///     value: i64,
/// }
///
/// impl EventTranslator<Tick> for TickTranslator {
///     fn translate_to(&self, event: &mut Tick, sequence: i64) {
///         event.value = self.value;
///         event.sequence = sequence;
///     }
/// }
/// ```
pub trait EventTranslator<T> {
    /// Write into `event`, which will be published as `sequence`
    fn translate_to(&self, event: &mut T, sequence: i64);
}

/// Populates a claimed slot from one argument
pub trait EventTranslatorOneArg<T, A> {
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A);
}

/// Populates a claimed slot from two arguments
pub trait EventTranslatorTwoArg<T, A, B> {
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A, arg1: B);
}

impl<T, F> EventTranslator<T> for F
where
    F: Fn(&mut T, i64),
{
    fn translate_to(&self, event: &mut T, sequence: i64) {
        self(event, sequence);
    }
}

impl<T, A, F> EventTranslatorOneArg<T, A> for F
where
    F: Fn(&mut T, i64, A),
{
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A) {
        self(event, sequence, arg0);
    }
}

impl<T, A, B, F> EventTranslatorTwoArg<T, A, B> for F
where
    F: Fn(&mut T, i64, A, B),
{
    fn translate_to(&self, event: &mut T, sequence: i64, arg0: A, arg1: B) {
        self(event, sequence, arg0, arg1);
    }
}
