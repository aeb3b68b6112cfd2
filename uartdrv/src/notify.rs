use dataport::{DataportError, Notification};

/// The "data available" signal towards the consumer.
///
/// Signals are at-least-once and idempotent: raising one twice before the
/// consumer runs must be indistinguishable from raising it once.
pub trait Notify {
    fn notify(&self) -> Result<(), DataportError>;
}

impl Notify for Notification {
    fn notify(&self) -> Result<(), DataportError> {
        Notification::notify(self)
    }
}

impl<N: Notify + ?Sized> Notify for &N {
    fn notify(&self) -> Result<(), DataportError> {
        (**self).notify()
    }
}
