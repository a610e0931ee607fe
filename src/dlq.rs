use crate::domain::{DeadLetterQueue, Error};

#[derive(Default, Debug)]
pub struct TracingDlq {}

impl DeadLetterQueue for TracingDlq {
    fn report(&self, error: &Error) {
        tracing::warn!(retryable = error.is_retryable(), "dead letter: {}", error);
    }
}
