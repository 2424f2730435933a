//! Escalation path for engine-class failures.

/// Escalate a non-recoverable engine fault, e.g. a lost partition worker or
/// corrupt persisted state. Faults of this class must reach the operator
/// unambiguously instead of being folded into a query or ingest outcome.
pub trait BillingFatal<T, E>: Sized + sealed::Sealed {
    /// Abort the computation as gracefully as possible due to a fatal
    /// non-recoverable error.
    fn billing_fatal(self) -> T;
}

impl<T, E> BillingFatal<T, E> for Result<T, E>
where
    E: std::fmt::Debug + std::error::Error + Send + Sync + 'static,
{
    fn billing_fatal(self) -> T {
        match self {
            Ok(x) => x,
            Err(e) => {
                let report = eyre::Report::new(e);
                panic!("{report:?}")
            }
        }
    }
}

mod sealed {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}
