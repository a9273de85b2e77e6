//! Lazy result streams.

use std::fmt;

use crate::error::{FedError, FedResult};
use crate::instance::TypedInstance;

/// A lazily evaluated sequence of resolved instances.
///
/// The stream ends after the first error. A cancellation error ends it
/// without being surfaced, so consumers of a cancelled query simply see
/// the stream finish.
pub struct ResultStream {
    inner: Box<dyn Iterator<Item = FedResult<TypedInstance>> + Send>,
    finished: bool,
}

impl ResultStream {
    pub fn from_results<I>(results: I) -> Self
    where
        I: IntoIterator<Item = FedResult<TypedInstance>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            inner: Box::new(results.into_iter()),
            finished: false,
        }
    }

    #[must_use]
    pub fn single(instance: TypedInstance) -> Self {
        Self::from_results(std::iter::once(Ok(instance)))
    }

    #[must_use]
    pub fn failed(error: FedError) -> Self {
        Self::from_results(std::iter::once(Err(error)))
    }

    /// Drains the stream, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error the stream produced.
    pub fn collect_all(self) -> FedResult<Vec<TypedInstance>> {
        self.collect()
    }
}

impl Iterator for ResultStream {
    type Item = FedResult<TypedInstance>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.inner.next() {
            Some(Ok(instance)) => Some(Ok(instance)),
            Some(Err(e)) if e.is_cancelled() => {
                self.finished = true;
                None
            }
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl fmt::Debug for ResultStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;
    use crate::instance::DataSource;
    use crate::schema::QualifiedName;

    fn id(v: &str) -> TypedInstance {
        TypedInstance::scalar(QualifiedName::new("demo", "Id"), v, DataSource::Provided)
    }

    #[test]
    fn cancellation_ends_stream_silently() {
        let stream = ResultStream::from_results(vec![
            Ok(id("a")),
            Err(ResolutionError::Cancelled {
                query_id: "q".to_string(),
            }
            .into()),
            Ok(id("b")),
        ]);
        let items: Vec<_> = stream.collect();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());
    }

    #[test]
    fn other_errors_are_terminal() {
        let mut stream = ResultStream::from_results(vec![
            Err(FedError::internal("boom")),
            Ok(id("a")),
        ]);
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }

    #[test]
    fn collect_all_returns_values() {
        assert_eq!(ResultStream::single(id("a")).collect_all().unwrap().len(), 1);
        assert!(ResultStream::failed(FedError::internal("x")).collect_all().is_err());
    }
}
