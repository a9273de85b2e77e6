use std::time::Duration;

use crossbeam_channel::{select, Receiver, RecvTimeoutError};

use crate::context::CancellationToken;
use crate::error::FedResult;

use super::ProjectedItem;

/// Projected items in completion order.
///
/// The stream ends without an error when the query is cancelled, and ends
/// after yielding the first error it receives.
#[derive(Debug)]
pub struct ProjectionStream {
    rx: Receiver<FedResult<ProjectedItem>>,
    cancellation: CancellationToken,
    finished: bool,
}

impl ProjectionStream {
    pub(crate) const fn new(rx: Receiver<FedResult<ProjectedItem>>, cancellation: CancellationToken) -> Self {
        Self {
            rx,
            cancellation,
            finished: false,
        }
    }

    /// Waits up to `timeout` for the next item.
    ///
    /// Returns `None` when the stream has ended or nothing arrived in time;
    /// use [`ProjectionStream::is_finished`] to tell the two apart.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<FedResult<ProjectedItem>> {
        if self.finished || self.cancellation.is_cancelled() {
            self.finished = true;
            return None;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => self.accept(msg),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                None
            }
        }
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Drains the stream, failing on the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error the projection produced.
    pub fn collect_items(self) -> FedResult<Vec<ProjectedItem>> {
        self.collect()
    }

    fn accept(&mut self, msg: FedResult<ProjectedItem>) -> Option<FedResult<ProjectedItem>> {
        match msg {
            Ok(item) => Some(Ok(item)),
            Err(e) => {
                self.finished = true;
                if e.is_cancelled() {
                    None
                } else {
                    Some(Err(e))
                }
            }
        }
    }
}

impl Iterator for ProjectionStream {
    type Item = FedResult<ProjectedItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancellation.is_cancelled() {
            self.finished = true;
            return None;
        }
        select! {
            recv(self.rx) -> msg => match msg {
                Ok(msg) => self.accept(msg),
                Err(_) => {
                    self.finished = true;
                    None
                }
            },
            recv(self.cancellation.signal()) -> _ => {
                self.finished = true;
                None
            }
        }
    }
}
