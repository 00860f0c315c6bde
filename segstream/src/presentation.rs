//! Presentation element contract
//!
//! The presentation element renders what the sinks decode. The engine only
//! needs to create sinks through it, start and pause playback, read the
//! current position and detach it on stop. `play` and `detach` complete
//! asynchronously, so both hand back a handle the engine awaits.

use segstream_core::{ContentKind, SegstreamError};
use segstream_media::{MediaSink, SinkNotifier};
use tokio::sync::oneshot;

/// A rendering target that owns the per-track sinks
pub trait Presentation: Send {
    /// Prepare a fresh sink collection for a new session
    fn attach(&mut self) -> Result<(), SegstreamError> {
        Ok(())
    }

    /// Create the sink for one declared stream. The sink must report
    /// completion through `notifier`.
    fn add_sink(
        &mut self,
        kind: ContentKind,
        notifier: SinkNotifier,
    ) -> Result<Box<dyn MediaSink>, SegstreamError>;

    /// Start or resume rendering
    fn play(&mut self) -> PlayHandle;

    /// Pause rendering
    fn pause(&mut self);

    /// Current position as a UTC timestamp in seconds, if known
    fn current_position(&self) -> Option<f64>;

    /// Signal that no more data will be appended
    fn end_of_stream(&mut self) -> Result<(), SegstreamError> {
        Ok(())
    }

    /// Detach the sink collection; the handle resolves once the element is emptied
    fn detach(&mut self) -> EmptiedHandle;
}

/// Pending result of a `play` request
#[derive(Debug)]
pub struct PlayHandle {
    rx: Option<oneshot::Receiver<Result<(), String>>>,
}

/// Completes a [`PlayHandle`]
#[derive(Debug)]
pub struct PlayCompleter {
    tx: oneshot::Sender<Result<(), String>>,
}

impl PlayHandle {
    /// A handle that is already settled
    pub fn resolved() -> Self {
        Self { rx: None }
    }

    /// A handle settled later through the returned completer
    pub fn pending() -> (Self, PlayCompleter) {
        let (tx, rx) = oneshot::channel();
        (Self { rx: Some(rx) }, PlayCompleter { tx })
    }

    /// Wait until the play request resolves or is rejected.
    ///
    /// A completer dropped without an answer counts as resolved.
    pub async fn settle(self) -> Result<(), SegstreamError> {
        match self.rx {
            None => Ok(()),
            Some(rx) => match rx.await {
                Ok(Ok(())) | Err(_) => Ok(()),
                Ok(Err(reason)) => Err(SegstreamError::Presentation { reason }),
            },
        }
    }
}

impl PlayCompleter {
    /// Report that playback started
    pub fn resolve(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Report that the play request was rejected
    pub fn reject(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(reason.into()));
    }
}

/// Resolves once a detached presentation reports it is empty
#[derive(Debug)]
pub struct EmptiedHandle {
    rx: Option<oneshot::Receiver<()>>,
}

/// Completes an [`EmptiedHandle`]
#[derive(Debug)]
pub struct EmptiedNotifier {
    tx: oneshot::Sender<()>,
}

impl EmptiedHandle {
    /// Already emptied
    pub fn ready() -> Self {
        Self { rx: None }
    }

    /// Emptied later through the returned notifier
    pub fn pending() -> (Self, EmptiedNotifier) {
        let (tx, rx) = oneshot::channel();
        (Self { rx: Some(rx) }, EmptiedNotifier { tx })
    }

    /// Wait for the emptied notification
    pub async fn wait(self) {
        if let Some(rx) = self.rx {
            let _ = rx.await;
        }
    }
}

impl EmptiedNotifier {
    /// Report that the element is empty
    pub fn notify(self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_play_handle_outcomes() {
        assert!(PlayHandle::resolved().settle().await.is_ok());

        let (handle, completer) = PlayHandle::pending();
        completer.reject("autoplay blocked");
        let err = handle.settle().await.unwrap_err();
        assert_eq!(err.error_code(), "PRESENTATION_ERROR");

        let (handle, completer) = PlayHandle::pending();
        drop(completer);
        assert!(handle.settle().await.is_ok());
    }

    #[tokio::test]
    async fn test_emptied_handle_waits_for_notifier() {
        let (handle, notifier) = EmptiedHandle::pending();
        let waiter = tokio::spawn(handle.wait());
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        notifier.notify();
        waiter.await.unwrap();
    }
}
