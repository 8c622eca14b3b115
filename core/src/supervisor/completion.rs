//! Single-shot, multi-waiter completion signal

use tokio::sync::watch;

/// Resolves exactly once with the final exit code of a process.
///
/// The slot starts as `None`; the first [`complete`](Self::complete) stores
/// `Some(code)` and wakes every waiter. Later calls leave the slot untouched
/// and return `false`. The compare and store run under the channel's own
/// lock, so concurrent completers cannot both win.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<Option<Option<i32>>>,
}

impl CompletionSignal {
    /// Create an unfired signal
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Fire the signal with `exit_code`. Returns `true` only for the call
    /// that actually fired it.
    pub fn complete(&self, exit_code: Option<i32>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(exit_code);
            true
        })
    }

    /// Whether the signal has fired
    pub fn is_completed(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The fired value, if any
    fn value(&self) -> Option<Option<i32>> {
        *self.tx.borrow()
    }

    /// Wait until the signal fires and return the exit code it carried
    pub async fn wait(&self) -> Option<i32> {
        let mut rx = self.tx.subscribe();
        let fired = rx.wait_for(Option::is_some).await.map(|slot| *slot);
        match fired {
            Ok(slot) => slot.flatten(),
            // Unreachable while `self` holds the sender
            Err(_) => self.value().flatten(),
        }
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
