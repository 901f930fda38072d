use tokio::sync::broadcast::{self, error::TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}

/// Cooperative cancellation token fed by a [`Signal`] broadcast.
///
/// Once a signal has been seen (or every sender is gone) the token stays
/// tripped, so it can be polled at several points of a loop.
#[derive(Debug)]
pub struct Shutdown {
    receiver: broadcast::Receiver<Signal>,
    requested: bool,
}

impl Shutdown {
    pub const fn new(receiver: broadcast::Receiver<Signal>) -> Self {
        Self {
            receiver,
            requested: false,
        }
    }

    /// A token with its own sender, for callers that stop through the sender
    pub fn channel() -> (broadcast::Sender<Signal>, Self) {
        let (sender, receiver) = broadcast::channel(8);
        (sender, Self::new(receiver))
    }

    /// Non-blocking check
    pub fn is_requested(&mut self) -> bool {
        if !self.requested {
            match self.receiver.try_recv() {
                Ok(_) | Err(TryRecvError::Closed | TryRecvError::Lagged(_)) => {
                    self.requested = true;
                }
                Err(TryRecvError::Empty) => {}
            }
        }

        self.requested
    }

    /// Wait until shutdown is requested
    pub async fn requested(&mut self) {
        if !self.requested {
            let _ = self.receiver.recv().await;
            self.requested = true;
        }
    }
}
