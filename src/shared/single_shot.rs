//! Usage: Deliver-at-most-once handoff between many producers and one waiting consumer.

use crate::shared::mutex_ext::MutexExt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Producer side. Any number of clones may call [`SingleShot::deliver`]; only the first
/// value reaches the receiver, later calls are dropped without blocking.
#[derive(Debug)]
pub(crate) struct SingleShot<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

pub(crate) fn single_shot<T>() -> (Arc<SingleShot<T>>, oneshot::Receiver<T>) {
    let (tx, rx) = oneshot::channel();
    let shot = SingleShot {
        sender: Mutex::new(Some(tx)),
    };
    (Arc::new(shot), rx)
}

impl<T> SingleShot<T> {
    /// Returns true when this call delivered the value.
    pub(crate) fn deliver(&self, value: T) -> bool {
        // Only the take happens under the lock; the send itself never waits.
        let sender = self.sender.lock_or_recover().take();
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}
