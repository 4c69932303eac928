//! Thread-boundary plumbing shared by `observe_on` and `subscribe_on`.
//!
//! A boundary is a bounded queue of [`Notification`]s plus one dedicated
//! consumer thread that drains it in FIFO order. The producer side is an
//! ordinary observer ([`QueueSender`]) whose `next` blocks while the
//! queue is full; that blocking send is the engine's only backpressure
//! mechanism. Unsubscribing raises a stop flag: the consumer exits at the
//! next dequeue, the receiver drops, and a producer parked on a full
//! queue unblocks through the resulting send error.

use std::{
  sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{sync_channel, Receiver, SyncSender},
    Arc,
  },
  thread,
};

use crate::{
  emission::{Deliver, Notification},
  observer::Observer,
};

/// Producer endpoint of a boundary queue.
pub(crate) struct QueueSender<Item, Err> {
  sender: SyncSender<Notification<Item, Err>>,
  stop: Arc<AtomicBool>,
}

impl<Item, Err> Clone for QueueSender<Item, Err> {
  fn clone(&self) -> Self { Self { sender: self.sender.clone(), stop: self.stop.clone() } }
}

impl<Item, Err> QueueSender<Item, Err> {
  fn send(&self, notification: Notification<Item, Err>) {
    // A send error means the consumer is gone; nothing left to deliver to.
    let _ = self.sender.send(notification);
  }
}

impl<Item, Err> Observer<Item, Err> for QueueSender<Item, Err> {
  fn next(&mut self, value: Item) { self.send(Notification::Next(value)); }

  fn error(self, err: Err) { self.send(Notification::Err(err)); }

  fn complete(self) { self.send(Notification::Complete); }

  fn is_closed(&self) -> bool { self.stop.load(Ordering::Acquire) }
}

pub(crate) struct Boundary<Item, Err> {
  pub sender: QueueSender<Item, Err>,
  pub receiver: Receiver<Notification<Item, Err>>,
  pub stop: Arc<AtomicBool>,
}

/// Open a boundary queue holding at most `buffer_size` notifications.
///
/// `buffer_size` is clamped to at least one slot; a zero-capacity
/// rendezvous queue would make every emission a blocking handoff.
pub(crate) fn boundary<Item, Err>(buffer_size: usize) -> Boundary<Item, Err> {
  let (sender, receiver) = sync_channel(buffer_size.max(1));
  let stop = Arc::new(AtomicBool::new(false));
  Boundary { sender: QueueSender { sender, stop: stop.clone() }, receiver, stop }
}

/// Spawn the boundary's consumer thread.
///
/// The thread drains the queue into `deliver` until a terminal
/// notification, a raised stop flag, or producer disconnect. The handle
/// is detached by callers; thread shutdown is driven entirely by the
/// queue.
pub(crate) fn spawn_consumer<Item, Err, D>(
  receiver: Receiver<Notification<Item, Err>>, mut deliver: D, stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()>
where
  Item: Send + 'static,
  Err: Send + 'static,
  D: Deliver<Item, Err> + Send + 'static,
{
  thread::Builder::new()
    .name("rxflow-boundary".into())
    .spawn(move || {
      tracing::trace!(target: "rxflow::scheduler", "boundary consumer started");
      while let Ok(notification) = receiver.recv() {
        if stop.load(Ordering::Acquire) {
          break;
        }
        let terminal = notification.is_terminal();
        deliver.deliver(notification);
        if terminal {
          break;
        }
      }
      tracing::trace!(target: "rxflow::scheduler", "boundary consumer exiting");
    })
    .expect("spawn boundary consumer thread")
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::emission::SafeObserver;

  struct Collect {
    values: Arc<Mutex<Vec<i32>>>,
    terminals: Arc<Mutex<usize>>,
  }

  impl Observer<i32, &'static str> for Collect {
    fn next(&mut self, value: i32) { self.values.lock().unwrap().push(value); }
    fn error(self, _: &'static str) { *self.terminals.lock().unwrap() += 1; }
    fn complete(self) { *self.terminals.lock().unwrap() += 1; }
    fn is_closed(&self) -> bool { false }
  }

  #[test]
  fn boundary_preserves_order_and_terminates() {
    let values = Arc::new(Mutex::new(vec![]));
    let terminals = Arc::new(Mutex::new(0));
    let Boundary { mut sender, receiver, stop } = boundary::<i32, &'static str>(2);
    let deliver =
      SafeObserver::new(Collect { values: values.clone(), terminals: terminals.clone() });
    let consumer = spawn_consumer(receiver, deliver, stop);

    for i in 0..100 {
      sender.next(i);
    }
    sender.complete();
    consumer.join().unwrap();

    assert_eq!(*values.lock().unwrap(), (0..100).collect::<Vec<_>>());
    assert_eq!(*terminals.lock().unwrap(), 1);
  }

  #[test]
  fn stop_flag_halts_delivery_and_unblocks_producer() {
    let values = Arc::new(Mutex::new(vec![]));
    let terminals = Arc::new(Mutex::new(0));
    let Boundary { mut sender, receiver, stop } = boundary::<i32, &'static str>(1);
    let deliver =
      SafeObserver::new(Collect { values: values.clone(), terminals: terminals.clone() });
    let consumer = spawn_consumer(receiver, deliver, stop.clone());

    stop.store(true, Ordering::Release);
    // The consumer exits on the next dequeue; afterwards sends fail
    // instead of blocking, so a producer facing a full queue moves on.
    for i in 0..1000 {
      sender.next(i);
    }
    consumer.join().unwrap();
    assert_eq!(*terminals.lock().unwrap(), 0);
  }
}
