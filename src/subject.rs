//! Hot multicast nodes.
//!
//! A subject is both observer and observable: values pushed in are fanned
//! out to every attached subscriber. The three flavors differ only in
//! what a late subscriber is owed, so they share one core whose retention
//! policy and subscriber set live under a single lock — replay-then-attach
//! is atomic, and no emission can slip between a subscriber's replay and
//! its registration. Delivery itself happens outside that lock: the
//! subscriber set is taken out for the duration of a fan-out, so a
//! callback may unsubscribe or attach without re-entering the core.
//!
//! Terminal replay rules: after termination a publish subject hands late
//! subscribers the terminal alone; a behavior subject likewise drops its
//! latest value; a replay subject still replays its buffer first.

use std::{
  collections::VecDeque,
  mem,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
};

use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::{BoxObserver, Observer},
  rc::{MutArc, RcDeref, RcDerefMut},
  subscription::Subscription,
};

enum Retention<Item> {
  /// Publish: late subscribers owe nothing.
  None,
  /// Behavior: the latest value (seeded at construction).
  Latest(Item),
  /// Replay: the last `cap` values.
  Buffer { items: VecDeque<Item>, cap: usize },
}

impl<Item: Clone> Retention<Item> {
  fn record(&mut self, value: &Item) {
    match self {
      Retention::None => {}
      Retention::Latest(latest) => *latest = value.clone(),
      Retention::Buffer { items, cap } => {
        if *cap == 0 {
          return;
        }
        if items.len() == *cap {
          items.pop_front();
        }
        items.push_back(value.clone());
      }
    }
  }
}

enum SubjectState<Item, Err> {
  Alive { observers: Vec<Entry<Item, Err>> },
  Errored(Err),
  Completed,
}

/// One attached subscriber. `active` is shared with its
/// [`SubjectSubscription`]; a cleared flag marks the entry for pruning at
/// the next attach or fan-out.
struct Entry<Item, Err> {
  active: Arc<AtomicBool>,
  observer: BoxObserver<Item, Err>,
}

impl<Item, Err> Entry<Item, Err> {
  fn is_live(&self) -> bool { self.active.load(Ordering::Acquire) && !self.observer.is_closed() }
}

struct SubjectInner<Item, Err> {
  retention: Retention<Item>,
  state: SubjectState<Item, Err>,
  /// Values that arrived while the subscriber set was out on loan; the
  /// fan-out holding the loan drains them in order.
  pending: VecDeque<Item>,
  delivering: bool,
}

struct SubjectCore<Item, Err> {
  inner: MutArc<SubjectInner<Item, Err>>,
}

impl<Item, Err> Clone for SubjectCore<Item, Err> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<Item, Err> SubjectCore<Item, Err>
where
  Item: Clone,
  Err: Clone,
{
  fn new(retention: Retention<Item>) -> Self {
    Self {
      inner: MutArc::own(SubjectInner {
        retention,
        state: SubjectState::Alive { observers: vec![] },
        pending: VecDeque::new(),
        delivering: false,
      }),
    }
  }

  /// Replay whatever this subject owes, then attach (or terminate) the
  /// subscriber. Live replay and registration happen under the lock, so
  /// no push can slip between them; terminal replay is delivered outside
  /// it, since a terminated subject can no longer change.
  fn attach(&self, mut observer: BoxObserver<Item, Err>) -> SubjectSubscription {
    let (replay, terminal) = {
      let mut guard = self.inner.rc_deref_mut();
      let inner = &mut *guard;
      match &mut inner.state {
        SubjectState::Alive { observers } => {
          match &inner.retention {
            Retention::None => {}
            Retention::Latest(latest) => observer.next(latest.clone()),
            Retention::Buffer { items, .. } => {
              for item in items {
                observer.next(item.clone());
              }
            }
          }
          if observer.is_closed() {
            return SubjectSubscription::finished();
          }
          let active = Arc::new(AtomicBool::new(true));
          observers.retain(Entry::is_live);
          observers.push(Entry { active: active.clone(), observer });
          return SubjectSubscription { active };
        }
        SubjectState::Errored(err) => (self.buffered(&inner.retention), Err(err.clone())),
        SubjectState::Completed => (self.buffered(&inner.retention), Ok(())),
      }
    };
    for item in replay {
      observer.next(item);
    }
    match terminal {
      Ok(()) => observer.complete(),
      Err(err) => observer.error(err),
    }
    SubjectSubscription::finished()
  }

  fn buffered(&self, retention: &Retention<Item>) -> Vec<Item> {
    match retention {
      Retention::Buffer { items, .. } => items.iter().cloned().collect(),
      _ => vec![],
    }
  }

  /// Fan a value out to the current subscriber set.
  ///
  /// Retention is recorded and the subscriber set taken out under the
  /// core lock; delivery then runs outside it, so a callback may detach
  /// its own (or any other) subscription without deadlocking. A push
  /// that finds a fan-out already in progress (a reentrant push, or one
  /// from another thread) queues its value; the fan-out holding the set
  /// drains the queue in order before handing the set back.
  fn push(&self, value: Item) {
    let mut loaned = {
      let mut guard = self.inner.rc_deref_mut();
      let inner = &mut *guard;
      match &mut inner.state {
        SubjectState::Alive { observers } => {
          inner.retention.record(&value);
          if inner.delivering {
            inner.pending.push_back(value);
            return;
          }
          inner.delivering = true;
          observers.retain(Entry::is_live);
          mem::take(observers)
        }
        _ => {
          tracing::debug!(target: "rxflow::subject", "value pushed into a terminated subject");
          return;
        }
      }
    };
    let mut current = value;
    loop {
      for entry in &mut loaned {
        if entry.active.load(Ordering::Acquire) {
          entry.observer.next(current.clone());
        }
      }
      let mut guard = self.inner.rc_deref_mut();
      let inner = &mut *guard;
      match &mut inner.state {
        SubjectState::Alive { observers } => match inner.pending.pop_front() {
          Some(queued) => {
            drop(guard);
            current = queued;
          }
          None => {
            // Hand the set back, behind any subscribers attached while
            // it was out.
            inner.delivering = false;
            let late = mem::take(observers);
            loaned.retain(Entry::is_live);
            loaned.extend(late);
            *observers = loaned;
            return;
          }
        },
        // The subject terminated while the set was out; the loaned
        // observers receive that terminal here.
        SubjectState::Errored(err) => {
          let err = err.clone();
          inner.delivering = false;
          inner.pending.clear();
          drop(guard);
          for entry in loaned {
            if entry.active.load(Ordering::Acquire) {
              entry.observer.error(err.clone());
            }
          }
          return;
        }
        SubjectState::Completed => {
          inner.delivering = false;
          inner.pending.clear();
          drop(guard);
          for entry in loaned {
            if entry.active.load(Ordering::Acquire) {
              entry.observer.complete();
            }
          }
          return;
        }
      }
    }
  }

  fn terminate(&self, terminal: Result<(), Err>) {
    let observers = {
      let mut guard = self.inner.rc_deref_mut();
      let next_state = match &terminal {
        Ok(()) => SubjectState::Completed,
        Err(err) => SubjectState::Errored(err.clone()),
      };
      match mem::replace(&mut guard.state, next_state) {
        SubjectState::Alive { observers } => {
          tracing::debug!(
            target: "rxflow::subject",
            subscribers = observers.len(),
            errored = terminal.is_err(),
            "subject terminated"
          );
          observers
        }
        // Already terminated; keep the original terminal.
        prior => {
          guard.state = prior;
          return;
        }
      }
    };
    // Terminal delivery happens outside the lock; the subscriber set is
    // already detached, so late subscribers cannot interleave.
    for entry in observers {
      if !entry.active.load(Ordering::Acquire) {
        continue;
      }
      match &terminal {
        Ok(()) => entry.observer.complete(),
        Err(err) => entry.observer.error(err.clone()),
      }
    }
  }

  fn is_terminated(&self) -> bool {
    !matches!(self.inner.rc_deref().state, SubjectState::Alive { .. })
  }

  fn subscriber_count(&self) -> usize {
    match &self.inner.rc_deref().state {
      SubjectState::Alive { observers } => observers.iter().filter(|e| e.is_live()).count(),
      _ => 0,
    }
  }
}

/// Detaches one subscriber from its subject.
///
/// Unsubscribing only clears the shared flag — it never touches the
/// subject's lock, so it is safe to call from inside a delivery callback.
/// The subject prunes the entry at its next attach or fan-out.
#[derive(Clone, Debug)]
pub struct SubjectSubscription {
  active: Arc<AtomicBool>,
}

impl SubjectSubscription {
  fn finished() -> Self { Self { active: Arc::new(AtomicBool::new(false)) } }
}

impl Subscription for SubjectSubscription {
  fn unsubscribe(&mut self) { self.active.store(false, Ordering::Release); }

  fn is_closed(&self) -> bool { !self.active.load(Ordering::Acquire) }
}

macro_rules! impl_subject_traits {
  ($ty:ident) => {
    impl<Item, Err> Clone for $ty<Item, Err> {
      fn clone(&self) -> Self { Self { core: self.core.clone() } }
    }

    impl<Item, Err> ObservableExt<Item, Err> for $ty<Item, Err>
    where
      Item: Clone,
      Err: Clone,
    {
    }

    impl<Item, Err, O> Observable<Item, Err, O> for $ty<Item, Err>
    where
      Item: Clone + Send + 'static,
      Err: Clone + Send + 'static,
      O: Observer<Item, Err> + Send + 'static,
    {
      type Unsub = SubjectSubscription;

      fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
        if ctx.is_done() {
          return SubjectSubscription::finished();
        }
        self.core.attach(Box::new(observer))
      }
    }

    impl<Item, Err> Observer<Item, Err> for $ty<Item, Err>
    where
      Item: Clone,
      Err: Clone,
    {
      fn next(&mut self, value: Item) { self.core.push(value); }

      fn error(self, err: Err) { self.core.terminate(Err(err)); }

      fn complete(self) { self.core.terminate(Ok(())); }

      fn is_closed(&self) -> bool { self.core.is_terminated() }
    }
  };
}

// ============================================================================
// Publish subject
// ============================================================================

/// Plain multicast: subscribers see only values pushed after they attach.
pub struct Subject<Item, Err> {
  core: SubjectCore<Item, Err>,
}

impl<Item: Clone, Err: Clone> Subject<Item, Err> {
  pub fn new() -> Self { Self { core: SubjectCore::new(Retention::None) } }

  pub fn subscriber_count(&self) -> usize { self.core.subscriber_count() }
}

impl<Item: Clone, Err: Clone> Default for Subject<Item, Err> {
  fn default() -> Self { Self::new() }
}

impl_subject_traits!(Subject);

// ============================================================================
// Behavior subject
// ============================================================================

/// Multicast with a current value: every new subscriber immediately
/// receives the latest pushed value (or the seed), then live values.
pub struct BehaviorSubject<Item, Err> {
  core: SubjectCore<Item, Err>,
}

impl<Item: Clone, Err: Clone> BehaviorSubject<Item, Err> {
  pub fn new(initial: Item) -> Self { Self { core: SubjectCore::new(Retention::Latest(initial)) } }

  /// Snapshot of the current value.
  pub fn value(&self) -> Item {
    match &self.core.inner.rc_deref().retention {
      Retention::Latest(latest) => latest.clone(),
      _ => unreachable!("behavior subject always retains a latest value"),
    }
  }

  pub fn subscriber_count(&self) -> usize { self.core.subscriber_count() }
}

impl_subject_traits!(BehaviorSubject);

// ============================================================================
// Replay subject
// ============================================================================

/// Multicast with a bounded history: the last `buffer_size` values are
/// replayed to every new subscriber, even after termination.
pub struct ReplaySubject<Item, Err> {
  core: SubjectCore<Item, Err>,
}

impl<Item: Clone, Err: Clone> ReplaySubject<Item, Err> {
  /// Bounded history; `buffer_size` of zero behaves like [`Subject`].
  pub fn new(buffer_size: usize) -> Self {
    Self {
      core: SubjectCore::new(Retention::Buffer {
        items: VecDeque::with_capacity(buffer_size.min(64)),
        cap: buffer_size,
      }),
    }
  }

  /// Retain every value ever pushed.
  pub fn unbounded() -> Self {
    Self { core: SubjectCore::new(Retention::Buffer { items: VecDeque::new(), cap: usize::MAX }) }
  }

  pub fn subscriber_count(&self) -> usize { self.core.subscriber_count() }
}

impl_subject_traits!(ReplaySubject);

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;
  use crate::observer::ObserverAll;

  fn recording<Err>(
    log: &Arc<Mutex<Vec<String>>>,
  ) -> ObserverAll<impl FnMut(i32), impl FnOnce(Err), impl FnOnce()>
  where
    Err: std::fmt::Debug,
  {
    let next_log = log.clone();
    let err_log = log.clone();
    let done_log = log.clone();
    ObserverAll {
      next: move |v: i32| next_log.lock().unwrap().push(format!("n{v}")),
      error: move |e: Err| err_log.lock().unwrap().push(format!("e{e:?}")),
      complete: move || done_log.lock().unwrap().push("c".into()),
    }
  }

  #[test]
  fn publish_subject_skips_earlier_values() {
    let log = Arc::new(Mutex::new(vec![]));
    let mut subject = Subject::<i32, ()>::new();
    subject.next(1);
    let _sub = subject.clone().subscribe_with(recording::<()>(&log));
    subject.next(2);
    subject.clone().complete();
    assert_eq!(*log.lock().unwrap(), vec!["n2", "c"]);
  }

  #[test]
  fn unsubscribe_detaches_subscriber() {
    let log = Arc::new(Mutex::new(vec![]));
    let mut subject = Subject::<i32, ()>::new();
    let mut sub = subject.clone().subscribe_with(recording::<()>(&log));
    subject.next(1);
    sub.unsubscribe();
    assert!(sub.is_closed());
    subject.next(2);
    assert_eq!(*log.lock().unwrap(), vec!["n1"]);
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[test]
  fn subscriber_can_detach_itself_during_delivery() {
    let slot: Arc<Mutex<Option<SubjectSubscription>>> = Arc::new(Mutex::new(None));
    let log = Arc::new(Mutex::new(vec![]));
    let mut subject = Subject::<i32, ()>::new();
    let s = slot.clone();
    let l = log.clone();
    let sub = subject.clone().subscribe_with(ObserverAll {
      next: move |v: i32| {
        l.lock().unwrap().push(v);
        if let Some(mut own) = s.lock().unwrap().take() {
          own.unsubscribe();
        }
      },
      error: |_: ()| {},
      complete: || {},
    });
    *slot.lock().unwrap() = Some(sub);
    subject.next(1);
    subject.next(2);
    assert_eq!(*log.lock().unwrap(), vec![1]);
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[test]
  fn behavior_subject_replays_latest() {
    let log = Arc::new(Mutex::new(vec![]));
    let mut subject = BehaviorSubject::<i32, ()>::new(0);
    assert_eq!(subject.value(), 0);
    subject.next(5);
    let _sub = subject.clone().subscribe_with(recording::<()>(&log));
    subject.next(6);
    assert_eq!(*log.lock().unwrap(), vec!["n5", "n6"]);
    assert_eq!(subject.value(), 6);
  }

  #[test]
  fn behavior_subject_after_complete_hands_out_terminal_only() {
    let log = Arc::new(Mutex::new(vec![]));
    let mut subject = BehaviorSubject::<i32, ()>::new(0);
    subject.next(9);
    subject.clone().complete();
    let _sub = subject.clone().subscribe_with(recording::<()>(&log));
    assert_eq!(*log.lock().unwrap(), vec!["c"]);
  }

  #[test]
  fn replay_subject_keeps_a_bounded_tail() {
    let log = Arc::new(Mutex::new(vec![]));
    let mut subject = ReplaySubject::<i32, ()>::new(2);
    subject.next(1);
    subject.next(2);
    subject.next(3);
    let _sub = subject.clone().subscribe_with(recording::<()>(&log));
    assert_eq!(*log.lock().unwrap(), vec!["n2", "n3"]);
  }

  #[test]
  fn replay_subject_replays_buffer_before_terminal() {
    let log = Arc::new(Mutex::new(vec![]));
    let mut subject = ReplaySubject::<i32, &'static str>::new(2);
    subject.next(1);
    subject.next(2);
    subject.clone().error("boom");
    let _sub = subject.clone().subscribe_with(recording::<&'static str>(&log));
    assert_eq!(*log.lock().unwrap(), vec!["n1", "n2", "e\"boom\""]);
  }

  #[test]
  fn first_terminal_wins() {
    let log = Arc::new(Mutex::new(vec![]));
    let subject = Subject::<i32, &'static str>::new();
    let _sub = subject.clone().subscribe_with(recording::<&'static str>(&log));
    subject.clone().complete();
    assert!(subject.is_closed());
    subject.clone().error("late");
    assert_eq!(*log.lock().unwrap(), vec!["c"]);
  }
}
