//! End-to-end chains across threads, boundaries and sharing.

use std::{
  sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc, Mutex,
  },
  thread,
  time::{Duration, Instant},
};

use rxflow::prelude::*;

fn collect_into(
  values: Arc<Mutex<Vec<i32>>>, done: mpsc::Sender<()>,
) -> ObserverAll<impl FnMut(i32), impl FnOnce(()), impl FnOnce()> {
  ObserverAll {
    next: move |v: i32| values.lock().unwrap().push(v),
    error: |_: ()| {},
    complete: move || {
      let _ = done.send(());
    },
  }
}

#[test]
fn observe_on_preserves_fifo_order() {
  let values = Arc::new(Mutex::new(vec![]));
  let (done_tx, done_rx) = mpsc::channel();

  from_iter(0..500)
    .observe_on(16)
    .subscribe_with(collect_into(values.clone(), done_tx));

  done_rx.recv_timeout(Duration::from_secs(5)).expect("chain completes");
  assert_eq!(*values.lock().unwrap(), (0..500).collect::<Vec<_>>());
}

#[test]
fn observe_on_backpressure_caps_the_producer_lead() {
  const BUFFER: usize = 2;
  let produced = Arc::new(AtomicUsize::new(0));
  let consumed = Arc::new(AtomicUsize::new(0));
  let max_lead = Arc::new(AtomicUsize::new(0));
  let (done_tx, done_rx) = mpsc::channel();

  let p = produced.clone();
  let source = create(move |e: &mut dyn Emitter<i32, ()>| {
    for i in 0..100 {
      e.next(i);
      p.fetch_add(1, Ordering::SeqCst);
    }
    e.complete();
  });

  let c = consumed.clone();
  let p = produced.clone();
  let lead = max_lead.clone();
  source.observe_on(BUFFER).subscribe_with(ObserverAll {
    next: move |_: i32| {
      // Slow consumer: the producer must stall on the full queue instead
      // of running arbitrarily far ahead.
      thread::sleep(Duration::from_millis(1));
      let seen = c.fetch_add(1, Ordering::SeqCst) + 1;
      let ahead = p.load(Ordering::SeqCst).saturating_sub(seen);
      lead.fetch_max(ahead, Ordering::SeqCst);
    },
    error: |_: ()| {},
    complete: move || {
      let _ = done_tx.send(());
    },
  });

  done_rx.recv_timeout(Duration::from_secs(10)).expect("chain completes");
  assert_eq!(consumed.load(Ordering::SeqCst), 100);
  // Queue slots plus the value in flight and the one parked in `send`.
  assert!(
    max_lead.load(Ordering::SeqCst) <= BUFFER + 2,
    "producer lead {} exceeds the bounded queue",
    max_lead.load(Ordering::SeqCst)
  );
}

#[test]
fn subscribe_on_returns_before_the_source_runs() {
  let values = Arc::new(Mutex::new(vec![]));
  let (done_tx, done_rx) = mpsc::channel();

  let slow = create(|e: &mut dyn Emitter<i32, ()>| {
    thread::sleep(Duration::from_millis(200));
    e.next(7);
    e.complete();
  });

  let started = Instant::now();
  slow.subscribe_on(4).subscribe_with(collect_into(values.clone(), done_tx));
  assert!(
    started.elapsed() < Duration::from_millis(100),
    "subscribe must not wait for the producer"
  );

  done_rx.recv_timeout(Duration::from_secs(5)).expect("chain completes");
  assert_eq!(*values.lock().unwrap(), vec![7]);
}

#[test]
fn unsubscribe_stops_notifications_across_a_boundary() {
  let values = Arc::new(Mutex::new(vec![]));
  let v = values.clone();
  let (seen_tx, seen_rx) = mpsc::channel();

  let mut subject = Subject::<i32, ()>::new();
  let mut sub = subject.clone().observe_on(8).subscribe_with(ObserverAll {
    next: move |value: i32| {
      v.lock().unwrap().push(value);
      let _ = seen_tx.send(());
    },
    error: |_: ()| {},
    complete: || {},
  });

  subject.next(1);
  seen_rx.recv_timeout(Duration::from_secs(5)).expect("first value delivered");

  sub.unsubscribe();
  sub.unsubscribe(); // idempotent
  subject.next(2);
  subject.next(3);
  thread::sleep(Duration::from_millis(50));
  assert_eq!(*values.lock().unwrap(), vec![1]);
}

#[test]
fn concurrent_producers_through_a_subject_lose_nothing() {
  let values = Arc::new(Mutex::new(vec![]));
  let v = values.clone();

  let subject = Subject::<i32, ()>::new();
  let _sub = subject.clone().subscribe_with(ObserverAll {
    next: move |value: i32| v.lock().unwrap().push(value),
    error: |_: ()| {},
    complete: || {},
  });

  let handles: Vec<_> = (0..4)
    .map(|t| {
      let mut subject = subject.clone();
      thread::spawn(move || {
        for i in 0..250 {
          subject.next(t * 1000 + i);
        }
      })
    })
    .collect();
  for h in handles {
    h.join().unwrap();
  }

  let mut got = values.lock().unwrap().clone();
  assert_eq!(got.len(), 1000);
  got.sort_unstable();
  got.dedup();
  assert_eq!(got.len(), 1000, "no interleaving corruption");
}

#[test]
fn replay_subject_hands_late_subscribers_the_tail() {
  let mut subject = ReplaySubject::<i32, ()>::new(2);
  subject.next(1);
  subject.next(2);
  subject.next(3);

  let values = Arc::new(Mutex::new(vec![]));
  let v = values.clone();
  subject.clone().subscribe_with(ObserverAll {
    next: move |value: i32| v.lock().unwrap().push(value),
    error: |_: ()| {},
    complete: || {},
  });
  assert_eq!(*values.lock().unwrap(), vec![2, 3]);
}

#[test]
fn cancel_handle_turns_into_a_stream_error() {
  let errors = Arc::new(Mutex::new(vec![]));
  let values = Arc::new(Mutex::new(vec![]));

  let (ctx, handle) = Ctx::background().with_cancel();
  let mut subject = Subject::<i32, CtxError>::new();
  let e = errors.clone();
  let v = values.clone();
  let _sub = subject.clone().throw_on_context_cancel().subscribe_with_context(
    ctx,
    ObserverAll {
      next: move |value: i32| v.lock().unwrap().push(value),
      error: move |err: CtxError| e.lock().unwrap().push(err),
      complete: || {},
    },
  );

  subject.next(1);
  handle.cancel();
  // The conversion happens at the next emission, the cooperative check
  // point; the value that triggered it is not delivered.
  subject.next(2);
  subject.next(3);

  assert_eq!(*values.lock().unwrap(), vec![1]);
  assert_eq!(*errors.lock().unwrap(), vec![CtxError::Canceled]);
}

#[test]
fn context_values_reach_the_subscriber() {
  let seen = Arc::new(Mutex::new(None));
  let s = seen.clone();

  let ctx = Ctx::background().with_value("user", "ada".to_string());
  from_iter(0..1).with_ctx().subscribe_with_context(
    ctx,
    ObserverAll {
      next: move |(_, ctx): (i32, Ctx)| {
        *s.lock().unwrap() =
          ctx.value("user").and_then(|v| v.downcast_ref::<String>().cloned());
      },
      error: |_: ()| {},
      complete: || {},
    },
  );

  assert_eq!(*seen.lock().unwrap(), Some("ada".to_string()));
}

#[test]
fn flaky_source_recovers_behind_a_retry() {
  let runs = Arc::new(AtomicUsize::new(0));
  let r = runs.clone();
  let values = Arc::new(Mutex::new(vec![]));
  let v = values.clone();
  let completed = Arc::new(AtomicUsize::new(0));
  let c = completed.clone();

  create(move |e: &mut dyn Emitter<i32, &'static str>| {
    let run = r.fetch_add(1, Ordering::SeqCst);
    if run < 2 {
      e.error("transient");
    } else {
      e.next(10);
      e.next(20);
      e.complete();
    }
  })
  .retry(5)
  .subscribe_with(ObserverAll {
    next: move |value: i32| v.lock().unwrap().push(value),
    error: |_: &'static str| {},
    complete: move || {
      c.fetch_add(1, Ordering::SeqCst);
    },
  });

  assert_eq!(runs.load(Ordering::SeqCst), 3);
  assert_eq!(*values.lock().unwrap(), vec![10, 20]);
  assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn error_recovery_falls_back_in_order() {
  let values = Arc::new(Mutex::new(vec![]));
  let v = values.clone();
  let completed = Arc::new(AtomicUsize::new(0));
  let c = completed.clone();

  throw_err::<i32, &'static str>("primary down")
    .on_error_resume_next_with(vec![throw_err::<i32, &'static str>("secondary down")])
    .on_error_return(|_| -1)
    .subscribe_with(ObserverAll {
      next: move |value: i32| v.lock().unwrap().push(value),
      error: |_: &'static str| {},
      complete: move || {
        c.fetch_add(1, Ordering::SeqCst);
      },
    });

  assert_eq!(*values.lock().unwrap(), vec![-1]);
  assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn share_multiplexes_a_boundary_chain() {
  let subscribes = Arc::new(AtomicUsize::new(0));
  let s = subscribes.clone();
  let first = Arc::new(Mutex::new(vec![]));
  let second = Arc::new(Mutex::new(vec![]));

  // The connect-time value goes only to whoever is already attached; the
  // execution then stays open, so there is no reconnect.
  let shared = create(move |e: &mut dyn Emitter<i32, ()>| {
    s.fetch_add(1, Ordering::SeqCst);
    e.next(0);
  })
  .share();

  let f = first.clone();
  let _a = shared.clone().subscribe_with(ObserverAll {
    next: move |v: i32| f.lock().unwrap().push(v),
    error: |_: ()| {},
    complete: || {},
  });
  let sec = second.clone();
  let _b = shared.clone().subscribe_with(ObserverAll {
    next: move |v: i32| sec.lock().unwrap().push(v),
    error: |_: ()| {},
    complete: || {},
  });

  assert_eq!(subscribes.load(Ordering::SeqCst), 1, "one upstream for both subscribers");
  assert_eq!(*first.lock().unwrap(), vec![0]);
  assert!(second.lock().unwrap().is_empty(), "publish sharing owes late subscribers nothing");
}
