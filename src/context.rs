//! Cooperative cancellation context.
//!
//! `Ctx` is an immutable token threaded through every subscribe call. It
//! forms a parent/child chain: a derivation returns a new token, never
//! mutates the parent, so tokens are safely shared across threads.
//! Cancellation is advisory — producers poll [`Ctx::err`] (directly or via
//! the `throw_on_context_cancel` operator) at safe points; nothing is
//! preempted.

use std::{
  any::Any,
  fmt,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::{Duration, Instant},
};

use once_cell::sync::Lazy;
use thiserror::Error;

/// Why a context is done.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CtxError {
  #[error("context canceled")]
  Canceled,
  #[error("context deadline exceeded")]
  DeadlineExceeded,
  /// Caller-supplied cause attached at derivation time.
  #[error("{0}")]
  Cause(Arc<str>),
}

impl CtxError {
  /// Convenience constructor for a caller-supplied cause.
  pub fn cause(message: impl Into<Arc<str>>) -> Self { CtxError::Cause(message.into()) }
}

struct CtxNode {
  parent: Option<Ctx>,
  value: Option<(&'static str, Arc<dyn Any + Send + Sync>)>,
  deadline: Option<Instant>,
  canceled: Option<Arc<AtomicBool>>,
  /// Substituted for the generic error when this node triggers.
  cause: Option<CtxError>,
}

static BACKGROUND: Lazy<Ctx> = Lazy::new(|| {
  Ctx(Arc::new(CtxNode { parent: None, value: None, deadline: None, canceled: None, cause: None }))
});

/// Immutable, cheaply-cloneable cancellation token.
#[derive(Clone)]
pub struct Ctx(Arc<CtxNode>);

impl fmt::Debug for Ctx {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Ctx")
      .field("deadline", &self.deadline())
      .field("done", &self.is_done())
      .finish()
  }
}

impl Default for Ctx {
  fn default() -> Self { Ctx::background() }
}

impl Ctx {
  /// The shared root context: never done, carries no values.
  pub fn background() -> Ctx { BACKGROUND.clone() }

  fn derive(&self, node: CtxNode) -> Ctx { Ctx(Arc::new(node)) }

  fn child(&self) -> CtxNode {
    CtxNode {
      parent: Some(self.clone()),
      value: None,
      deadline: None,
      canceled: None,
      cause: None,
    }
  }

  /// Derive a child carrying an additional key/value pair. Lookups walk
  /// the chain, so children inherit parent values unless overridden.
  pub fn with_value(&self, key: &'static str, value: impl Any + Send + Sync) -> Ctx {
    self.with_value_arc(key, Arc::new(value))
  }

  pub fn with_value_arc(&self, key: &'static str, value: Arc<dyn Any + Send + Sync>) -> Ctx {
    let mut node = self.child();
    node.value = Some((key, value));
    self.derive(node)
  }

  /// Nearest value for `key` along the parent chain.
  pub fn value(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
    let mut node = &self.0;
    loop {
      if let Some((k, v)) = &node.value {
        if *k == key {
          return Some(v.clone());
        }
      }
      match &node.parent {
        Some(parent) => node = &parent.0,
        None => return None,
      }
    }
  }

  /// Derive a child that is done `duration` from now.
  pub fn with_timeout(&self, duration: Duration) -> Ctx {
    self.with_deadline(Instant::now() + duration)
  }

  /// Like [`with_timeout`](Self::with_timeout), reporting `cause` instead
  /// of the generic deadline error once expired.
  pub fn with_timeout_cause(&self, duration: Duration, cause: CtxError) -> Ctx {
    self.with_deadline_cause(Instant::now() + duration, cause)
  }

  /// Derive a child that is done at `deadline`.
  pub fn with_deadline(&self, deadline: Instant) -> Ctx {
    let mut node = self.child();
    node.deadline = Some(deadline);
    self.derive(node)
  }

  pub fn with_deadline_cause(&self, deadline: Instant, cause: CtxError) -> Ctx {
    let mut node = self.child();
    node.deadline = Some(deadline);
    node.cause = Some(cause);
    self.derive(node)
  }

  /// Derive an explicitly-cancelable child. Dropping the handle does not
  /// cancel; only [`CancelHandle::cancel`] does.
  pub fn with_cancel(&self) -> (Ctx, CancelHandle) {
    let flag = Arc::new(AtomicBool::new(false));
    let mut node = self.child();
    node.canceled = Some(flag.clone());
    (self.derive(node), CancelHandle(flag))
  }

  /// Earliest deadline along the chain, if any.
  pub fn deadline(&self) -> Option<Instant> {
    let mut earliest: Option<Instant> = None;
    let mut node = &self.0;
    loop {
      if let Some(d) = node.deadline {
        earliest = Some(match earliest {
          Some(e) if e <= d => e,
          _ => d,
        });
      }
      match &node.parent {
        Some(parent) => node = &parent.0,
        None => return earliest,
      }
    }
  }

  /// `Some(reason)` once this context or any ancestor is done. The
  /// triggering node's cause, when present, replaces the generic error.
  pub fn err(&self) -> Option<CtxError> {
    let now = Instant::now();
    let mut node = &self.0;
    loop {
      if let Some(flag) = &node.canceled {
        if flag.load(Ordering::Acquire) {
          return Some(node.cause.clone().unwrap_or(CtxError::Canceled));
        }
      }
      if let Some(deadline) = node.deadline {
        if deadline <= now {
          return Some(node.cause.clone().unwrap_or(CtxError::DeadlineExceeded));
        }
      }
      match &node.parent {
        Some(parent) => node = &parent.0,
        None => return None,
      }
    }
  }

  #[inline]
  pub fn is_done(&self) -> bool { self.err().is_some() }
}

/// Cancels the context it was derived with. Clonable; cancel is
/// idempotent.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
  pub fn cancel(&self) { self.0.store(true, Ordering::Release); }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn background_is_never_done() {
    let ctx = Ctx::background();
    assert!(!ctx.is_done());
    assert!(ctx.deadline().is_none());
    assert!(ctx.value("anything").is_none());
  }

  #[test]
  fn values_inherit_and_override() {
    let root = Ctx::background().with_value("request-id", 7u32);
    let child = root.with_value("trace-id", "abc");
    let got = child.value("request-id").unwrap();
    assert_eq!(*got.downcast_ref::<u32>().unwrap(), 7);
    assert!(child.value("trace-id").is_some());
    assert!(root.value("trace-id").is_none(), "derivation never mutates the parent");

    let overridden = child.with_value("request-id", 8u32);
    let got = overridden.value("request-id").unwrap();
    assert_eq!(*got.downcast_ref::<u32>().unwrap(), 8);
  }

  #[test]
  fn deadline_in_the_past_is_done() {
    let ctx = Ctx::background().with_timeout(Duration::ZERO);
    assert_eq!(ctx.err(), Some(CtxError::DeadlineExceeded));
  }

  #[test]
  fn timeout_cause_replaces_generic_error() {
    let cause = CtxError::cause("fetch budget exhausted");
    let ctx = Ctx::background().with_timeout_cause(Duration::ZERO, cause.clone());
    assert_eq!(ctx.err(), Some(cause));
  }

  #[test]
  fn child_inherits_parent_deadline() {
    let parent = Ctx::background().with_timeout(Duration::ZERO);
    let child = parent.with_value("k", 1u8);
    assert!(child.is_done());
  }

  #[test]
  fn earliest_deadline_wins() {
    let far = Instant::now() + Duration::from_secs(3600);
    let near = Instant::now() + Duration::from_secs(60);
    let ctx = Ctx::background().with_deadline(far).with_deadline(near);
    assert_eq!(ctx.deadline(), Some(near));
  }

  #[test]
  fn explicit_cancel() {
    let (ctx, handle) = Ctx::background().with_cancel();
    assert!(!ctx.is_done());
    handle.cancel();
    assert_eq!(ctx.err(), Some(CtxError::Canceled));
    // Idempotent.
    handle.cancel();
    assert_eq!(ctx.err(), Some(CtxError::Canceled));
  }
}
