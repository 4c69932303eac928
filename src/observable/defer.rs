use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::Observer,
};

/// Defer construction of the inner observable until subscribe time.
///
/// `factory` runs once per subscription, so each subscriber observes a
/// freshly-built source; state captured by the factory is evaluated late.
pub fn defer<F, U>(factory: F) -> ObservableDefer<F>
where
  F: FnOnce() -> U,
{
  ObservableDefer { factory }
}

#[derive(Clone)]
pub struct ObservableDefer<F> {
  factory: F,
}

impl<F, U, Item, Err> ObservableExt<Item, Err> for ObservableDefer<F>
where
  F: FnOnce() -> U,
  U: ObservableExt<Item, Err>,
{
}

impl<F, U, Item, Err, O> Observable<Item, Err, O> for ObservableDefer<F>
where
  F: FnOnce() -> U,
  U: Observable<Item, Err, O>,
  O: Observer<Item, Err>,
{
  type Unsub = U::Unsub;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    (self.factory)().actual_subscribe(ctx, observer)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observable::of;

  #[test]
  fn factory_runs_per_subscription() {
    let mut calls = 0;
    {
      let source = defer(|| {
        calls += 1;
        of(calls)
      });
      let mut got = None;
      source.subscribe_all(|v| got = Some(v), |_: ()| {}, || {});
      assert_eq!(got, Some(1));
    }
    assert_eq!(calls, 1);
  }
}
