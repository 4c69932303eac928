use std::marker::PhantomData;

use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::Observer,
};

/// See [`ObservableExt::on_error_return`].
pub struct OnErrorReturnOp<S, F, Item, Err> {
  pub(crate) source: S,
  pub(crate) f: F,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, F: Clone, Item, Err> Clone for OnErrorReturnOp<S, F, Item, Err> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), f: self.f.clone(), _hint: PhantomData }
  }
}

impl<S, F, Item, Err> ObservableExt<Item, Err> for OnErrorReturnOp<S, F, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

impl<S, F, Item, Err, O> Observable<Item, Err, O> for OnErrorReturnOp<S, F, Item, Err>
where
  S: Observable<Item, Err, ReturnObserver<F, O>>,
  F: FnOnce(Err) -> Item,
  O: Observer<Item, Err>,
{
  type Unsub = S::Unsub;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    self.source.actual_subscribe(ctx, ReturnObserver { f: self.f, observer })
  }
}

/// Replaces the terminal error with one synthesized value and completion.
pub struct ReturnObserver<F, O> {
  f: F,
  observer: O,
}

impl<F, Item, Err, O> Observer<Item, Err> for ReturnObserver<F, O>
where
  F: FnOnce(Err) -> Item,
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) { self.observer.next(value); }

  fn error(self, err: Err) {
    let ReturnObserver { f, mut observer } = self;
    observer.next(f(err));
    observer.complete();
  }

  fn complete(self) { self.observer.complete(); }

  fn is_closed(&self) -> bool { self.observer.is_closed() }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observable::{create, from_iter};
  use crate::observer::Emitter;

  #[test]
  fn error_becomes_a_final_value() {
    let mut values = vec![];
    let mut completed = false;
    create(|e: &mut dyn Emitter<i32, &'static str>| {
      e.next(1);
      e.error("boom");
    })
    .on_error_return(|err: &'static str| err.len() as i32)
    .subscribe_all(|v| values.push(v), |_| {}, || completed = true);
    assert_eq!(values, vec![1, 4]);
    assert!(completed);
  }

  #[test]
  fn completion_is_untouched() {
    let mut values = vec![];
    from_iter(1..=2)
      .on_error_return(|_: &'static str| -1)
      .subscribe_all(|v| values.push(v), |_| {}, || {});
    assert_eq!(values, vec![1, 2]);
  }
}
