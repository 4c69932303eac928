//! Degenerate sources: `empty`, `never` and `throw_err`.

use std::marker::PhantomData;

use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::Observer,
};

/// Complete immediately without emitting.
pub fn empty<Item>() -> ObservableEmpty<Item> { ObservableEmpty(PhantomData) }

pub struct ObservableEmpty<Item>(PhantomData<Item>);

impl<Item> Clone for ObservableEmpty<Item> {
  fn clone(&self) -> Self { ObservableEmpty(PhantomData) }
}

impl<Item, Err> ObservableExt<Item, Err> for ObservableEmpty<Item> {}

impl<Item, Err, O> Observable<Item, Err, O> for ObservableEmpty<Item>
where
  O: Observer<Item, Err>,
{
  type Unsub = ();

  fn actual_subscribe(self, _ctx: Ctx, observer: O) -> Self::Unsub { observer.complete(); }
}

/// Emit nothing and never terminate. Useful as a fallback that keeps a
/// chain silently open.
pub fn never<Item, Err>() -> ObservableNever<Item, Err> { ObservableNever(PhantomData) }

pub struct ObservableNever<Item, Err>(PhantomData<(Item, Err)>);

impl<Item, Err> Clone for ObservableNever<Item, Err> {
  fn clone(&self) -> Self { ObservableNever(PhantomData) }
}

impl<Item, Err> ObservableExt<Item, Err> for ObservableNever<Item, Err> {}

impl<Item, Err, O> Observable<Item, Err, O> for ObservableNever<Item, Err>
where
  O: Observer<Item, Err>,
{
  type Unsub = ();

  fn actual_subscribe(self, _ctx: Ctx, observer: O) -> Self::Unsub {
    // Nothing will ever be delivered; drop the observer without a terminal.
    let _ = observer;
  }
}

/// Error immediately with `err`.
pub fn throw_err<Item, Err>(err: Err) -> ObservableThrow<Item, Err> {
  ObservableThrow { err, _marker: PhantomData }
}

pub struct ObservableThrow<Item, Err> {
  err: Err,
  _marker: PhantomData<Item>,
}

impl<Item, Err: Clone> Clone for ObservableThrow<Item, Err> {
  fn clone(&self) -> Self { ObservableThrow { err: self.err.clone(), _marker: PhantomData } }
}

impl<Item, Err> ObservableExt<Item, Err> for ObservableThrow<Item, Err> {}

impl<Item, Err, O> Observable<Item, Err, O> for ObservableThrow<Item, Err>
where
  O: Observer<Item, Err>,
{
  type Unsub = ();

  fn actual_subscribe(self, _ctx: Ctx, observer: O) -> Self::Unsub { observer.error(self.err); }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_only_completes() {
    let mut values: Vec<i32> = vec![];
    let mut completed = false;
    empty().subscribe_all(|v| values.push(v), |_: ()| {}, || completed = true);
    assert!(values.is_empty());
    assert!(completed);
  }

  #[test]
  fn throw_only_errors() {
    let mut errored = None;
    throw_err::<i32, _>("boom").subscribe_all(|_| {}, |e| errored = Some(e), || {});
    assert_eq!(errored, Some("boom"));
  }

  #[test]
  fn never_stays_silent() {
    let touched = std::cell::Cell::new(false);
    never::<i32, ()>().subscribe_all(
      |_| touched.set(true),
      |_| touched.set(true),
      || touched.set(true),
    );
    assert!(!touched.get());
  }
}
