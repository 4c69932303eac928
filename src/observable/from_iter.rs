use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::Observer,
};

/// Emit every item of `iter` synchronously, then complete.
///
/// The error type is free and fixed by inference at the subscription
/// site; the sequence itself never errors.
pub fn from_iter<I: IntoIterator>(iter: I) -> ObservableFromIter<I> {
  ObservableFromIter { iter }
}

#[derive(Clone)]
pub struct ObservableFromIter<I> {
  iter: I,
}

impl<I: IntoIterator, Err> ObservableExt<I::Item, Err> for ObservableFromIter<I> {}

impl<I, Err, O> Observable<I::Item, Err, O> for ObservableFromIter<I>
where
  I: IntoIterator,
  O: Observer<I::Item, Err>,
{
  type Unsub = ();

  fn actual_subscribe(self, _ctx: Ctx, mut observer: O) -> Self::Unsub {
    for value in self.iter {
      if observer.is_closed() {
        return;
      }
      observer.next(value);
    }
    observer.complete();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn emits_all_then_completes() {
    let mut values = vec![];
    let mut completed = false;
    from_iter(1..=4).subscribe_all(|v| values.push(v), |_: ()| {}, || completed = true);
    assert_eq!(values, vec![1, 2, 3, 4]);
    assert!(completed);
  }

  #[test]
  fn empty_iterator_just_completes() {
    let mut values: Vec<i32> = vec![];
    let mut completed = false;
    from_iter(Vec::<i32>::new()).subscribe_all(|v| values.push(v), |_: ()| {}, || completed = true);
    assert!(values.is_empty());
    assert!(completed);
  }
}
