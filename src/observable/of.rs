use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::Observer,
};

/// Emit a single value, then complete.
pub fn of<Item>(value: Item) -> ObservableOf<Item> { ObservableOf { value } }

#[derive(Clone)]
pub struct ObservableOf<Item> {
  value: Item,
}

impl<Item, Err> ObservableExt<Item, Err> for ObservableOf<Item> {}

impl<Item, Err, O> Observable<Item, Err, O> for ObservableOf<Item>
where
  O: Observer<Item, Err>,
{
  type Unsub = ();

  fn actual_subscribe(self, _ctx: Ctx, mut observer: O) -> Self::Unsub {
    if observer.is_closed() {
      return;
    }
    observer.next(self.value);
    observer.complete();
  }
}
