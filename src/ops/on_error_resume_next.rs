use std::{collections::VecDeque, marker::PhantomData};

use crate::{
  context::Ctx,
  observable::{Observable, ObservableExt},
  observer::{BoxObserver, Observer},
  subscription::{SerialSubscription, Subscription},
};

/// See [`ObservableExt::on_error_resume_next_with`].
pub struct OnErrorResumeNextOp<S, C, Item, Err> {
  pub(crate) source: S,
  pub(crate) fallbacks: Vec<C>,
  pub(crate) _hint: PhantomData<fn() -> (Item, Err)>,
}

impl<S: Clone, C: Clone, Item, Err> Clone for OnErrorResumeNextOp<S, C, Item, Err> {
  fn clone(&self) -> Self {
    Self { source: self.source.clone(), fallbacks: self.fallbacks.clone(), _hint: PhantomData }
  }
}

impl<S, C, Item, Err> ObservableExt<Item, Err> for OnErrorResumeNextOp<S, C, Item, Err> where
  S: ObservableExt<Item, Err>
{
}

/// Source and fallbacks are all subscribed with a boxed observer, so the
/// walk down the fallback list reuses one observer type throughout.
impl<S, C, Item, Err, O> Observable<Item, Err, O> for OnErrorResumeNextOp<S, C, Item, Err>
where
  S: Observable<Item, Err, BoxObserver<Item, Err>>,
  S::Unsub: Send + 'static,
  C: Observable<Item, Err, BoxObserver<Item, Err>> + Send + 'static,
  C::Unsub: Send + 'static,
  O: Observer<Item, Err> + Send + 'static,
  Item: 'static,
  Err: 'static,
{
  type Unsub = SerialSubscription;

  fn actual_subscribe(self, ctx: Ctx, observer: O) -> Self::Unsub {
    let serial = SerialSubscription::new();
    let resume: BoxObserver<Item, Err> = Box::new(ResumeObserver {
      fallbacks: self.fallbacks.into(),
      observer,
      serial: serial.clone(),
      ctx: ctx.clone(),
    });
    let unsub = self.source.actual_subscribe(ctx, resume);
    serial.swap(unsub);
    serial
  }
}

/// Walks the fallback list on each error; once the list is exhausted the
/// last error reaches the downstream observer.
pub struct ResumeObserver<C, O> {
  fallbacks: VecDeque<C>,
  observer: O,
  serial: SerialSubscription,
  ctx: Ctx,
}

impl<C, Item, Err, O> Observer<Item, Err> for ResumeObserver<C, O>
where
  C: Observable<Item, Err, BoxObserver<Item, Err>> + Send + 'static,
  C::Unsub: Send + 'static,
  O: Observer<Item, Err> + Send + 'static,
  Item: 'static,
  Err: 'static,
{
  fn next(&mut self, value: Item) { self.observer.next(value); }

  fn error(self, err: Err) {
    let ResumeObserver { mut fallbacks, observer, serial, ctx } = self;
    if serial.is_closed() {
      return;
    }
    match fallbacks.pop_front() {
      Some(next_source) => {
        let resume: BoxObserver<Item, Err> = Box::new(ResumeObserver {
          fallbacks,
          observer,
          serial: serial.clone(),
          ctx: ctx.clone(),
        });
        let unsub = next_source.actual_subscribe(ctx, resume);
        serial.swap(unsub);
      }
      None => observer.error(err),
    }
  }

  fn complete(self) { self.observer.complete(); }

  fn is_closed(&self) -> bool { self.serial.is_closed() || self.observer.is_closed() }
}
