use std::{
   fmt,
   pin::Pin,
   sync::Arc,
};

use crate::{
   Context,
   Error,
   Result,
   Trace,
   Value,
};

type Next = Arc<dyn Fn(Value) -> ReadyCont + Send + Sync>;

/// The rest of a computation, waiting for a value.
///
/// A continuation that was handed out while evaluating annotated forms also
/// remembers how many trace frames to pop once it receives its value. Tail
/// calls reuse the same continuation and only bump that count, so they run
/// in constant space.
#[derive(Clone)]
pub struct Cont {
   next:   Option<Next>,
   traced: Option<(Trace, usize)>,
}

impl fmt::Debug for Cont {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer.write_str("<continuation>")
   }
}

/// A single step of a computation, driven by [`trampoline`].
pub enum ReadyCont {
   Done(Value),
   Resume { next: Next, value: Value },
   Fail(Error),
   Suspend(Pin<Box<dyn Future<Output = ReadyCont> + Send>>),
}

impl Cont {
   /// The continuation that ends the computation with its value.
   #[must_use]
   pub fn identity() -> Self {
      Self {
         next:   None,
         traced: None,
      }
   }

   #[must_use]
   pub fn new(next: impl Fn(Value) -> ReadyCont + Send + Sync + 'static) -> Self {
      Self {
         next:   Some(Arc::new(next)),
         traced: None,
      }
   }

   /// Same continuation, with one more frame to pop on return.
   #[must_use]
   pub fn traced(&self, trace: &Trace) -> Self {
      let count = match self.traced {
         Some((_, count)) => count + 1,
         None => 1,
      };

      Self {
         next:   self.next.clone(),
         traced: Some((trace.clone(), count)),
      }
   }

   #[must_use]
   pub fn ptr_eq(&self, other: &Self) -> bool {
      match (&self.next, &other.next) {
         (Some(this), Some(that)) => Arc::ptr_eq(this, that),
         (None, None) => true,
         _ => false,
      }
   }

   pub fn call(&self, result: Result<Value>) -> ReadyCont {
      match result {
         Ok(value) => {
            if let Some((ref trace, count)) = self.traced {
               trace.pop(count);
            }

            match self.next {
               Some(ref next) => {
                  ReadyCont::Resume {
                     next: next.clone(),
                     value,
                  }
               },
               None => ReadyCont::Done(value),
            }
         },

         Err(error) => {
            let error = match self.traced {
               Some((ref trace, _)) => {
                  match trace.top().and_then(|frame| frame.range.clone()) {
                     Some(range) if error.range() != Some(&range) => {
                        Error::Traced {
                           error: Arc::new(error),
                           range,
                        }
                     },
                     _ => error,
                  }
               },
               None => error,
            };

            ReadyCont::Fail(error)
         },
      }
   }

   /// Suspends on a future and continues with its output.
   pub fn suspend(
      &self,
      future: impl Future<Output = Result<Value>> + Send + 'static,
   ) -> ReadyCont {
      let cont = self.clone();
      ReadyCont::Suspend(Box::pin(async move { cont.call(future.await) }))
   }
}

/// Runs steps until the computation finishes. The only loop in evaluation.
pub async fn trampoline(ctx: &Context, mut step: ReadyCont) -> Result<Value> {
   const YIELD_EVERY: u32 = 1024;

   let mut steps = 0_u32;

   loop {
      if ctx.cancel.is_cancelled() {
         return Err(Error::Interrupted);
      }

      step = match step {
         ReadyCont::Done(value) => return Ok(value),
         ReadyCont::Fail(error) => return Err(error),
         ReadyCont::Resume { next, value } => next(value),
         ReadyCont::Suspend(future) => {
            tokio::select! {
               biased;

               () = ctx.cancel.cancelled() => return Err(Error::Interrupted),
               step = future => step,
            }
         },
      };

      steps = steps.wrapping_add(1);
      if steps % YIELD_EVERY == 0 {
         tokio::task::yield_now().await;
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[tokio::test]
   async fn identity_finishes() {
      let ctx = Context::default();

      let value = trampoline(&ctx, Cont::identity().call(Ok(Value::Int(1))))
         .await
         .unwrap();

      assert_eq!(value, Value::Int(1));
   }

   #[tokio::test]
   async fn deep_chains_run_in_constant_stack() {
      fn count(n: i64, cont: Cont) -> ReadyCont {
         if n == 0 {
            return cont.call(Ok(Value::Int(0)));
         }

         Cont::new(move |_| count(n - 1, cont.clone())).call(Ok(Value::Null))
      }

      let ctx = Context::default();
      let value = trampoline(&ctx, count(1_000_000, Cont::identity()))
         .await
         .unwrap();

      assert_eq!(value, Value::Int(0));
   }

   #[tokio::test]
   async fn suspend_awaits() {
      let ctx = Context::default();

      let step = Cont::identity().suspend(async {
         tokio::task::yield_now().await;
         Ok(Value::Bool(true))
      });

      assert_eq!(trampoline(&ctx, step).await.unwrap(), Value::Bool(true));
   }

   #[tokio::test]
   async fn cancellation_interrupts() {
      let ctx = Context::default();
      ctx.cancel.cancel();

      let error = trampoline(&ctx, Cont::identity().call(Ok(Value::Null)))
         .await
         .unwrap_err();

      assert!(error.is_interrupted());
   }

   #[test]
   fn errors_pick_up_the_innermost_frame() {
      use ranged::{
         Position,
         Range,
      };

      use crate::value::Annotated;

      let trace = Trace::default();
      let range = Range::new(
         "test".into(),
         Position { line: 3, column: 1 },
         Position { line: 3, column: 5 },
      );

      trace.record(Arc::new(Annotated {
         value:   Value::Null,
         range:   Some(range.clone()),
         comment: None,
         meta:    None,
      }));

      let ReadyCont::Fail(error) = Cont::identity()
         .traced(&trace)
         .call(Err(Error::Interrupted))
      else {
         panic!("expected a failure");
      };

      assert_eq!(error.range(), Some(&range));
      assert!(error.is_interrupted());
   }
}
