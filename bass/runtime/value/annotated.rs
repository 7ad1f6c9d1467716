use std::sync::Arc;

use arcstr::ArcStr;
use ranged::Range;

use crate::{
   Context,
   Cont,
   ReadyCont,
   Scope,
   Value,
   bind,
};

/// A value with the source range and comment it was read with, or metadata
/// attached at runtime.
#[derive(Debug)]
pub struct Annotated {
   pub value:   Value,
   pub range:   Option<Range>,
   pub comment: Option<ArcStr>,
   pub meta:    Option<Scope>,
}

impl Annotated {
   pub(crate) fn eval(self: &Arc<Self>, ctx: &Context, scope: &Scope, cont: Cont) -> ReadyCont {
      let cont = if self.comment.is_some() {
         let this = self.clone();
         let caller = scope.clone();

         Cont::new(move |result| {
            this.describe(&caller, &result);
            cont.call(Ok(result))
         })
      } else {
         cont
      };

      let cont = if self.range.is_some() {
         ctx.trace.record(self.clone());
         cont.traced(&ctx.trace)
      } else {
         cont
      };

      self.value.eval(ctx, scope, cont)
   }

   /// Records the comment on the scope. Comments on forms that evaluate to
   /// `_` become commentary, comments on definitions document the bindings.
   fn describe(&self, scope: &Scope, result: &Value) {
      let Some(ref comment) = self.comment else {
         return;
      };

      if let Value::Ignore = *result.bare() {
         scope.comment(comment.clone());
         return;
      }

      for symbol in bind::symbols(result) {
         if scope.has_local(&symbol) {
            scope.set_doc(&symbol, comment.clone(), self.range.as_ref());
         }
      }
   }
}
