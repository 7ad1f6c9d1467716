use super::{
   define,
   func,
   func_async,
};
use crate::{
   Error,
   Scope,
   Value,
   value::{
      Sink,
      Source,
   },
};

pub(super) fn register(scope: &Scope) {
   define(
      scope,
      "*stdin*",
      "a source of values read from standard input",
      Value::Source(Source::from_values("stdin", [])),
   );

   define(
      scope,
      "*stdout*",
      "a sink of values written to standard output as JSON",
      Value::Sink(Sink::to_writer("stdout", tokio::io::stdout())),
   );

   func(
      scope,
      "list->source",
      "returns a source producing the values of a list, in order",
      |args| {
         let [list] = args.exact::<1>()?;
         Ok(Value::Source(Source::from_values("list", list.to_vec()?)))
      },
   );

   func(
      scope,
      "stream",
      "returns a source producing the given values, in order",
      |args| Ok(Value::Source(Source::from_values("stream", args.all()))),
   );

   func_async(scope, "emit", "emits a value to a sink", |_, args| {
      async move {
         let [value, sink] = args.exact::<2>()?;

         sink.decode::<Sink>()?.emit(&value).await?;
         Ok(Value::Null)
      }
   });

   func_async(
      scope,
      "next",
      "returns the next value of a source\n\nOnce the source has ended, returns the default if one was given and fails otherwise.",
      |_, args| {
         async move {
            let ([source], default) = args.optional::<1>()?;

            match source.decode::<Source>()?.next().await? {
               Some(value) => Ok(value),
               None => default.ok_or(Error::EndOfSource),
            }
         }
      },
   );
}

#[cfg(test)]
mod tests {
   use super::{
      super::tests::{
         ints,
         run,
         run_ok,
      },
      *,
   };

   #[tokio::test]
   async fn sources_drain() {
      assert_eq!(
         run_ok("(def src (list->source [1 2])) [(next src) (next src) (next src :eof)]").await,
         Value::list([Value::Int(1), Value::Int(2), Value::keyword("eof")])
      );

      let error = run("(next (stream))").await.unwrap_err();
      assert!(matches!(error.root(), Error::EndOfSource));
   }

   #[tokio::test]
   async fn collecting() {
      assert_eq!(run_ok("(collect (stream 1 2 3))").await, ints([1, 2, 3]));
      assert_eq!(run_ok("(collect *stdin*)").await, Value::Empty);
   }

   #[tokio::test]
   async fn emit_rejects_non_sinks() {
      assert!(matches!(
         run("(emit 1 *stdin*)").await.unwrap_err().root(),
         Error::Decode { need: "sink", .. }
      ));
   }
}
