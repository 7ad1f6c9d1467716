//! The ground scope: native builtins plus the embedded standard library.
//!
//! Ground is built once per process. After the standard library has been
//! evaluated into it the scope is frozen, and every run scope descends from
//! it.

use std::{
   future::Future,
   sync::Arc,
};

use arcstr::ArcStr;
use async_once_cell::OnceCell;

use crate::{
   Context,
   Cont,
   Error,
   INTERNAL_FILE_PREFIX,
   ReadyCont,
   Result,
   Scope,
   Value,
   std_fs,
   value::{
      Args,
      Builtin,
      Sink,
      Source,
   },
};

/// Returns from the enclosing builtin by failing the continuation.
macro_rules! try_cont {
   ($cont:expr, $result:expr) => {
      match $result {
         Ok(value) => value,
         Err(error) => return $cont.call(Err(error)),
      }
   };
}
pub(crate) use try_cont;

mod core;
mod numbers;
mod predicates;
mod streams;
mod strings;
mod thunks;

pub use predicates::predicates;

static GROUND: OnceCell<Scope> = OnceCell::new();

/// The ground scope, built on first use.
pub async fn ground() -> Result<Scope> {
   GROUND
      .get_or_try_init(async {
         let scope = Scope::named("ground", []);

         core::register(&scope);
         predicates::register(&scope);
         numbers::register(&scope);
         strings::register(&scope);
         streams::register(&scope);
         thunks::register(&scope);

         bootstrap(&scope).await?;
         scope.freeze();

         Ok(scope)
      })
      .await
      .cloned()
}

async fn bootstrap(scope: &Scope) -> Result<()> {
   let ctx = Context::default();

   for file in std_fs::BOOTSTRAP {
      let source = std_fs::read(std_fs::STD, file).ok_or_else(|| {
         Error::message(format!("standard library file {file} is missing"))
      })?;

      tracing::trace!("Evaluating {file} into ground.");
      crate::eval_source(&ctx, scope, &format!("{INTERNAL_FILE_PREFIX}{file}"), source).await?;
   }

   Ok(())
}

/// What a script runs with.
#[derive(Default, bon::Builder)]
pub struct RunState {
   #[builder(default)]
   pub args:   Vec<Value>,
   pub env:    Option<Scope>,
   pub dir:    Option<Value>,
   pub stdin:  Option<Source>,
   pub stdout: Option<Sink>,
}

/// A scope for running a script in. Binds `*args*`, `*env*`, `*dir*`,
/// `*stdin*` and `*stdout*` in a parent of the returned scope, so the script
/// can shadow them.
#[must_use]
pub fn run_scope(ground: &Scope, state: RunState) -> Scope {
   let scope = Scope::new([ground.clone()]);

   let set = |name: &str, value: Value, doc: &str| {
      scope.set(name, value);
      scope.set_doc(name, ArcStr::from(doc), None);
   };

   set(
      "*args*",
      Value::list(state.args),
      "command line arguments the script was run with",
   );
   set(
      "*env*",
      Value::Scope(state.env.unwrap_or_else(|| Scope::new([]))),
      "environment variables, only given to the script that was run directly",
   );
   set(
      "*dir*",
      state
         .dir
         .unwrap_or_else(|| Value::DirPath(crate::value::DirPath::new("."))),
      "the directory containing the script being run",
   );
   set(
      "*stdin*",
      Value::Source(
         state
            .stdin
            .unwrap_or_else(|| Source::from_values("stdin", [])),
      ),
      "values read from standard input as a JSON stream",
   );
   set(
      "*stdout*",
      Value::Sink(state.stdout.unwrap_or_else(|| {
         Sink::new("stdout", crate::value::stream::BufferSink::default())
      })),
      "values emitted here are written to standard output as a JSON stream",
   );

   Scope::new([scope])
}

/// Calls `main` with the arguments, if the script defined one.
pub async fn run_main(ctx: &Context, scope: &Scope, args: Vec<Value>) -> Result<Value> {
   let Some(main) = scope.get("main") else {
      return Ok(Value::Null);
   };

   crate::trampoline(ctx, apply(ctx, &main, args, Cont::identity())).await
}

fn define(scope: &Scope, name: &str, doc: &str, value: Value) {
   scope.set(name, value);
   scope.set_doc(name, ArcStr::from(doc), None);
}

/// Binds an applicative builtin that maps its evaluated arguments to a value.
pub(crate) fn func(
   scope: &Scope,
   name: &'static str,
   doc: &str,
   function: impl Fn(Args) -> Result<Value> + Send + Sync + 'static,
) {
   func_cont(scope, name, doc, move |_, args, cont| cont.call(function(args)));
}

/// Binds an applicative builtin that continues the computation itself.
pub(crate) fn func_cont(
   scope: &Scope,
   name: &'static str,
   doc: &str,
   function: impl Fn(&Context, Args, Cont) -> ReadyCont + Send + Sync + 'static,
) {
   let label = ArcStr::from(name);

   let builtin = Builtin::new(name, move |ctx, args, _, cont| {
      let args = try_cont!(cont, Args::new(&label, &args));
      function(ctx, args, cont)
   });

   define(scope, name, doc, Value::wrap(Value::Builtin(Arc::new(builtin))));
}

/// Binds an applicative builtin that awaits a future.
pub(crate) fn func_async<F>(
   scope: &Scope,
   name: &'static str,
   doc: &str,
   function: impl Fn(Context, Args) -> F + Send + Sync + 'static,
) where
   F: Future<Output = Result<Value>> + Send + 'static,
{
   func_cont(scope, name, doc, move |ctx, args, cont| {
      cont.suspend(function(ctx.clone(), args))
   });
}

/// Binds an operative builtin. It sees its arguments unevaluated along with
/// the caller's scope.
pub(crate) fn op(
   scope: &Scope,
   name: &'static str,
   doc: &str,
   function: impl Fn(&Context, Args, &Scope, Cont) -> ReadyCont + Send + Sync + 'static,
) {
   define(scope, name, doc, Value::Builtin(Arc::new(operative(name, function))));
}

/// Calls a combiner with arguments that are already evaluated.
pub(crate) fn apply(ctx: &Context, combiner: &Value, args: Vec<Value>, cont: Cont) -> ReadyCont {
   match *combiner.bare() {
      Value::Wrapped(ref inner) => inner.call(ctx, &Value::list(args), &Scope::new([]), cont),

      ref other => {
         cont.call(Err(Error::Decode {
            value: other.to_string(),
            have:  other.type_name(),
            need:  "applicative",
         }))
      },
   }
}

fn operative(
   name: &'static str,
   function: impl Fn(&Context, Args, &Scope, Cont) -> ReadyCont + Send + Sync + 'static,
) -> Builtin {
   let label = ArcStr::from(name);

   Builtin::new(name, move |ctx, args, scope, cont| {
      let args = try_cont!(cont, Args::new(&label, &args));
      function(ctx, args, scope, cont)
   })
}

#[cfg(test)]
pub(crate) mod tests {
   use super::*;
   use crate::value::stream::BufferSink;

   /// Evaluates source in a fresh run scope.
   pub(crate) async fn run(source: &str) -> Result<Value> {
      let ground = ground().await?;
      let scope = run_scope(&ground, RunState::default());

      crate::eval_source(&Context::default(), &scope, "test.bass", source).await
   }

   pub(crate) async fn run_ok(source: &str) -> Value {
      match run(source).await {
         Ok(value) => value,
         Err(error) => panic!("{source} failed: {error}"),
      }
   }

   pub(crate) fn ints(ints: impl IntoIterator<Item = i64>) -> Value {
      Value::list(ints.into_iter().map(Value::Int).collect::<Vec<_>>())
   }

   #[tokio::test]
   async fn ground_is_shared_and_complete() {
      let ground = ground().await.unwrap();
      let again = super::ground().await.unwrap();
      assert_eq!(ground.id(), again.id());

      for name in [
         "def", "if", "do", "op", "wrap", "unwrap", "eval", "cons", "bind", "make-scope",
         "get-current-scope", "commentary", "doc", "emit", "next", "stream", "*stdin*",
         "*stdout*", "load", "resolve", "run", "read", "export", "fn", "defn", "defop", "let",
         "cond", "case", "map", "provide", "and", "or", "collect", "from",
      ] {
         assert!(ground.get(name).is_some(), "{name} is unbound");
      }
   }

   #[tokio::test]
   async fn bootstrap_docs_are_recorded() {
      let ground = ground().await.unwrap();

      assert_eq!(
         ground.doc("quote").as_deref(),
         Some("returns the form, unevaluated")
      );
      assert_eq!(
         ground.doc("+").as_deref(),
         Some("sums numbers")
      );
   }

   #[tokio::test]
   async fn run_scopes_bind_run_state() {
      let ground = ground().await.unwrap();
      let sink = BufferSink::default();

      let scope = run_scope(
         &ground,
         RunState::builder()
            .args(vec![Value::string("a")])
            .stdin(Source::from_values("stdin", [Value::Int(1)]))
            .stdout(Sink::new("stdout", sink.clone()))
            .build(),
      );

      let ctx = Context::default();
      let value = crate::eval_source(
         &ctx,
         &scope,
         "test.bass",
         "(emit (next *stdin*) *stdout*) *args*",
      )
      .await
      .unwrap();

      assert_eq!(value, Value::list([Value::string("a")]));
      assert_eq!(sink.values().await, [Value::Int(1)]);
   }

   #[tokio::test]
   async fn deep_recursion_runs_in_constant_stack() {
      let value = run_ok(
         "(defn count-down (n) (if (= n 0) :done (count-down (- n 1)))) (count-down 100000)",
      )
      .await;

      assert_eq!(value, Value::keyword("done"));
   }
}
