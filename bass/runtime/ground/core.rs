use std::{
   fmt::Write as _,
   sync::{
      Arc,
      LazyLock,
   },
};

use arcstr::ArcStr;
use yansi::Paint as _;

use super::{
   apply,
   func,
   func_cont,
   op,
   operative,
   predicates,
   try_cont,
};
use crate::{
   Context,
   Cont,
   Error,
   ReadyCont,
   Result,
   Scope,
   Value,
   bind::bind,
   value::{
      Annotated,
      Operative,
      json,
   },
};

/// The `do` builtin, shared so operatives with several body forms can
/// sequence them without looking `do` up.
static DO: LazyLock<Value> = LazyLock::new(|| {
   Value::Builtin(Arc::new(operative("do", |ctx, args, scope, cont| {
      sequence(ctx, scope, args.all().into(), 0, cont)
   })))
});

fn sequence(ctx: &Context, scope: &Scope, body: Arc<[Value]>, index: usize, cont: Cont) -> ReadyCont {
   let Some(form) = body.get(index) else {
      return cont.call(Ok(Value::Null));
   };

   if index + 1 == body.len() {
      return form.eval(ctx, scope, cont);
   }

   let ctx_ = ctx.clone();
   let scope_ = scope.clone();
   let body_ = body.clone();

   form.eval(
      ctx,
      scope,
      Cont::new(move |_| sequence(&ctx_, &scope_, body_.clone(), index + 1, cont.clone())),
   )
}

/// Formats `%s`, `%d` and `%v` directives with the arguments. Strings are
/// substituted raw, everything else as it displays.
pub(crate) fn format(template: &str, args: &[Value]) -> String {
   let mut output = String::with_capacity(template.len());
   let mut args = args.iter();
   let mut chars = template.chars();

   while let Some(char) = chars.next() {
      if char != '%' {
         output.push(char);
         continue;
      }

      match chars.next() {
         Some('%') => output.push('%'),

         Some(verb @ ('s' | 'd' | 'v')) => {
            match args.next().map(Value::bare) {
               Some(&Value::String(ref string)) => output.push_str(string),
               Some(arg) => {
                  let _ = write!(output, "{arg}");
               },
               None => {
                  let _ = write!(output, "%!{verb}(MISSING)");
               },
            }
         },

         Some(other) => {
            output.push('%');
            output.push(other);
         },

         None => output.push('%'),
      }
   }

   output
}

fn message(value: &Value) -> String {
   match *value.bare() {
      Value::String(ref string) => string.to_string(),
      ref other => other.to_string(),
   }
}

fn key(value: &Value) -> Result<ArcStr> {
   match *value.bare() {
      Value::Keyword(ref name) | Value::Symbol(ref name) => Ok(name.clone()),
      ref other => {
         Err(Error::BadKey {
            value: other.to_string(),
         })
      },
   }
}

fn reduce_kv(
   ctx: &Context,
   function: Value,
   acc: Value,
   entries: Arc<[(ArcStr, Value)]>,
   index: usize,
   cont: Cont,
) -> ReadyCont {
   let Some(&(ref name, ref value)) = entries.get(index) else {
      return cont.call(Ok(acc));
   };

   let ctx_ = ctx.clone();
   let function_ = function.clone();
   let entries_ = entries.clone();

   apply(
      ctx,
      &function,
      vec![acc, Value::Keyword(name.clone()), value.clone()],
      Cont::new(move |acc| {
         reduce_kv(
            &ctx_,
            function_.clone(),
            acc,
            entries_.clone(),
            index + 1,
            cont.clone(),
         )
      }),
   )
}

fn print_docs(ctx: &Context, scope: &Scope, names: &[ArcStr]) {
   for name in names {
      let mut header = name.to_string();

      if let Some(value) = scope.get(name) {
         for predicate in predicates(&value) {
            let _ = write!(header, " {predicate}");
         }
      }

      ctx.log(&header.bold().to_string());

      match scope.doc(name) {
         Some(doc) => {
            for line in doc.lines() {
               ctx.log(&format!("  {line}"));
            }
         },
         None => ctx.log("  undocumented"),
      }

      ctx.log("");
   }
}

pub(super) fn register(scope: &Scope) {
   op(
      scope,
      "def",
      "binds symbols to values in the current scope\n\nSupports destructuring, like (def (a & bs) [1 2 3]).",
      |ctx, args, scope, cont| {
         let [formals, value] = try_cont!(cont, args.exact::<2>());
         let scope_ = scope.clone();

         value.eval(
            ctx,
            scope,
            Cont::new(move |value| {
               cont.call(bind(&scope_, &formals, &value).map(|()| formals.clone()))
            }),
         )
      },
   );

   op(
      scope,
      "if",
      "evaluates the yes form when the test is truthy, and the no form otherwise\n\nOnly null and false are falsy.",
      |ctx, args, scope, cont| {
         let ([test, yes], no) = try_cont!(cont, args.optional::<2>());

         let ctx_ = ctx.clone();
         let scope_ = scope.clone();

         test.eval(
            ctx,
            scope,
            Cont::new(move |result| {
               if !result.is_falsy() {
                  return yes.eval(&ctx_, &scope_, cont.clone());
               }

               match no {
                  Some(ref no) => no.eval(&ctx_, &scope_, cont.clone()),
                  None => cont.call(Ok(Value::Null)),
               }
            }),
         )
      },
   );

   scope.set("do", DO.clone());
   scope.set_doc(
      "do",
      arcstr::literal!("evaluates a sequence of forms, returning the last value"),
      None,
   );

   op(
      scope,
      "op",
      "builds an operative out of formals, a scope binding and a body\n\nThe operative receives its arguments unevaluated, along with the scope it was called in.",
      |_, args, scope, cont| {
         let ([formals, eformal], body) = try_cont!(cont, args.at_least::<2>());

         let body = match <[Value; 1]>::try_from(body) {
            Ok([form]) => form,
            Err(body) => Value::pair(DO.clone(), Value::list(body)),
         };

         cont.call(Ok(Value::Operative(Arc::new(Operative {
            scope: scope.clone(),
            formals,
            eformal,
            body,
         }))))
      },
   );

   func(
      scope,
      "wrap",
      "builds an applicative out of a combiner\n\nAn applicative evaluates its arguments before passing them to the combiner.",
      |args| {
         let [combiner] = args.exact::<1>()?;

         if combiner.is_combiner() {
            Ok(Value::wrap(combiner))
         } else {
            Err(Error::Decode {
               value: combiner.to_string(),
               have:  combiner.type_name(),
               need:  "combiner",
            })
         }
      },
   );

   func(
      scope,
      "unwrap",
      "returns the combiner underneath an applicative",
      |args| {
         let [applicative] = args.exact::<1>()?;

         match *applicative.bare() {
            Value::Wrapped(ref combiner) => Ok(Value::clone(combiner)),
            ref other => {
               Err(Error::Decode {
                  value: other.to_string(),
                  have:  other.type_name(),
                  need:  "applicative",
               })
            },
         }
      },
   );

   func_cont(
      scope,
      "eval",
      "evaluates a form in a scope",
      |ctx, args, cont| {
         let [form, scope] = try_cont!(cont, args.exact::<2>());
         let scope = try_cont!(cont, scope.decode::<Scope>());

         form.eval(ctx, &scope, cont)
      },
   );

   func(
      scope,
      "make-scope",
      "builds an empty scope with the given parents\n\nLookups search the parents depth first, in order.",
      |args| Ok(Value::Scope(Scope::new(args.all_as::<Scope>()?))),
   );

   func(
      scope,
      "bind",
      "binds a pattern against a value in a scope\n\nReturns true when the value matched, false otherwise.",
      |args| {
         let [scope, pattern, value] = args.exact::<3>()?;
         let scope = scope.decode::<Scope>()?;

         match bind(&scope, &pattern, &value) {
            Ok(()) => Ok(Value::Bool(true)),
            Err(Error::BindMismatch { .. } | Error::CannotBind { .. }) => Ok(Value::Bool(false)),
            Err(error) => Err(error),
         }
      },
   );

   op(
      scope,
      "get-current-scope",
      "returns the scope it is called in",
      |_, args, scope, cont| {
         try_cont!(cont, args.exact::<0>());
         cont.call(Ok(Value::Scope(scope.clone())))
      },
   );

   op(
      scope,
      "commentary",
      "returns the standalone comments recorded in the current scope",
      |_, args, scope, cont| {
         try_cont!(cont, args.exact::<0>());

         cont.call(Ok(Value::list(
            scope
               .commentary()
               .into_iter()
               .map(Value::String)
               .collect::<Vec<_>>(),
         )))
      },
   );

   op(
      scope,
      "doc",
      "prints the documentation of the given symbols\n\nWithout arguments, documents every binding of the current scope.",
      |ctx, args, scope, cont| {
         let names = if args.is_empty() {
            for comment in scope.commentary() {
               ctx.log(&comment);
               ctx.log("");
            }

            scope
               .bindings()
               .into_iter()
               .map(|(name, _)| name)
               .filter(|name| scope.doc(name).is_some())
               .collect()
         } else {
            let names = args
               .all()
               .iter()
               .map(|name| {
                  name.as_symbol().cloned().ok_or_else(|| {
                     Error::Decode {
                        value: name.to_string(),
                        have:  name.type_name(),
                        need:  "symbol",
                     }
                  })
               })
               .collect::<Result<Vec<_>>>();

            try_cont!(cont, names)
         };

         print_docs(ctx, scope, &names);
         cont.call(Ok(Value::Null))
      },
   );

   func(
      scope,
      "meta",
      "returns the metadata attached to a value, or null",
      |args| {
         let [value] = args.exact::<1>()?;

         Ok(match value {
            Value::Annotated(ref annotated) => annotated.meta.clone().into(),
            _ => Value::Null,
         })
      },
   );

   func(
      scope,
      "with-meta",
      "returns the value with the scope attached as its metadata\n\nExisting metadata stays visible underneath.",
      |args| {
         let [value, meta] = args.exact::<2>()?;
         let meta = meta.decode::<Scope>()?;

         let meta = match value {
            Value::Annotated(ref annotated) => {
               match annotated.meta {
                  Some(ref old) => Scope::new([meta, old.clone()]),
                  None => meta,
               }
            },
            _ => meta,
         };

         Ok(Value::Annotated(Arc::new(Annotated {
            value:   value.bare().clone(),
            range:   None,
            comment: None,
            meta:    Some(meta),
         })))
      },
   );

   func_cont(
      scope,
      "dump",
      "writes a value to stderr as JSON and returns it",
      |ctx, args, cont| {
         let [value] = try_cont!(cont, args.exact::<1>());
         let json = try_cont!(cont, json::to_json(&value));

         ctx.log(&serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string()));
         cont.call(Ok(value))
      },
   );

   func(
      scope,
      "json",
      "returns a string holding the value encoded as JSON",
      |args| {
         let [value] = args.exact::<1>()?;
         json::to_string(&value).map(Value::string)
      },
   );

   func_cont(
      scope,
      "log",
      "logs a string or any other value to stderr and returns it",
      |ctx, args, cont| {
         let [value] = try_cont!(cont, args.exact::<1>());
         let message = message(&value);

         tracing::info!("{message}");
         ctx.log(&message);

         cont.call(Ok(value))
      },
   );

   func_cont(
      scope,
      "logf",
      "logs a message formatted with the given values\n\n%s, %d and %v are replaced with the arguments in order.",
      |ctx, args, cont| {
         let ([template], args) = try_cont!(cont, args.at_least::<1>());
         let template = try_cont!(cont, template.decode::<ArcStr>());
         let message = format(&template, &args);

         tracing::info!("{message}");
         ctx.log(&message);

         cont.call(Ok(Value::Null))
      },
   );

   func(
      scope,
      "now",
      "returns the current UTC time truncated to the given number of seconds\n\nUsed to make thunks that should rerun after a while differ.",
      |args| {
         let [seconds] = args.exact::<1>()?;
         let seconds = seconds.decode::<i64>()?;

         let now = chrono::Utc::now().timestamp();
         let truncated = if seconds > 0 { now - now.rem_euclid(seconds) } else { now };

         chrono::DateTime::from_timestamp(truncated, 0)
            .map(|time| {
               Value::string(time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
            })
            .ok_or_else(|| Error::message(format!("timestamp {truncated} is out of range")))
      },
   );

   func(scope, "error", "fails with the given message", |args| {
      let [message] = args.exact::<1>()?;
      Err(Error::Message(message.decode::<ArcStr>()?.to_string()))
   });

   func(
      scope,
      "errorf",
      "fails with a message formatted with the given values",
      |args| {
         let ([template], args) = args.at_least::<1>()?;
         let template = template.decode::<ArcStr>()?;

         Err(Error::Message(format(&template, &args)))
      },
   );

   func(scope, "cons", "builds a pair out of a head and a tail", |args| {
      let [head, tail] = args.exact::<2>()?;
      Ok(Value::pair(head, tail))
   });

   func_cont(
      scope,
      "reduce-kv",
      "reduces a scope\n\nCalls the function with the accumulator, the key and the value of every binding, in order.",
      |ctx, args, cont| {
         let [function, init, kv] = try_cont!(cont, args.exact::<3>());
         let kv = try_cont!(cont, kv.decode::<Scope>());

         reduce_kv(ctx, function, init, kv.bindings().into(), 0, cont)
      },
   );

   func(
      scope,
      "assoc",
      "returns a copy of the scope with keys bound to values\n\nTakes a scope followed by alternating keys and values.",
      |args| {
         let ([scope], kvs) = args.at_least::<1>()?;
         let scope = scope.decode::<Scope>()?;

         let copy = Scope::new(scope.parents().iter().cloned());
         for (name, value) in scope.bindings() {
            copy.set(name, value);
         }

         let mut kvs = kvs.into_iter();
         while let Some(name) = kvs.next() {
            let name = key(&name)?;

            let Some(value) = kvs.next() else {
               return Err(Error::BindMismatch {
                  need: format!("a value for :{name}"),
                  have: "end of arguments".to_owned(),
               });
            };

            copy.set(name, value);
         }

         Ok(Value::Scope(copy))
      },
   );
}
