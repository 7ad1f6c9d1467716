use std::sync::Arc;

use crate::{
   Context,
   Cont,
   Error,
   ReadyCont,
   Scope,
   Value,
   thunk::Thunk,
   value::{
      FileOrDirPath,
      FromValue as _,
   },
};

impl Value {
   /// Evaluates the value in the scope, passing the result to the
   /// continuation.
   pub fn eval(&self, ctx: &Context, scope: &Scope, cont: Cont) -> ReadyCont {
      match *self {
         Self::Symbol(ref name) => {
            cont.call(scope.get(name).ok_or_else(|| Error::Unbound { name: name.clone() }))
         },

         Self::Annotated(ref annotated) => annotated.eval(ctx, scope, cont),

         Self::Pair(ref pair) => {
            let ctx_ = ctx.clone();
            let scope_ = scope.clone();
            let args = pair.tail.clone();

            pair.head.eval(
               ctx,
               scope,
               Cont::new(move |combiner| combiner.call(&ctx_, &args, &scope_, cont.clone())),
            )
         },

         Self::Cons(ref pair) => {
            let ctx_ = ctx.clone();
            let scope_ = scope.clone();
            let tail = pair.tail.clone();

            pair.head.eval(
               ctx,
               scope,
               Cont::new(move |head| {
                  let cont = cont.clone();

                  tail.eval(
                     &ctx_,
                     &scope_,
                     Cont::new(move |tail| cont.call(Ok(Self::pair(head.clone(), tail)))),
                  )
               }),
            )
         },

         Self::Bind(ref items) => eval_bind(ctx, scope, items.clone(), cont),

         Self::ExtendPath(ref extend) => {
            let child = extend.child.clone();

            extend.parent.eval(
               ctx,
               scope,
               Cont::new(move |parent| cont.call(parent.extend(&child))),
            )
         },

         Self::ReadyContinuation(ref ready) => ready.0.call(Ok(ready.1.clone())),

         _ => cont.call(Ok(self.clone())),
      }
   }

   /// Calls the value as a combiner with the unevaluated arguments.
   pub fn call(&self, ctx: &Context, args: &Self, scope: &Scope, cont: Cont) -> ReadyCont {
      match *self.bare() {
         Self::Operative(ref operative) => operative.call(ctx, args, scope, cont),

         Self::Builtin(ref builtin) => builtin.call(ctx, args.clone(), scope, cont),

         Self::Wrapped(ref combiner) => {
            let ctx_ = ctx.clone();
            let scope_ = scope.clone();
            let combiner = combiner.clone();

            args.to_cons_spine().eval(
               ctx,
               scope,
               Cont::new(move |args| combiner.call(&ctx_, &args, &scope_, cont.clone())),
            )
         },

         // Everything below is applicative.
         ref value => {
            let ctx_ = ctx.clone();
            let value = value.clone();

            args.to_cons_spine().eval(
               ctx,
               scope,
               Cont::new(move |args| value.apply(&ctx_, &args, cont.clone())),
            )
         },
      }
   }

   /// Whether calling the value runs it as a command.
   fn is_runnable(&self) -> bool {
      match *self {
         Self::CommandPath(_) | Self::FilePath(_) => true,
         Self::HostPath(ref host) => !host.path.is_dir(),
         Self::FsPath(ref fs) => !fs.path.is_dir(),
         Self::ThunkPath(ref path) => !path.path.is_dir(),
         _ => false,
      }
   }

   /// Calls a callable non-combiner value with evaluated arguments.
   fn apply(&self, ctx: &Context, args: &Self, cont: Cont) -> ReadyCont {
      let args = match args.to_vec() {
         Ok(args) => args,
         Err(error) => return cont.call(Err(error)),
      };

      match *self {
         // (:key scope) or (:key scope default)
         Self::Keyword(ref key) => {
            let (scope, default) = match *args.as_slice() {
               [ref scope] => (scope, None),
               [ref scope, ref default] => (scope, Some(default)),
               _ => {
                  return cont.call(Err(Error::Arity {
                     name:     arcstr::format!(":{key}"),
                     need:     1,
                     have:     args.len(),
                     variadic: true,
                  }));
               },
            };

            let scope = match scope.decode::<Scope>() {
               Ok(scope) => scope,
               Err(error) => return cont.call(Err(error)),
            };

            let result = match (scope.get(key), default) {
               (Some(value), _) => Ok(value),
               (None, Some(default)) => Ok(default.clone()),
               (None, None) => Err(Error::Unbound { name: key.clone() }),
            };

            cont.call(result)
         },

         // Running a command or file builds a thunk.
         ref path if path.is_runnable() => {
            cont.call(Thunk::from_command(path, args).map(|thunk| Self::Thunk(Arc::new(thunk))))
         },

         // Calling a directory extends it.
         Self::DirPath(_) | Self::HostPath(_) | Self::FsPath(_) | Self::ThunkPath(_) => {
            let [ref child] = *args.as_slice() else {
               return cont.call(Err(Error::Arity {
                  name:     self.to_string().into(),
                  need:     1,
                  have:     args.len(),
                  variadic: false,
               }));
            };

            cont.call(
               FileOrDirPath::from_value(child.bare())
                  .ok_or_else(|| {
                     Error::Decode {
                        value: child.to_string(),
                        have:  child.type_name(),
                        need:  "file or dir path",
                     }
                  })
                  .and_then(|child| self.extend(&child)),
            )
         },

         // Calling a thunk runs it, returning its response as a source.
         Self::Thunk(ref thunk) => {
            if !args.is_empty() {
               return cont.call(Err(Error::Arity {
                  name:     thunk.to_string().into(),
                  need:     0,
                  have:     args.len(),
                  variadic: false,
               }));
            }

            let ctx = ctx.clone();
            let thunk = thunk.clone();

            cont.suspend(async move { ctx.pool.read(&ctx, &thunk).await.map(Self::Source) })
         },

         // Calling a continuation resumes it.
         Self::Continuation(ref resumed) => {
            let [ref value] = *args.as_slice() else {
               return cont.call(Err(Error::Arity {
                  name:     arcstr::literal!("continuation"),
                  need:     1,
                  have:     args.len(),
                  variadic: false,
               }));
            };

            resumed.call(Ok(value.clone()))
         },

         ref other => {
            cont.call(Err(Error::Decode {
               value: other.to_string(),
               have:  other.type_name(),
               need:  "combiner",
            }))
         },
      }
   }
}

/// `{...}` evaluates each form in a child scope. Keywords and symbols name
/// the next value; a form that evaluates to a scope becomes a parent.
fn eval_bind(ctx: &Context, scope: &Scope, items: Arc<[Value]>, cont: Cont) -> ReadyCont {
   let child = Scope::new([scope.clone()]);

   Value::cons_list(items.iter().cloned()).eval(
      ctx,
      &child,
      Cont::new(move |values| cont.call(values.to_vec().and_then(build_scope))),
   )
}

fn build_scope(values: Vec<Value>) -> crate::Result<Value> {
   let mut parents = Vec::new();
   let mut bindings = Vec::new();

   let mut values = values.into_iter();
   while let Some(value) = values.next() {
      match *value.bare() {
         Value::Scope(ref parent) => parents.push(parent.clone()),

         Value::Keyword(ref name) | Value::Symbol(ref name) => {
            let Some(bound) = values.next() else {
               return Err(Error::BindMismatch {
                  need: format!("a value for :{name}"),
                  have: "end of bind".to_owned(),
               });
            };

            bindings.push((name.clone(), bound));
         },

         ref other => {
            return Err(Error::BadKey {
               value: other.to_string(),
            });
         },
      }
   }

   let scope = Scope::new(parents);
   for (name, value) in bindings {
      scope.set(name, value);
   }

   Ok(Value::Scope(scope))
}
