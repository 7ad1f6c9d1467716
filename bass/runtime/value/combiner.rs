use std::{
   fmt,
   sync::Arc,
};

use arcstr::ArcStr;

use crate::{
   Context,
   Cont,
   Error,
   ReadyCont,
   Result,
   Scope,
   Value,
   bind::bind,
   value::FromValue,
};

/// A combiner defined in Bass with `op`.
#[derive(Debug)]
pub struct Operative {
   pub scope:   Scope,
   pub formals: Value,
   pub eformal: Value,
   pub body:    Value,
}

impl Operative {
   /// Binds the unevaluated arguments and the caller's scope in a child of the
   /// defining scope, then evaluates the body there.
   pub(crate) fn call(&self, ctx: &Context, args: &Value, caller: &Scope, cont: Cont) -> ReadyCont {
      let scope = Scope::new([self.scope.clone()]);

      let bound = bind(&scope, &self.formals, args)
         .and_then(|()| bind(&scope, &self.eformal, &Value::Scope(caller.clone())));

      if let Err(error) = bound {
         return cont.call(Err(error));
      }

      self.body.eval(ctx, &scope, cont)
   }
}

type Function = dyn Fn(&Context, Value, &Scope, Cont) -> ReadyCont + Send + Sync;

/// A combiner implemented natively. It receives its arguments as given; an
/// applicative builtin is one wrapped in [`Value::Wrapped`].
pub struct Builtin {
   pub name: ArcStr,
   function: Box<Function>,
}

impl fmt::Debug for Builtin {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<builtin: {name}>", name = self.name)
   }
}

impl Builtin {
   #[must_use]
   pub fn new(
      name: impl Into<ArcStr>,
      function: impl Fn(&Context, Value, &Scope, Cont) -> ReadyCont + Send + Sync + 'static,
   ) -> Self {
      Self {
         name:     name.into(),
         function: Box::new(function),
      }
   }

   pub(crate) fn call(&self, ctx: &Context, args: Value, scope: &Scope, cont: Cont) -> ReadyCont {
      (self.function)(ctx, args, scope, cont)
   }
}

/// The arguments of a builtin call, with arity checks that report the
/// builtin's name.
pub struct Args {
   name:  ArcStr,
   items: Vec<Value>,
}

impl Args {
   pub fn new(name: &ArcStr, args: &Value) -> Result<Self> {
      Ok(Self {
         name:  name.clone(),
         items: args.to_vec()?,
      })
   }

   #[must_use]
   pub fn len(&self) -> usize {
      self.items.len()
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.items.is_empty()
   }

   fn arity(&self, need: usize, variadic: bool) -> Error {
      Error::Arity {
         name: self.name.clone(),
         need,
         have: self.items.len(),
         variadic,
      }
   }

   /// Every argument.
   #[must_use]
   pub fn all(self) -> Vec<Value> {
      self.items
   }

   /// Every argument, decoded.
   pub fn all_as<T: FromValue>(self) -> Result<Vec<T>> {
      self.items.iter().map(Value::decode).collect()
   }

   /// Exactly `N` arguments.
   pub fn exact<const N: usize>(self) -> Result<[Value; N]> {
      let error = self.arity(N, false);
      self.items.try_into().map_err(|_| error)
   }

   /// At least `N` arguments, and the rest.
   pub fn at_least<const N: usize>(mut self) -> Result<([Value; N], Vec<Value>)> {
      if self.items.len() < N {
         return Err(self.arity(N, true));
      }

      let rest = self.items.split_off(N);
      let error = self.arity(N, true);
      let required = self.items.try_into().map_err(|_| error)?;

      Ok((required, rest))
   }

   /// `N` arguments followed by an optional one.
   pub fn optional<const N: usize>(self) -> Result<([Value; N], Option<Value>)> {
      if self.items.len() > N + 1 {
         return Err(self.arity(N + 1, false));
      }

      let (required, mut rest) = self.at_least::<N>()?;
      Ok((required, rest.pop()))
   }
}
