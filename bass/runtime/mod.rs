//! The Bass language runtime.
//!
//! Source text is read into [`Value`]s, which are evaluated in continuation
//! passing style against a [`Scope`] descending from [`ground::ground`].
//! Thunks built along the way are dispatched to a [`runtime::Runtime`] picked
//! by the [`runtime::Pool`] for their platform.

pub mod bind;

pub mod command;

pub mod config;

mod cont;
pub use cont::{
   Cont,
   ReadyCont,
   trampoline,
};

mod context;
pub use context::{
   Context,
   Output,
};

mod error;
pub use error::{
   Error,
   Result,
};

pub mod ground;

pub mod protocol;

pub mod read;

pub mod runtime;

mod scope;
pub use scope::Scope;

pub mod std_fs;

pub mod thunk;
pub use thunk::Thunk;

mod trace;
pub use trace::{
   DEFAULT_TRACE_SIZE,
   INTERNAL_FILE_PREFIX,
   Trace,
};

pub mod value;
pub use value::Value;

/// Evaluates a value to completion.
pub async fn eval(ctx: &Context, value: &Value, scope: &Scope) -> Result<Value> {
   trampoline(ctx, value.eval(ctx, scope, Cont::identity())).await
}

/// Reads every form in the source and evaluates them in order, returning the
/// value of the last one.
pub async fn eval_source(ctx: &Context, scope: &Scope, file: &str, source: &str) -> Result<Value> {
   let forms = read::read_all(file, source)?;

   let mut result = Value::Null;
   for form in &forms {
      result = eval(ctx, form, scope).await?;
   }

   Ok(result)
}
