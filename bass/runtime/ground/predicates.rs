use super::func;
use crate::{
   Scope,
   Value,
};

type Check = fn(&Value) -> bool;

/// Built in predicates, one per kind of value. [`predicates`] lists the ones
/// a value satisfies when documenting it.
static PREDICATES: &[(&str, &str, Check)] = &[
   ("null?", "returns true if the value is null", |value| {
      matches!(*value, Value::Null)
   }),
   ("ignore?", "returns true if the value is _", |value| {
      matches!(*value, Value::Ignore)
   }),
   ("boolean?", "returns true if the value is true or false", |value| {
      matches!(*value, Value::Bool(_))
   }),
   ("number?", "returns true if the value is a number", |value| {
      matches!(*value, Value::Int(_))
   }),
   ("string?", "returns true if the value is a string", |value| {
      matches!(*value, Value::String(_))
   }),
   ("symbol?", "returns true if the value is a symbol", |value| {
      matches!(*value, Value::Symbol(_))
   }),
   ("keyword?", "returns true if the value is a keyword", |value| {
      matches!(*value, Value::Keyword(_))
   }),
   ("scope?", "returns true if the value is a scope", |value| {
      matches!(*value, Value::Scope(_))
   }),
   ("sink?", "returns true if values can be emitted to the value", |value| {
      matches!(*value, Value::Sink(_))
   }),
   ("source?", "returns true if values can be read from the value", |value| {
      matches!(*value, Value::Source(_))
   }),
   ("list?", "returns true if the value is a list ending in ()", Value::is_list),
   ("pair?", "returns true if the value is a pair", |value| {
      matches!(*value, Value::Pair(_) | Value::Cons(_))
   }),
   ("applicative?", "returns true if the value is an applicative", Value::is_applicative),
   ("operative?", "returns true if the value is an operative", Value::is_operative),
   ("combiner?", "returns true if the value can be called", Value::is_combiner),
   ("path?", "returns true if the value is any kind of path", Value::is_path),
   ("empty?", "returns true if the value is (), null, an empty string or an empty scope", is_empty),
   ("thunk?", "returns true if the value is a thunk", |value| {
      matches!(*value, Value::Thunk(_))
   }),
];

fn is_empty(value: &Value) -> bool {
   match *value {
      Value::Null | Value::Empty => true,
      Value::String(ref string) => string.is_empty(),
      Value::Scope(ref scope) => scope.bindings().is_empty(),
      Value::Bind(ref items) => items.is_empty(),
      _ => false,
   }
}

/// The names of every predicate the value satisfies.
#[must_use]
pub fn predicates(value: &Value) -> Vec<&'static str> {
   PREDICATES
      .iter()
      .filter(|&&(_, _, check)| check(value.bare()))
      .map(|&(name, ..)| name)
      .collect()
}

pub(super) fn register(scope: &Scope) {
   for &(name, doc, check) in PREDICATES {
      func(scope, name, doc, move |args| {
         let [value] = args.exact::<1>()?;
         Ok(Value::Bool(check(value.bare())))
      });
   }
}
