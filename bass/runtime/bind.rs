//! Destructuring of values against binding patterns.

use crate::{
   Error,
   Result,
   Scope,
   Value,
   value::Symbol,
};

fn mismatch(pattern: &Value, value: &Value) -> Error {
   Error::BindMismatch {
      need: pattern.to_string(),
      have: value.to_string(),
   }
}

/// Binds the pattern against the value in the scope.
///
/// Symbols bind, `_` discards, `()` only matches `()`, cells destructure
/// lists and constants must match exactly.
pub fn bind(scope: &Scope, pattern: &Value, value: &Value) -> Result<()> {
   match *pattern {
      Value::Annotated(ref annotated) => {
         bind(scope, &annotated.value, value)?;

         for symbol in symbols(&annotated.value) {
            scope.annotate(&symbol, annotated.comment.clone(), annotated.range.as_ref());
         }

         Ok(())
      },

      Value::Symbol(ref name) => {
         scope.set(name.clone(), value.clone());
         Ok(())
      },

      Value::Ignore => Ok(()),

      Value::Empty => {
         match *value.bare() {
            Value::Empty => Ok(()),
            _ => Err(mismatch(pattern, value)),
         }
      },

      Value::Pair(ref cell) | Value::Cons(ref cell) => {
         match *value.bare() {
            Value::Pair(ref pair) | Value::Cons(ref pair) => {
               bind(scope, &cell.head, &pair.head)?;
               bind(scope, &cell.tail, &pair.tail)
            },

            _ => Err(mismatch(pattern, value)),
         }
      },

      Value::Keyword(_) | Value::Int(_) | Value::String(_) | Value::Bool(_) | Value::Null => {
         if pattern == value {
            Ok(())
         } else {
            Err(mismatch(pattern, value))
         }
      },

      _ => {
         Err(Error::CannotBind {
            pattern: pattern.to_string(),
         })
      },
   }
}

/// Every symbol a pattern would bind, in order.
#[must_use]
pub fn symbols(pattern: &Value) -> Vec<Symbol> {
   fn collect(pattern: &Value, symbols: &mut Vec<Symbol>) {
      match *pattern.bare() {
         Value::Symbol(ref name) => symbols.push(name.clone()),

         Value::Pair(ref cell) | Value::Cons(ref cell) => {
            collect(&cell.head, symbols);
            collect(&cell.tail, symbols);
         },

         _ => {},
      }
   }

   let mut symbols = Vec::new();
   collect(pattern, &mut symbols);
   symbols
}
