use crate::{
   Error,
   Result,
   Value,
};

/// A list cell, shared by [`Value::Pair`] and [`Value::Cons`].
#[derive(Debug)]
pub struct Pair {
   pub head: Value,
   pub tail: Value,
}

/// Iterates the heads of a list, looking through annotations. Stops at the
/// first tail that is not a cell, which [`List::rest`] then returns.
pub struct List<'a> {
   current: &'a Value,
}

impl<'a> Iterator for List<'a> {
   type Item = &'a Value;

   fn next(&mut self) -> Option<Self::Item> {
      match *self.current.bare() {
         Value::Pair(ref pair) | Value::Cons(ref pair) => {
            self.current = &pair.tail;
            Some(&pair.head)
         },

         _ => None,
      }
   }
}

impl<'a> List<'a> {
   #[must_use]
   pub fn rest(&self) -> &'a Value {
      self.current.bare()
   }
}

impl Value {
   #[must_use]
   pub fn iter_list(&self) -> List<'_> {
      List { current: self }
   }

   /// Whether this is a proper list, ending in [`Value::Empty`].
   #[must_use]
   pub fn is_list(&self) -> bool {
      let mut list = self.iter_list();
      list.by_ref().for_each(drop);
      matches!(*list.rest(), Value::Empty)
   }

   /// The items of a proper list.
   pub fn to_vec(&self) -> Result<Vec<Self>> {
      let mut list = self.iter_list();
      let items = list.by_ref().cloned().collect();

      match *list.rest() {
         Value::Empty => Ok(items),
         _ => {
            Err(Error::Decode {
               value: self.to_string(),
               have:  self.type_name(),
               need:  "list",
            })
         },
      }
   }

   /// Rebuilds the spine of a list out of [`Value::Cons`] cells, keeping the
   /// items and the rest as they are. Evaluating the result evaluates every
   /// item instead of calling the first one.
   #[must_use]
   pub fn to_cons_spine(&self) -> Self {
      let mut list = self.iter_list();
      let items = list.by_ref().cloned().collect::<Vec<_>>();
      let rest = list.rest().clone();

      items
         .into_iter()
         .rev()
         .fold(rest, |tail, head| Self::cons(head, tail))
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn proper_and_improper() {
      let proper = Value::list([Value::Int(1), Value::Int(2)]);
      assert!(proper.is_list());
      assert_eq!(proper.to_vec().unwrap(), [Value::Int(1), Value::Int(2)]);

      let improper = Value::pair(Value::Int(1), Value::Int(2));
      assert!(!improper.is_list());
      assert!(improper.to_vec().is_err());

      assert!(Value::Empty.is_list());
      assert!(!Value::Null.is_list());
   }

   #[test]
   fn cons_spine_keeps_rest() {
      let list = Value::list_with_rest([Value::symbol("a")], Value::symbol("rest"));

      let spine = list.to_cons_spine();
      assert_eq!(
         spine,
         Value::cons(Value::symbol("a"), Value::symbol("rest"))
      );
   }
}
