use super::func;
use crate::{
   Error,
   Scope,
   Value,
};

/// Registers a comparison that holds when every adjacent pair of numbers
/// does.
fn comparison(scope: &Scope, name: &'static str, doc: &str, holds: fn(i64, i64) -> bool) {
   func(scope, name, doc, move |args| {
      let ([first], rest) = args.at_least::<1>()?;

      let mut previous = first.decode::<i64>()?;
      for number in rest {
         let number = number.decode::<i64>()?;

         if !holds(previous, number) {
            return Ok(Value::Bool(false));
         }

         previous = number;
      }

      Ok(Value::Bool(true))
   });
}

pub(super) fn register(scope: &Scope) {
   func(scope, "+", "sums numbers", |args| {
      Ok(Value::Int(
         args
            .all_as::<i64>()?
            .into_iter()
            .fold(0, i64::wrapping_add),
      ))
   });

   func(scope, "*", "multiplies numbers", |args| {
      Ok(Value::Int(
         args
            .all_as::<i64>()?
            .into_iter()
            .fold(1, i64::wrapping_mul),
      ))
   });

   func(
      scope,
      "-",
      "subtracts the rest of the numbers from the first\n\nWith a single number, negates it.",
      |args| {
         let ([first], rest) = args.at_least::<1>()?;
         let first = first.decode::<i64>()?;

         if rest.is_empty() {
            return Ok(Value::Int(first.wrapping_neg()));
         }

         let mut difference = first;
         for number in rest {
            difference = difference.wrapping_sub(number.decode::<i64>()?);
         }

         Ok(Value::Int(difference))
      },
   );

   func(
      scope,
      "quot",
      "divides a number by a denominator, truncating toward zero",
      |args| {
         let [number, denominator] = args.exact::<2>()?;
         let (number, denominator) = (number.decode::<i64>()?, denominator.decode::<i64>()?);

         number
            .checked_div(denominator)
            .map(Value::Int)
            .ok_or_else(|| Error::message(format!("cannot divide {number} by {denominator}")))
      },
   );

   func(scope, "max", "returns the largest number", |args| {
      let ([first], rest) = args.at_least::<1>()?;
      let mut max = first.decode::<i64>()?;

      for number in rest {
         max = max.max(number.decode::<i64>()?);
      }

      Ok(Value::Int(max))
   });

   func(scope, "min", "returns the smallest number", |args| {
      let ([first], rest) = args.at_least::<1>()?;
      let mut min = first.decode::<i64>()?;

      for number in rest {
         min = min.min(number.decode::<i64>()?);
      }

      Ok(Value::Int(min))
   });

   func(
      scope,
      "=",
      "returns true if every value equals the first",
      |args| {
         let ([first], rest) = args.at_least::<1>()?;
         Ok(Value::Bool(rest.iter().all(|other| *other == first)))
      },
   );

   comparison(
      scope,
      ">",
      "returns true if the numbers are in descending order",
      |a, b| a > b,
   );
   comparison(
      scope,
      ">=",
      "returns true if the numbers never increase",
      |a, b| a >= b,
   );
   comparison(
      scope,
      "<",
      "returns true if the numbers are in ascending order",
      |a, b| a < b,
   );
   comparison(
      scope,
      "<=",
      "returns true if the numbers never decrease",
      |a, b| a <= b,
   );
}
