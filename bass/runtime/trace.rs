use std::{
   io,
   sync::{
      Arc,
      Mutex,
      PoisonError,
   },
};

use yansi::Paint as _;

use crate::value::Annotated;

pub const DEFAULT_TRACE_SIZE: usize = 100;

/// Source files whose frames are elided when writing a trace.
pub const INTERNAL_FILE_PREFIX: &str = "<std>/";

const EXPRESSION_WIDTH: usize = 40;

struct TraceInner {
   /// Each frame along with the depth it was recorded at.
   frames:  Box<[Option<(usize, Arc<Annotated>)>]>,
   written: usize,
   depth:   usize,
}

/// A fixed size ring buffer of the forms most recently evaluated.
///
/// Recording never allocates past the capacity, so unbounded recursion only
/// keeps the most recent frames around. Popping only lowers the depth, the
/// frames stay until they are overwritten.
#[derive(Clone)]
pub struct Trace(Arc<Mutex<TraceInner>>);

impl Default for Trace {
   fn default() -> Self {
      Self::new(DEFAULT_TRACE_SIZE)
   }
}

impl Trace {
   #[must_use]
   pub fn new(capacity: usize) -> Self {
      let capacity = capacity.max(1);

      Self(Arc::new(Mutex::new(TraceInner {
         frames:  vec![None; capacity].into_boxed_slice(),
         written: 0,
         depth:   0,
      })))
   }

   fn with<T>(&self, function: impl FnOnce(&mut TraceInner) -> T) -> T {
      let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
      function(&mut inner)
   }

   #[must_use]
   pub fn capacity(&self) -> usize {
      self.with(|inner| inner.frames.len())
   }

   #[must_use]
   pub fn depth(&self) -> usize {
      self.with(|inner| inner.depth)
   }

   pub fn record(&self, frame: Arc<Annotated>) {
      self.with(|inner| {
         let index = inner.written % inner.frames.len();
         inner.frames[index] = Some((inner.depth, frame));
         inner.written += 1;
         inner.depth += 1;
      });
   }

   pub fn pop(&self, count: usize) {
      self.with(|inner| inner.depth -= count.min(inner.depth));
   }

   /// The innermost frame that has not been popped yet, if it is still in
   /// the buffer.
   #[must_use]
   pub fn top(&self) -> Option<Arc<Annotated>> {
      self.with(|inner| {
         let level = inner.depth.checked_sub(1)?;
         let capacity = inner.frames.len();

         // A later frame at the same level would have needed this one popped.
         (1..=inner.written.min(capacity)).find_map(|back| {
            match inner.frames[(inner.written - back) % capacity] {
               Some((depth, ref frame)) if depth == level => Some(frame.clone()),
               _ => None,
            }
         })
      })
   }

   /// Recorded frames, oldest first.
   #[must_use]
   pub fn frames(&self) -> Vec<Arc<Annotated>> {
      self.with(|inner| {
         let offset = inner.written % inner.frames.len();

         inner.frames[offset..]
            .iter()
            .chain(&inner.frames[..offset])
            .flatten()
            .map(|&(_, ref frame)| frame.clone())
            .collect()
      })
   }

   #[must_use]
   pub fn is_empty(&self) -> bool {
      self.with(|inner| inner.written == 0)
   }

   pub fn reset(&self) {
      self.with(|inner| {
         inner.frames.fill(None);
         inner.written = 0;
         inner.depth = 0;
      });
   }

   pub fn write(&self, writer: &mut dyn io::Write) -> io::Result<()> {
      let frames = self.frames();

      writeln!(writer, "{error} call trace (oldest first):", error = "error!".yellow())?;
      writeln!(writer)?;

      let mut elided = 0;
      for (index, frame) in frames.iter().enumerate() {
         let Some(ref range) = frame.range else {
            continue;
         };

         if range.file.starts_with(INTERNAL_FILE_PREFIX) {
            elided += 1;
            continue;
         }

         let number = frames.len() - index;

         if elided > 0 {
            let calls = if elided == 1 { "call" } else { "calls" };
            let line = format!(
               "{number:>3}. ({elided} internal {calls} elided)",
               number = number + 1
            );

            writeln!(writer, "{line}", line = line.dim())?;
            elided = 0;
         }

         let mut expression = frame.value.to_string();
         if expression.chars().count() > EXPRESSION_WIDTH {
            expression = expression.chars().take(EXPRESSION_WIDTH - 3).collect();
            expression.push_str("...");
         }

         let prefix = format!("{number:>3}. {file}:{line}", file = range.file, line = range.start.line);

         if let Some(ref comment) = frame.comment {
            for line in comment.lines() {
               let line = format!("{prefix}\t; {line}");
               writeln!(writer, "{line}", line = line.dim())?;
            }
         }

         writeln!(writer, "{prefix}\t{expression}")?;
      }

      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use proptest::prelude::*;
   use ranged::{
      Position,
      Range,
   };

   use super::*;
   use crate::Value;

   fn frame(value: Value, file: &str, line: u32, comment: Option<&str>) -> Arc<Annotated> {
      Arc::new(Annotated {
         value,
         range: Some(Range::new(
            file.into(),
            Position { line, column: 1 },
            Position { line, column: 2 },
         )),
         comment: comment.map(Into::into),
         meta: None,
      })
   }

   fn lines(trace: &Trace) -> Vec<u32> {
      trace
         .frames()
         .iter()
         .filter_map(|frame| frame.range.as_ref())
         .map(|range| range.start.line)
         .collect()
   }

   proptest! {
      #[test]
      fn ring_buffer(size in 1_usize..500, pop in 0_usize..250) {
         let trace = Trace::default();

         for index in 0..size {
            trace.record(frame(Value::Int(index as i64), "test", index as u32, None));
         }

         let start = size.saturating_sub(DEFAULT_TRACE_SIZE);
         let sequential = (0..size as u32).collect::<Vec<_>>();

         prop_assert_eq!(lines(&trace), &sequential[start..]);

         trace.pop(pop);

         prop_assert_eq!(trace.depth(), size.saturating_sub(pop));
         prop_assert_eq!(lines(&trace), &sequential[start..]);
      }
   }

   #[test]
   fn push_then_pop_all() {
      let trace = Trace::new(4);

      for index in 0..3 {
         trace.record(frame(Value::Int(index), "test", index as u32, None));
      }

      trace.pop(3);
      assert_eq!(lines(&trace), [0, 1, 2]);
      assert!(trace.top().is_none());

      for index in 3..10 {
         trace.record(frame(Value::Int(index), "test", index as u32, None));
      }

      assert_eq!(lines(&trace), [6, 7, 8, 9]);
      assert_eq!(trace.top().and_then(|top| top.range.clone()).map(|range| range.start.line), Some(9));

      trace.pop(10);
      assert_eq!(lines(&trace), [6, 7, 8, 9]);
      assert!(trace.top().is_none());

      trace.reset();
      assert!(trace.is_empty());
   }

   #[test]
   fn top_skips_popped_siblings() {
      let trace = Trace::new(8);
      let top = |trace: &Trace| trace.top().and_then(|top| top.range.clone()).map(|range| range.start.line);

      trace.record(frame(Value::Int(1), "test", 1, None));
      trace.record(frame(Value::Int(2), "test", 2, None));
      trace.pop(1);
      assert_eq!(top(&trace), Some(1));

      trace.record(frame(Value::Int(3), "test", 3, None));
      assert_eq!(top(&trace), Some(3));
      trace.pop(1);
      assert_eq!(top(&trace), Some(1));
      assert_eq!(lines(&trace), [1, 2, 3]);
   }

   #[test]
   fn write() {
      yansi::disable();

      let trace = Trace::default();
      let symbol = |name: &str| Value::Symbol(name.into());

      for line in 1..=3 {
         trace.record(frame(symbol(&format!("call-{line}")), "test", line, None));
      }

      for line in 1..=3 {
         trace.record(frame(symbol(&format!("call-{line}")), "<std>/root.bass", line, None));
      }

      trace.record(frame(symbol("flake"), "test", 42, Some("this will fail\nsomeday")));

      for line in 1..=3 {
         trace.record(frame(symbol(&format!("call-{line}")), "test", line, None));
      }

      trace.record(frame(
         symbol("a-very-long-symbol-name-that-will-not-fit-on-the-line"),
         "test",
         50,
         None,
      ));

      let mut buffer = Vec::new();
      trace.write(&mut buffer).unwrap();

      assert_eq!(
         String::from_utf8(buffer).unwrap(),
         [
            "error! call trace (oldest first):",
            "",
            " 11. test:1\tcall-1",
            " 10. test:2\tcall-2",
            "  9. test:3\tcall-3",
            "  6. (3 internal calls elided)",
            "  5. test:42\t; this will fail",
            "  5. test:42\t; someday",
            "  5. test:42\tflake",
            "  4. test:1\tcall-1",
            "  3. test:2\tcall-2",
            "  2. test:3\tcall-3",
            "  1. test:50\ta-very-long-symbol-name-that-will-not...",
            "",
         ]
         .join("\n")
      );
   }
}
