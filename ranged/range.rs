use std::fmt;

use arcstr::ArcStr;

use crate::Position;

/// A range of positions within a named source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Range {
   pub file:  ArcStr,
   pub start: Position,
   pub end:   Position,
}

impl fmt::Display for Range {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "{file}:{start}..{end}", file = self.file, start = self.start, end = self.end)
   }
}

impl Range {
   #[must_use]
   pub fn new(file: ArcStr, start: Position, end: Position) -> Self {
      Self { file, start, end }
   }

   /// Whether this range lies entirely within the other one.
   #[must_use]
   pub fn is_within(&self, outer: &Self) -> bool {
      self.file == outer.file && outer.start <= self.start && self.end <= outer.end
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn position(line: u32, column: u32) -> Position {
      Position { line, column }
   }

   #[test]
   fn within() {
      let outer = Range::new(arcstr::literal!("a.bass"), position(1, 1), position(3, 4));
      let inner = Range::new(arcstr::literal!("a.bass"), position(2, 1), position(2, 9));
      let elsewhere = Range::new(arcstr::literal!("b.bass"), position(2, 1), position(2, 9));

      assert!(inner.is_within(&outer));
      assert!(!outer.is_within(&inner));
      assert!(!elsewhere.is_within(&outer));
   }

   #[test]
   fn display() {
      let range = Range::new(arcstr::literal!("a.bass"), position(1, 2), position(1, 7));

      assert_eq!(range.to_string(), "a.bass:1:2..1:7");
   }
}
