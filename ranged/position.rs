use std::{
   fmt,
   ops,
   sync::OnceLock,
};

use smallvec::SmallVec;
use unicode_width::UnicodeWidthStr as _;

use crate::Span;

/// A position in a source file.
#[derive(
   Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub struct Position {
   /// The line number. One indexed.
   pub line:   u32,
   /// The column. One indexed, but zero means we are at the newline.
   ///
   /// The column is not a raw byte index, but a display width.
   pub column: u32,
}

impl fmt::Display for Position {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "{line}:{column}", line = self.line, column = self.column)
   }
}

/// A string that can map byte offsets to [`Position`]s. Newline offsets are
/// computed lazily on first use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionStr<'a> {
   content:  &'a str,
   newlines: OnceLock<SmallVec<u32, 16>>,
}

impl<'a> ops::Deref for PositionStr<'a> {
   type Target = &'a str;

   fn deref(&self) -> &Self::Target {
      &self.content
   }
}

impl<'a> PositionStr<'a> {
   #[must_use]
   pub fn new(content: &'a str) -> Self {
      Self {
         content,
         newlines: OnceLock::new(),
      }
   }

   #[must_use]
   pub fn position(&self, offset: u32) -> Position {
      let newlines = self.newlines.get_or_init(|| {
         self
            .content
            .bytes()
            .enumerate()
            .filter_map(|(index, c)| (c == b'\n').then_some(index as u32))
            .collect()
      });

      match newlines.binary_search(&offset) {
         Ok(line_index) | Err(line_index) => {
            let line_start = if line_index == 0 {
               0
            } else {
               newlines[line_index - 1] + 1
            };

            Position {
               line:   line_index as u32 + 1,
               column: self.content[Span::new(line_start, offset).into_std()].width() as u32 + 1,
            }
         },
      }
   }

   #[must_use]
   pub fn positions(&self, span: Span) -> (Position, Position) {
      (self.position(span.start), self.position(span.end))
   }

   /// Returns the full text of the given one indexed line, without the
   /// trailing newline.
   #[must_use]
   pub fn line(&self, line: u32) -> Option<&'a str> {
      self.content.lines().nth(line.checked_sub(1)? as usize)
   }
}

#[cfg(test)]
mod tests {
   use proptest::prelude::*;

   use super::*;

   #[test]
   fn test_position() {
      let mut source;

      macro_rules! assert_span {
         (
            $range:expr =>
            $slice:literal,($start_line:literal : $start_column:literal),($end_line:literal : $end_column:literal)
         ) => {
            assert_eq!(&source[$range], $slice);

            let (start, end) = source.positions(Span::new($range.start as u32, $range.end as u32));

            assert_eq!(start, Position {
               line:   $start_line,
               column: $start_column,
            });
            assert_eq!(end, Position {
               line:   $end_line,
               column: $end_column,
            });
         };
      }

      source = PositionStr::new("(def a\n  1)");
      assert_span!(0..7 => "(def a\n", (1:1), (2:1));
      assert_span!(1..4 => "def", (1:2), (1:5));
      assert_span!(9..10 => "1", (2:3), (2:4));

      source = PositionStr::new("\"æ\" b");
      assert_span!(5..6 => "b", (1:5), (1:6));
   }

   #[test]
   fn line_lookup() {
      let source = PositionStr::new("one\ntwo\nthree");

      assert_eq!(source.line(2), Some("two"));
      assert_eq!(source.line(0), None);
      assert_eq!(source.line(4), None);
   }

   proptest! {
      #[test]
      fn ascii_positions_count_lines(content in "[a-z \n]{0,64}", offset in 0_usize..64) {
         let offset = offset.min(content.len());
         let source = PositionStr::new(&content);

         let before = &content[..offset];
         let line_start = before.rfind('\n').map_or(0, |index| index + 1);

         prop_assert_eq!(source.position(offset as u32), Position {
            line:   before.matches('\n').count() as u32 + 1,
            column: (offset - line_start) as u32 + 1,
         });
      }
   }
}
