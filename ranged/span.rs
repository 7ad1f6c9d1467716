use std::{
   cmp,
   fmt,
   ops,
};

use derive_more::{
   Deref,
   DerefMut,
};

/// The byte span of a source code element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
   /// The start of the span.
   pub start: u32,
   /// The end of the span, this is not included in the span itself, as it is
   /// an exclusive span.
   pub end:   u32,
}

impl fmt::Display for Span {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "{start}..{end}", start = self.start, end = self.end)
   }
}

impl Span {
   /// Creates a new [`Span`].
   #[inline]
   #[must_use]
   pub fn new(start: u32, end: u32) -> Self {
      Self { start, end }
   }

   /// Creates a new dummy [`Span`].
   #[inline]
   #[must_use]
   pub fn dummy() -> Self {
      Self::new(0, 0)
   }

   /// Creates a span that starts at the given offset and is of the given len,
   /// from that point onwards.
   #[inline]
   #[must_use]
   pub fn at(start: u32, len: u32) -> Self {
      Self::new(start, start + len)
   }

   /// Creates a span that starts and ends at the given offset, while having a
   /// len of zero.
   #[inline]
   #[must_use]
   pub fn empty(start: u32) -> Self {
      Self::new(start, start)
   }

   /// Turns this span into a [`ops::Range<usize>`].
   #[inline]
   #[must_use]
   pub fn into_std(self) -> ops::Range<usize> {
      ops::Range::from(self)
   }

   /// Returns the len of this span.
   #[inline]
   #[must_use]
   pub fn len(self) -> u32 {
      self.end - self.start
   }

   /// Whether or not this span has a len of 0.
   #[inline]
   #[must_use]
   pub fn is_empty(self) -> bool {
      self.start == self.end
   }

   /// Checks if this span completely contains another span.
   #[inline]
   #[must_use]
   pub fn contains(self, that: Self) -> bool {
      self.start <= that.start && that.end <= self.end
   }

   /// Checks if this span contains a specific offset.
   #[inline]
   #[must_use]
   pub fn contains_offset(self, offset: u32) -> bool {
      self.start <= offset && offset < self.end
   }

   /// Calculates the smallest span that covers both this span and another
   /// span.
   #[inline]
   #[must_use]
   pub fn cover(self, that: Self) -> Self {
      Self::new(cmp::min(self.start, that.start), cmp::max(self.end, that.end))
   }
}

impl From<Span> for ops::Range<usize> {
   fn from(this: Span) -> Self {
      this.start as usize..this.end as usize
   }
}

impl From<ops::Range<usize>> for Span {
   fn from(that: ops::Range<usize>) -> Self {
      Self {
         start: that.start as u32,
         end:   that.end as u32,
      }
   }
}

#[derive(Deref, DerefMut, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Spanned<T> {
   pub span:  Span,
   #[deref]
   #[deref_mut]
   pub value: T,
}

impl<T> Spanned<T> {
   pub fn new(span: Span, value: T) -> Self {
      Self { span, value }
   }

   pub fn map<U>(self, function: impl FnOnce(T) -> U) -> Spanned<U> {
      Spanned {
         span:  self.span,
         value: function(self.value),
      }
   }

   pub fn as_ref(&self) -> Spanned<&T> {
      Spanned {
         span:  self.span,
         value: &self.value,
      }
   }
}

/// A trait to extract [`Span`] from types that relate to source code and have
/// spans.
pub trait IntoSpan {
   fn span(&self) -> Span;
}

impl<T> IntoSpan for Spanned<T> {
   fn span(&self) -> Span {
      self.span
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn cover_and_contains() {
      let left = Span::new(2, 5);
      let right = Span::at(4, 6);

      assert_eq!(left.cover(right), Span::new(2, 10));
      assert!(left.cover(right).contains(left));
      assert!(!left.contains(right));
      assert!(right.contains_offset(9));
      assert!(!right.contains_offset(10));
      assert_eq!(right.len(), 6);
      assert!(Span::empty(3).is_empty());
   }

   #[test]
   fn spanned_map_keeps_span() {
      let spanned = Spanned::new(Span::new(1, 4), "abc");
      let mapped = spanned.map(str::len);

      assert_eq!(mapped.span(), Span::new(1, 4));
      assert_eq!(*mapped, 3);
   }
}
