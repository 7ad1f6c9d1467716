//! Span, position and range type definitions.

mod position;
pub use position::{
   Position,
   PositionStr,
};

mod range;
pub use range::Range;

mod span;
pub use span::{
   IntoSpan,
   Span,
   Spanned,
};
