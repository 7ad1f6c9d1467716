//! Tokenizer and reader for Bass source text.
//!
//! [`tokenize`] splits text into [`Kind`]ed slices, [`Reader`] turns those
//! into spanned [`Form`] trees with attached comments. Turning forms into
//! runtime values is the runtime's job.

mod escape;
pub use escape::{
   escape,
   escape_string,
   unescape,
   unescape_string,
};

mod form;
pub use form::{
   Form,
   FormKind,
};

mod kind;
pub use kind::Kind;

mod reader;
pub use reader::{
   ReadError,
   ReadErrorKind,
   Reader,
};

mod tokenizer;
pub use tokenizer::{
   Tokenizer,
   is_symbol_character,
   tokenize,
};
