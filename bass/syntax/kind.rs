/// The token kind.
#[derive(derive_more::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[expect(non_camel_case_types)]
pub enum Kind {
   /// Any character that is reserved and cannot start a token.
   #[display("an unknown token")]
   TOKEN_ERROR_UNKNOWN,

   /// A string literal that reached the end of the source before its closing
   /// quote.
   #[display("an unterminated string")]
   TOKEN_ERROR_UNTERMINATED_STRING,

   /// Anything that matches [`char::is_whitespace`].
   #[display("space")]
   TOKEN_SPACE,

   /// A `;` comment, running until the end of the line. The newline is not
   /// included.
   #[display("a comment")]
   TOKEN_COMMENT,

   /// A `#!` line at the very start of the source.
   #[display("a shebang")]
   TOKEN_SHEBANG,

   #[display("'('")]
   TOKEN_PARENTHESIS_LEFT,
   #[display("')'")]
   TOKEN_PARENTHESIS_RIGHT,

   #[display("'['")]
   TOKEN_BRACKET_LEFT,
   #[display("']'")]
   TOKEN_BRACKET_RIGHT,

   #[display("'{{'")]
   TOKEN_CURLYBRACE_LEFT,
   #[display("'}}'")]
   TOKEN_CURLYBRACE_RIGHT,

   /// A decimal or prefixed integer, optionally signed.
   #[display("an integer")]
   TOKEN_INTEGER,

   /// A double quoted string, quotes included.
   #[display("a string")]
   TOKEN_STRING,

   /// Symbols, keywords, paths and the `&` rest marker.
   #[display("a symbol")]
   TOKEN_SYMBOL,
}

impl Kind {
   /// Whether this token carries no meaning for the reader.
   #[must_use]
   pub fn is_trivia(self) -> bool {
      matches!(self, Self::TOKEN_SPACE | Self::TOKEN_SHEBANG)
   }

   /// Whether this token is an error token.
   #[must_use]
   pub fn is_error(self) -> bool {
      matches!(
         self,
         Self::TOKEN_ERROR_UNKNOWN | Self::TOKEN_ERROR_UNTERMINATED_STRING
      )
   }

   /// The closing delimiter of an opening delimiter.
   #[must_use]
   pub fn closing(self) -> Option<Self> {
      Some(match self {
         Self::TOKEN_PARENTHESIS_LEFT => Self::TOKEN_PARENTHESIS_RIGHT,
         Self::TOKEN_BRACKET_LEFT => Self::TOKEN_BRACKET_RIGHT,
         Self::TOKEN_CURLYBRACE_LEFT => Self::TOKEN_CURLYBRACE_RIGHT,
         _ => return None,
      })
   }
}
