use crate::Kind::{
   self,
   *,
};

/// Characters that end a symbol or integer.
fn is_delimiter(c: char) -> bool {
   c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ';')
}

/// Characters that are reserved for future syntax.
fn is_reserved(c: char) -> bool {
   matches!(c, '\'' | '`' | '~' | ',' | '@' | '^')
}

/// Whether the character may appear in a symbol.
#[must_use]
pub fn is_symbol_character(c: char) -> bool {
   !is_delimiter(c) && !is_reserved(c)
}

/// A tokenizer over Bass source text. Yields every byte of the input exactly
/// once, so the offsets of tokens can be recovered by summing their lengths.
pub struct Tokenizer<'a> {
   input:  &'a str,
   offset: usize,
}

impl<'a> Iterator for Tokenizer<'a> {
   type Item = (Kind, &'a str);

   fn next(&mut self) -> Option<Self::Item> {
      let start = self.offset;
      let kind = self.consume_kind()?;

      Some((kind, &self.input[start..self.offset]))
   }
}

/// Returns an iterator of tokens that reference the given string.
#[must_use]
pub fn tokenize(input: &str) -> Tokenizer<'_> {
   Tokenizer { input, offset: 0 }
}

impl Tokenizer<'_> {
   fn remaining(&self) -> &str {
      &self.input[self.offset..]
   }

   fn peek_character(&self) -> Option<char> {
      self.remaining().chars().next()
   }

   fn consume_while(&mut self, predicate: impl Fn(char) -> bool) {
      let len: usize = self
         .remaining()
         .chars()
         .take_while(|&c| predicate(c))
         .map(char::len_utf8)
         .sum();

      self.offset += len;
   }

   fn consume_character(&mut self) -> Option<char> {
      let c = self.peek_character()?;
      self.offset += c.len_utf8();
      Some(c)
   }

   fn consume_string(&mut self) -> Kind {
      loop {
         match self.consume_character() {
            None => return TOKEN_ERROR_UNTERMINATED_STRING,
            Some('"') => return TOKEN_STRING,
            Some('\\') => {
               if self.consume_character().is_none() {
                  return TOKEN_ERROR_UNTERMINATED_STRING;
               }
            },
            Some(_) => {},
         }
      }
   }

   fn consume_kind(&mut self) -> Option<Kind> {
      let start = self.offset;
      let c = self.consume_character()?;

      Some(match c {
         '#' if start == 0 && self.peek_character() == Some('!') => {
            self.consume_while(|c| c != '\n');
            TOKEN_SHEBANG
         },

         c if c.is_whitespace() => {
            self.consume_while(char::is_whitespace);
            TOKEN_SPACE
         },

         ';' => {
            self.consume_while(|c| c != '\n');
            TOKEN_COMMENT
         },

         '(' => TOKEN_PARENTHESIS_LEFT,
         ')' => TOKEN_PARENTHESIS_RIGHT,
         '[' => TOKEN_BRACKET_LEFT,
         ']' => TOKEN_BRACKET_RIGHT,
         '{' => TOKEN_CURLYBRACE_LEFT,
         '}' => TOKEN_CURLYBRACE_RIGHT,

         '"' => self.consume_string(),

         c if is_reserved(c) => TOKEN_ERROR_UNKNOWN,

         c if c.is_ascii_digit() => {
            self.consume_while(is_symbol_character);
            TOKEN_INTEGER
         },

         '-' | '+' if self.peek_character().is_some_and(|c| c.is_ascii_digit()) => {
            self.consume_while(is_symbol_character);
            TOKEN_INTEGER
         },

         _ => {
            self.consume_while(is_symbol_character);
            TOKEN_SYMBOL
         },
      })
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn kinds(input: &str) -> Vec<(Kind, &str)> {
      tokenize(input)
         .filter(|&(kind, _)| kind != TOKEN_SPACE)
         .collect()
   }

   #[test]
   fn tokenizes_forms() {
      assert_eq!(kinds("(def x [1 -2 0x1f])"), [
         (TOKEN_PARENTHESIS_LEFT, "("),
         (TOKEN_SYMBOL, "def"),
         (TOKEN_SYMBOL, "x"),
         (TOKEN_BRACKET_LEFT, "["),
         (TOKEN_INTEGER, "1"),
         (TOKEN_INTEGER, "-2"),
         (TOKEN_INTEGER, "0x1f"),
         (TOKEN_BRACKET_RIGHT, "]"),
         (TOKEN_PARENTHESIS_RIGHT, ")"),
      ]);
   }

   #[test]
   fn tokenizes_strings_and_comments() {
      assert_eq!(kinds("\"a \\\"b\\\"\" ; trailing\n{:k v}"), [
         (TOKEN_STRING, "\"a \\\"b\\\"\""),
         (TOKEN_COMMENT, "; trailing"),
         (TOKEN_CURLYBRACE_LEFT, "{"),
         (TOKEN_SYMBOL, ":k"),
         (TOKEN_SYMBOL, "v"),
         (TOKEN_CURLYBRACE_RIGHT, "}"),
      ]);
   }

   #[test]
   fn shebang_only_at_start() {
      assert_eq!(kinds("#!/usr/bin/env bass\n#foo"), [
         (TOKEN_SHEBANG, "#!/usr/bin/env bass"),
         (TOKEN_SYMBOL, "#foo"),
      ]);
   }

   #[test]
   fn lone_signs_are_symbols() {
      assert_eq!(kinds("- + -x"), [
         (TOKEN_SYMBOL, "-"),
         (TOKEN_SYMBOL, "+"),
         (TOKEN_SYMBOL, "-x"),
      ]);
   }

   #[test]
   fn unterminated_and_reserved() {
      assert_eq!(kinds("'a \"oops"), [
         (TOKEN_ERROR_UNKNOWN, "'"),
         (TOKEN_SYMBOL, "a"),
         (TOKEN_ERROR_UNTERMINATED_STRING, "\"oops"),
      ]);
   }

   #[test]
   fn covers_every_byte() {
      let input = "(foo ./bar/ \"æ\") ; ok\n[1 & rest]";
      let total: usize = tokenize(input).map(|(_, slice)| slice.len()).sum();

      assert_eq!(total, input.len());
   }
}
