use peekmore::{
   PeekMore as _,
   PeekMoreIterator as PeekMore,
};
use ranged::Span;

use crate::{
   Form,
   FormKind,
   Kind::{
      self,
      *,
   },
   Tokenizer,
   tokenize,
   unescape_string,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadErrorKind {
   #[error("unexpected end of source, expected {expected}")]
   UnexpectedEnd { expected: Kind },

   #[error("unmatched delimiter {delimiter}")]
   UnmatchedDelimiter { delimiter: Kind },

   #[error("unterminated string")]
   UnterminatedString,

   #[error("unknown token")]
   UnknownToken,

   #[error("invalid integer")]
   InvalidInteger,

   #[error("invalid escape sequence")]
   InvalidEscape,

   #[error("invalid keyword")]
   InvalidKeyword,

   #[error("expected exactly one form after '&' or '.'")]
   MisplacedRest,
}

/// A malformed form, with the offending text and its span.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {form}")]
pub struct ReadError {
   pub kind: ReadErrorKind,
   pub span: Span,
   pub form: String,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
   kind: Kind,
   text: &'a str,
   span: Span,
}

struct Tokens<'a> {
   tokens: Tokenizer<'a>,
   offset: u32,
}

impl<'a> Iterator for Tokens<'a> {
   type Item = Token<'a>;

   fn next(&mut self) -> Option<Self::Item> {
      let (kind, text) = self.tokens.next()?;

      let span = Span::at(self.offset, text.len() as u32);
      self.offset = span.end;

      Some(Token { kind, text, span })
   }
}

/// A comment block read ahead of a form.
struct Commentary {
   text:       String,
   span:       Span,
   standalone: bool,
}

/// Reads [`Form`]s from source text.
///
/// Iterating yields one top level form at a time. A comment block that is
/// separated from the next form by a blank line is yielded as an
/// [`FormKind::Ignore`] form carrying the comment.
pub struct Reader<'a> {
   source: &'a str,
   tokens: PeekMore<Tokens<'a>>,
}

impl Iterator for Reader<'_> {
   type Item = Result<Form, ReadError>;

   fn next(&mut self) -> Option<Self::Item> {
      self.skip_trivia();

      if self.peek_kind()? == TOKEN_COMMENT {
         let commentary = self.read_commentary();

         if commentary.standalone {
            let mut form = Form::new(commentary.span, FormKind::Ignore);
            form.comment = Some(commentary.text);
            return Some(Ok(form));
         }

         return Some(self.read_form().map(|mut form| {
            form.comment = Some(commentary.text);
            form
         }));
      }

      Some(self.read_form())
   }
}

impl<'a> Reader<'a> {
   #[must_use]
   pub fn new(source: &'a str) -> Self {
      Self {
         source,
         tokens: Tokens {
            tokens: tokenize(source),
            offset: 0,
         }
         .peekmore(),
      }
   }

   fn error(&self, kind: ReadErrorKind, span: Span) -> ReadError {
      ReadError {
         kind,
         span,
         form: self.source[span.into_std()].to_owned(),
      }
   }

   fn peek(&mut self) -> Option<Token<'a>> {
      self.tokens.peek().copied()
   }

   fn peek_kind(&mut self) -> Option<Kind> {
      self.peek().map(|token| token.kind)
   }

   fn skip_trivia(&mut self) {
      while self.peek_kind().is_some_and(Kind::is_trivia) {
         self.tokens.next();
      }
   }

   /// Reads consecutive comment lines. Lines holding only `;` split
   /// paragraphs.
   fn read_commentary(&mut self) -> Commentary {
      let mut paragraphs = Vec::<String>::new();
      let mut paragraph = Vec::<&str>::new();

      let mut span: Option<Span> = None;
      let mut standalone = true;

      while let Some(token) = self.peek()
         && token.kind == TOKEN_COMMENT
      {
         self.tokens.next();
         span = Some(span.map_or(token.span, |span| span.cover(token.span)));

         let line = comment_text(token.text);
         if line.is_empty() {
            paragraphs.push(paragraph.join(" "));
            paragraph.clear();
         } else {
            paragraph.push(line);
         }

         let Some(space) = self.peek() else {
            break;
         };

         if space.kind != TOKEN_SPACE {
            // Directly followed by something on the next line.
            standalone = false;
            break;
         }

         if space.text.matches('\n').count() > 1 {
            self.tokens.next();
            break;
         }

         self.tokens.advance_cursor();
         let after = self.tokens.peek().map(|token| token.kind);
         self.tokens.reset_cursor();

         match after {
            Some(TOKEN_COMMENT) => {
               self.tokens.next();
            },

            None
            | Some(TOKEN_PARENTHESIS_RIGHT | TOKEN_BRACKET_RIGHT | TOKEN_CURLYBRACE_RIGHT) => {
               self.tokens.next();
               break;
            },

            Some(_) => {
               self.tokens.next();
               standalone = false;
               break;
            },
         }
      }

      if !paragraph.is_empty() {
         paragraphs.push(paragraph.join(" "));
      }

      if self.peek().is_none() {
         standalone = true;
      }

      Commentary {
         text: paragraphs.join("\n\n"),
         span: span.unwrap_or_default(),
         standalone,
      }
   }

   /// Reads a comment on the same line as the form that just ended.
   fn read_trailing_comment(&mut self) -> Option<String> {
      let first = self.peek()?;

      let comment = match first.kind {
         TOKEN_COMMENT => first,

         TOKEN_SPACE if !first.text.contains('\n') => {
            self.tokens.advance_cursor();
            let next = self.tokens.peek().copied();
            self.tokens.reset_cursor();

            let next = next.filter(|token| token.kind == TOKEN_COMMENT)?;
            self.tokens.next();
            next
         },

         _ => return None,
      };

      self.tokens.next();
      Some(comment_text(comment.text).to_owned())
   }

   fn read_form(&mut self) -> Result<Form, ReadError> {
      let mut form = self.read_form_bare()?;

      if let Some(comment) = self.read_trailing_comment() {
         form.comment = Some(comment);
      }

      Ok(form)
   }

   fn read_form_bare(&mut self) -> Result<Form, ReadError> {
      self.skip_trivia();

      let Some(token) = self.tokens.next() else {
         let end = self.source.len() as u32;
         return Err(self.error(
            ReadErrorKind::UnexpectedEnd {
               expected: TOKEN_SYMBOL,
            },
            Span::empty(end),
         ));
      };

      let kind = match token.kind {
         TOKEN_PARENTHESIS_LEFT | TOKEN_BRACKET_LEFT | TOKEN_CURLYBRACE_LEFT => {
            return self.read_container(token);
         },

         TOKEN_PARENTHESIS_RIGHT | TOKEN_BRACKET_RIGHT | TOKEN_CURLYBRACE_RIGHT => {
            return Err(self.error(
               ReadErrorKind::UnmatchedDelimiter {
                  delimiter: token.kind,
               },
               token.span,
            ));
         },

         TOKEN_ERROR_UNTERMINATED_STRING => {
            return Err(self.error(ReadErrorKind::UnterminatedString, token.span));
         },

         TOKEN_ERROR_UNKNOWN => {
            return Err(self.error(ReadErrorKind::UnknownToken, token.span));
         },

         TOKEN_STRING => {
            let body = &token.text[1..token.text.len() - 1];

            let string = unescape_string(body).map_err(|invalids| {
               let span = invalids
                  .first()
                  .map_or(token.span, |invalid| invalid.offset_by(token.span.start + 1));

               self.error(ReadErrorKind::InvalidEscape, span)
            })?;

            FormKind::String(string)
         },

         TOKEN_INTEGER => {
            FormKind::Integer(
               parse_integer(token.text)
                  .ok_or_else(|| self.error(ReadErrorKind::InvalidInteger, token.span))?,
            )
         },

         TOKEN_SYMBOL => {
            classify_symbol(token.text)
               .ok_or_else(|| self.error(ReadErrorKind::InvalidKeyword, token.span))?
         },

         TOKEN_SPACE | TOKEN_SHEBANG | TOKEN_COMMENT => {
            return Err(self.error(ReadErrorKind::UnknownToken, token.span));
         },
      };

      Ok(Form::new(token.span, kind))
   }

   fn read_container(&mut self, open: Token<'a>) -> Result<Form, ReadError> {
      let close = open.kind.closing().unwrap_or(TOKEN_PARENTHESIS_RIGHT);

      let mut items = Vec::new();
      let mut rest: Option<Form> = None;
      let mut after_rest = false;

      let end = loop {
         self.skip_trivia();

         let Some(token) = self.peek() else {
            return Err(self.error(
               ReadErrorKind::UnexpectedEnd { expected: close },
               Span::new(open.span.start, self.source.len() as u32),
            ));
         };

         if token.kind == close {
            self.tokens.next();
            break token.span.end;
         }

         let comment = if token.kind == TOKEN_COMMENT {
            let commentary = self.read_commentary();

            if commentary.standalone {
               continue;
            }

            Some(commentary.text)
         } else {
            None
         };

         let mut form = self.read_form()?;
         if comment.is_some() {
            form.comment = comment;
         }

         if close != TOKEN_CURLYBRACE_RIGHT
            && let FormKind::Symbol(ref name) = form.kind
            && (name == "&" || name == ".")
         {
            if after_rest {
               return Err(self.error(ReadErrorKind::MisplacedRest, form.span));
            }

            after_rest = true;
            continue;
         }

         if after_rest {
            if rest.is_some() {
               return Err(self.error(ReadErrorKind::MisplacedRest, form.span));
            }

            rest = Some(form);
         } else {
            items.push(form);
         }
      };

      let span = Span::new(open.span.start, end);

      if after_rest && rest.is_none() {
         return Err(self.error(ReadErrorKind::MisplacedRest, span));
      }

      let rest = rest.map(Box::new);

      let kind = match close {
         TOKEN_BRACKET_RIGHT => FormKind::Cons { items, rest },
         TOKEN_CURLYBRACE_RIGHT => FormKind::Bind(items),
         _ => FormKind::List { items, rest },
      };

      Ok(Form::new(span, kind))
   }
}

trait OffsetBy {
   fn offset_by(self, by: u32) -> Span;
}

impl OffsetBy for Span {
   fn offset_by(self, by: u32) -> Span {
      Span::new(self.start + by, self.end + by)
   }
}

fn comment_text(text: &str) -> &str {
   text.trim_start_matches(';').trim_start_matches(' ').trim_end()
}

fn parse_integer(text: &str) -> Option<i64> {
   let (negative, digits) = match text.as_bytes().first()? {
      b'-' => (true, &text[1..]),
      b'+' => (false, &text[1..]),
      _ => (false, text),
   };

   let (radix, digits) = match digits.get(..2) {
      Some("0x" | "0X") => (16, &digits[2..]),
      Some("0o" | "0O") => (8, &digits[2..]),
      Some("0b" | "0B") => (2, &digits[2..]),
      _ => (10, digits),
   };

   if digits.is_empty() || digits.starts_with(['+', '-']) {
      return None;
   }

   let magnitude = i128::from_str_radix(digits, radix).ok()?;
   let value = if negative { -magnitude } else { magnitude };

   i64::try_from(value).ok()
}

fn classify_keywords(text: &str) -> Option<FormKind> {
   let mut segments = text.split(':');

   let first = segments.next()?;

   let mut kind = if first.is_empty() {
      let name = segments.next()?;
      if name.is_empty() {
         return None;
      }

      FormKind::Keyword(name.to_owned())
   } else {
      FormKind::Symbol(first.to_owned())
   };

   for key in segments {
      if key.is_empty() {
         return None;
      }

      kind = FormKind::Access {
         target: Box::new(kind),
         key:    key.to_owned(),
      };
   }

   Some(kind)
}

fn classify_path(text: &str) -> Option<FormKind> {
   let mut segments: Vec<&str> = text.split('/').collect();

   let is_dir = segments.last() == Some(&"");
   if is_dir {
      segments.pop();
   }

   let (start, children) = segments.split_first()?;

   let literal = match *start {
      "" | "." | ".." => Some((*start).to_owned()),
      _ => None,
   };

   let Some(mut literal) = literal else {
      let mut kind = classify_symbol(start)?;

      for (index, child) in children.iter().enumerate() {
         let child = if index + 1 == children.len() && !is_dir {
            FormKind::FilePath((*child).to_owned())
         } else {
            FormKind::DirPath((*child).to_owned())
         };

         kind = FormKind::Extend {
            parent: Box::new(kind),
            child:  Box::new(child),
         };
      }

      return Some(kind);
   };

   for child in children {
      literal.push('/');
      literal.push_str(child);
   }

   Some(if is_dir || children.is_empty() {
      FormKind::DirPath(literal)
   } else {
      FormKind::FilePath(literal)
   })
}

fn classify_symbol(text: &str) -> Option<FormKind> {
   Some(match text {
      "_" => FormKind::Ignore,
      "null" => FormKind::Null,
      "true" => FormKind::Bool(true),
      "false" => FormKind::Bool(false),

      text if text.contains('/') => return classify_path(text),

      text if text != "." && text.len() > 1 && text.starts_with('.') => {
         FormKind::Command(text[1..].to_owned())
      },

      text => return classify_keywords(text),
   })
}
