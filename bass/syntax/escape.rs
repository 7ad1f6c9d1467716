use ranged::Span;
use smallvec::SmallVec;

#[must_use]
pub fn unescape(c: char) -> Option<char> {
   Some(match c {
      'a' => '\x07', // Bell.
      'b' => '\x08', // Backspace.
      't' => '\x09', // Horizontal tab.
      'n' => '\x0A', // New line.
      'v' => '\x0B', // Vertical tab.
      'f' => '\x0C', // Form feed.
      'r' => '\x0D', // Carriage return.
      '"' => '\"',
      '\\' => '\\',

      _ => return None,
   })
}

/// Unescapes the body of a string literal, without its quotes. Returns the
/// spans of every invalid escape on failure.
pub fn unescape_string(s: &str) -> Result<String, SmallVec<Span, 4>> {
   let mut string = String::with_capacity(s.len());
   let mut invalids = SmallVec::<Span, 4>::new();

   let mut chars = s.char_indices();
   while let Some((index, c)) = chars.next() {
      if c != '\\' {
         string.push(c);
         continue;
      }

      let Some((_, next)) = chars.next() else {
         invalids.push(Span::at(index as u32, 1));
         continue;
      };

      let Some(unescaped) = unescape(next) else {
         invalids.push(Span::at(index as u32, 1 + next.len_utf8() as u32));
         continue;
      };

      string.push(unescaped);
   }

   if invalids.is_empty() {
      Ok(string)
   } else {
      Err(invalids)
   }
}

#[must_use]
pub fn escape(c: char) -> Option<&'static str> {
   Some(match c {
      '\x07' => "\\a", // Bell.
      '\x08' => "\\b", // Backspace.
      '\x09' => "\\t", // Horizontal tab.
      '\x0A' => "\\n", // New line.
      '\x0B' => "\\v", // Vertical tab.
      '\x0C' => "\\f", // Form feed.
      '\x0D' => "\\r", // Carriage return.
      '"' => "\\\"",
      '\\' => "\\\\",

      _ => return None,
   })
}

/// Escapes a string so that it reads back as the same string literal. The
/// quotes are not included.
#[must_use]
pub fn escape_string(s: &str) -> String {
   let mut escaped = String::with_capacity(s.len());

   for c in s.chars() {
      match escape(c) {
         Some(sequence) => escaped.push_str(sequence),
         None => escaped.push(c),
      }
   }

   escaped
}

#[cfg(test)]
mod tests {
   use proptest::prelude::*;

   use super::*;

   #[test]
   fn unescape_known_sequences() {
      assert_eq!(
         unescape_string(r#"a\nb\t\"c\"\\"#).unwrap(),
         "a\nb\t\"c\"\\"
      );
   }

   #[test]
   fn unescape_reports_invalid_sequences() {
      let invalids = unescape_string(r"ok \q and \z").unwrap_err();

      assert_eq!(invalids.as_slice(), &[Span::new(3, 5), Span::new(10, 12)]);
   }

   proptest! {
      #[test]
      fn escape_then_unescape(s in ".*") {
         prop_assert_eq!(unescape_string(&escape_string(&s)).unwrap(), s);
      }
   }
}
