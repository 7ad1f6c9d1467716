use std::fmt;

use ranged::{
   IntoSpan,
   Span,
};

use crate::escape_string;

/// A form read from source, with its span and any comment attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
   pub span:    Span,
   pub kind:    FormKind,
   pub comment: Option<String>,
}

impl IntoSpan for Form {
   fn span(&self) -> Span {
      self.span
   }
}

impl fmt::Display for Form {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      self.kind.fmt(writer)
   }
}

impl Form {
   #[must_use]
   pub fn new(span: Span, kind: FormKind) -> Self {
      Self {
         span,
         kind,
         comment: None,
      }
   }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKind {
   Null,
   Bool(bool),
   Ignore,

   Integer(i64),
   String(String),
   Keyword(String),
   Symbol(String),

   /// `.name`
   Command(String),
   /// `./`, `./foo/`, `/`. Stored without the trailing slash.
   DirPath(String),
   /// `./foo`, `/usr/bin/env`.
   FilePath(String),
   /// `parent/child` where `parent` is not a literal directory.
   Extend {
      parent: Box<FormKind>,
      child:  Box<FormKind>,
   },
   /// `target:key`, sugar for calling the keyword on the target.
   Access {
      target: Box<FormKind>,
      key:    String,
   },

   /// `( … )`, with an optional `& rest` tail.
   List {
      items: Vec<Form>,
      rest:  Option<Box<Form>>,
   },
   /// `[ … ]`, with an optional `& rest` tail.
   Cons {
      items: Vec<Form>,
      rest:  Option<Box<Form>>,
   },
   /// `{ … }`
   Bind(Vec<Form>),
}

fn write_items(
   writer: &mut fmt::Formatter<'_>,
   open: &str,
   items: &[Form],
   rest: Option<&Form>,
   close: &str,
) -> fmt::Result {
   writer.write_str(open)?;

   for (index, item) in items.iter().enumerate() {
      if index > 0 {
         writer.write_str(" ")?;
      }

      write!(writer, "{item}")?;
   }

   if let Some(rest) = rest {
      if !items.is_empty() {
         writer.write_str(" ")?;
      }

      write!(writer, "& {rest}")?;
   }

   writer.write_str(close)
}

impl fmt::Display for FormKind {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match *self {
         Self::Null => writer.write_str("null"),
         Self::Bool(true) => writer.write_str("true"),
         Self::Bool(false) => writer.write_str("false"),
         Self::Ignore => writer.write_str("_"),

         Self::Integer(integer) => write!(writer, "{integer}"),
         Self::String(ref string) => write!(writer, "\"{escaped}\"", escaped = escape_string(string)),
         Self::Keyword(ref name) => write!(writer, ":{name}"),
         Self::Symbol(ref name) => writer.write_str(name),

         Self::Command(ref name) => write!(writer, ".{name}"),
         Self::DirPath(ref path) => write!(writer, "{path}/"),
         Self::FilePath(ref path) => writer.write_str(path),
         Self::Extend {
            ref parent,
            ref child,
         } => write!(writer, "{parent}/{child}"),
         Self::Access { ref target, ref key } => write!(writer, "{target}:{key}"),

         Self::List {
            ref items,
            ref rest,
         } => write_items(writer, "(", items, rest.as_deref(), ")"),
         Self::Cons {
            ref items,
            ref rest,
         } => write_items(writer, "[", items, rest.as_deref(), "]"),
         Self::Bind(ref items) => write_items(writer, "{", items, None, "}"),
      }
   }
}
