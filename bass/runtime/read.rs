//! Turning source text into values.

use std::sync::Arc;

use arcstr::ArcStr;
use bass_syntax::{
   Form,
   FormKind,
   Reader,
};
use ranged::{
   PositionStr,
   Range,
   Span,
};

use crate::{
   Error,
   Result,
   Value,
   value::{
      Annotated,
      CommandPath,
      DirPath,
      ExtendPath,
      FileOrDirPath,
      FilePath,
   },
};

/// Reads values out of a source file one form at a time. Every value is
/// annotated with the range it was read from.
pub struct ValueReader<'a> {
   file:      ArcStr,
   positions: PositionStr<'a>,
   forms:     Reader<'a>,
}

impl<'a> ValueReader<'a> {
   #[must_use]
   pub fn new(file: impl Into<ArcStr>, source: &'a str) -> Self {
      Self {
         file:      file.into(),
         positions: PositionStr::new(source),
         forms:     Reader::new(source),
      }
   }

   fn range(&self, span: Span) -> Range {
      let (start, end) = self.positions.positions(span);
      Range::new(self.file.clone(), start, end)
   }

   fn annotate(&self, form: &Form, value: Value) -> Value {
      Value::Annotated(Arc::new(Annotated {
         value,
         range: Some(self.range(form.span)),
         comment: form.comment.as_deref().map(ArcStr::from),
         meta: None,
      }))
   }

   fn value(&self, form: &Form) -> Value {
      let value = match form.kind {
         FormKind::List {
            ref items,
            ref rest,
         } => {
            let rest = rest.as_ref().map_or(Value::Empty, |rest| self.value(rest));

            items
               .iter()
               .rev()
               .fold(rest, |tail, item| Value::pair(self.value(item), tail))
         },

         FormKind::Cons {
            ref items,
            ref rest,
         } => {
            let rest = rest.as_ref().map_or(Value::Empty, |rest| self.value(rest));

            items
               .iter()
               .rev()
               .fold(rest, |tail, item| Value::cons(self.value(item), tail))
         },

         FormKind::Bind(ref items) => Value::Bind(items.iter().map(|item| self.value(item)).collect()),

         ref kind => atom(kind),
      };

      self.annotate(form, value)
   }
}

fn child_path(kind: &FormKind) -> FileOrDirPath {
   match *kind {
      FormKind::DirPath(ref path) => FileOrDirPath::Dir(DirPath::new(path.as_str())),
      ref other => FileOrDirPath::File(FilePath::new(other.to_string())),
   }
}

/// Forms without children.
fn atom(kind: &FormKind) -> Value {
   match *kind {
      FormKind::Null => Value::Null,
      FormKind::Bool(bool) => Value::Bool(bool),
      FormKind::Ignore => Value::Ignore,

      FormKind::Integer(integer) => Value::Int(integer),
      FormKind::String(ref string) => Value::string(string.as_str()),
      FormKind::Keyword(ref name) => Value::keyword(name.as_str()),
      FormKind::Symbol(ref name) => Value::symbol(name.as_str()),

      FormKind::Command(ref name) => {
         Value::CommandPath(CommandPath {
            name: name.as_str().into(),
         })
      },
      FormKind::DirPath(ref path) => Value::DirPath(DirPath::new(path.as_str())),
      FormKind::FilePath(ref path) => Value::FilePath(FilePath::new(path.as_str())),

      FormKind::Extend {
         ref parent,
         ref child,
      } => {
         Value::ExtendPath(Arc::new(ExtendPath {
            parent: atom(parent),
            child:  child_path(child),
         }))
      },

      // target:key is (:key target)
      FormKind::Access { ref target, ref key } => {
         Value::list([Value::keyword(key.as_str()), atom(target)])
      },

      FormKind::List { .. } | FormKind::Cons { .. } | FormKind::Bind(_) => {
         unreachable!("containers are read with their spans")
      },
   }
}

impl Iterator for ValueReader<'_> {
   type Item = Result<Value>;

   fn next(&mut self) -> Option<Self::Item> {
      Some(match self.forms.next()? {
         Ok(form) => Ok(self.value(&form)),
         Err(error) => {
            let range = self.range(error.span);
            Err(Error::Read { error, range })
         },
      })
   }
}

/// Reads every form in the source.
pub fn read_all(file: impl Into<ArcStr>, source: &str) -> Result<Vec<Value>> {
   ValueReader::new(file, source).collect()
}

#[cfg(test)]
mod tests {
   use super::*;

   fn read_one(source: &str) -> Value {
      let mut values = read_all("test.bass", source).unwrap();
      assert_eq!(values.len(), 1);
      values.remove(0)
   }

   #[test]
   fn annotates_ranges() {
      let value = read_one("\n  (foo 1)");

      let Value::Annotated(ref annotated) = value else {
         panic!("expected an annotation");
      };

      let range = annotated.range.as_ref().unwrap();
      assert_eq!(&*range.file, "test.bass");
      assert_eq!(range.start.line, 2);
      assert_eq!(range.start.column, 3);
   }

   #[test]
   fn lists() {
      assert_eq!(
         read_one("(a 1 & b)"),
         Value::list_with_rest([Value::symbol("a"), Value::Int(1)], Value::symbol("b"))
      );
      assert_eq!(read_one("[1 2]"), Value::cons_list([Value::Int(1), Value::Int(2)]));
      assert_eq!(read_one("()"), Value::Empty);
   }

   #[test]
   fn access_is_a_keyword_call() {
      assert_eq!(
         read_one("foo:bar"),
         Value::list([Value::keyword("bar"), Value::symbol("foo")])
      );
   }

   #[test]
   fn paths() {
      assert_eq!(read_one("./foo/"), Value::DirPath(DirPath::new("./foo")));
      assert_eq!(read_one("./foo"), Value::FilePath(FilePath::new("./foo")));
      assert_eq!(
         read_one(".echo"),
         Value::CommandPath(CommandPath {
            name: "echo".into(),
         })
      );

      let value = read_one("dir/file");
      let Value::ExtendPath(ref extend) = *value.bare() else {
         panic!("expected a path extension");
      };
      assert_eq!(extend.parent, Value::symbol("dir"));
      assert_eq!(extend.child, FileOrDirPath::File(FilePath::new("file")));
   }

   #[test]
   fn comments_attach() {
      let value = read_one("(def x 1) ; the x");

      let Value::Annotated(ref annotated) = value else {
         panic!("expected an annotation");
      };
      assert_eq!(annotated.comment.as_deref(), Some("the x"));
   }

   #[test]
   fn errors_carry_ranges() {
      let error = read_all("test.bass", "(foo\n  \"bar").unwrap_err();

      assert!(matches!(error, Error::Read { .. }));
      assert_eq!(error.range().map(|range| &*range.file), Some("test.bass"));
   }
}
