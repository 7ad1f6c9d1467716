//! The closed set of Bass values.

use std::{
   cell::RefCell,
   fmt,
   sync::Arc,
};

use arcstr::ArcStr;
use bass_syntax::escape_string;
use itertools::Itertools as _;

use crate::{
   Cont,
   Scope,
   thunk::Thunk,
};

mod annotated;
pub use annotated::Annotated;

mod combiner;
pub use combiner::{
   Args,
   Builtin,
   Operative,
};

mod decode;
pub use decode::FromValue;

mod eval;

pub mod json;

mod list;
pub use list::{
   List,
   Pair,
};

pub mod path;
pub use path::{
   CommandPath,
   DirPath,
   ExtendPath,
   FileOrDirPath,
   FilePath,
   FsPath,
   HostPath,
   ThunkPath,
};

pub mod stream;
pub use stream::{
   Sink,
   Source,
};

pub type Symbol = ArcStr;

#[derive(Clone)]
pub enum Value {
   Null,
   Bool(bool),
   Int(i64),
   String(ArcStr),
   Keyword(Symbol),
   Symbol(Symbol),
   Ignore,

   Empty,
   /// A list cell whose head is called with its tail when evaluated.
   Pair(Arc<Pair>),
   /// A list cell that evaluates both halves into a [`Value::Pair`].
   Cons(Arc<Pair>),

   Scope(Scope),
   /// `{...}`, evaluates to a [`Value::Scope`].
   Bind(Arc<[Value]>),

   Annotated(Arc<Annotated>),

   Operative(Arc<Operative>),
   /// An applicative. Evaluates its arguments, then calls the wrapped
   /// combiner with them.
   Wrapped(Arc<Value>),
   Builtin(Arc<Builtin>),

   Continuation(Cont),
   ReadyContinuation(Arc<(Cont, Value)>),

   DirPath(DirPath),
   FilePath(FilePath),
   CommandPath(CommandPath),
   HostPath(HostPath),
   FsPath(FsPath),
   ThunkPath(ThunkPath),
   ExtendPath(Arc<ExtendPath>),

   Thunk(Arc<Thunk>),

   Source(Source),
   Sink(Sink),
}

impl Value {
   #[must_use]
   pub fn string(string: impl Into<ArcStr>) -> Self {
      Self::String(string.into())
   }

   #[must_use]
   pub fn symbol(name: impl Into<ArcStr>) -> Self {
      Self::Symbol(name.into())
   }

   #[must_use]
   pub fn keyword(name: impl Into<ArcStr>) -> Self {
      Self::Keyword(name.into())
   }

   #[must_use]
   pub fn pair(head: Self, tail: Self) -> Self {
      Self::Pair(Arc::new(Pair { head, tail }))
   }

   #[must_use]
   pub fn cons(head: Self, tail: Self) -> Self {
      Self::Cons(Arc::new(Pair { head, tail }))
   }

   /// Builds a proper [`Value::Pair`] list.
   #[must_use]
   pub fn list(items: impl IntoIterator<Item = Self, IntoIter: DoubleEndedIterator>) -> Self {
      Self::list_with_rest(items, Self::Empty)
   }

   #[must_use]
   pub fn list_with_rest(
      items: impl IntoIterator<Item = Self, IntoIter: DoubleEndedIterator>,
      rest: Self,
   ) -> Self {
      items
         .into_iter()
         .rev()
         .fold(rest, |tail, head| Self::pair(head, tail))
   }

   /// Builds a proper [`Value::Cons`] list.
   #[must_use]
   pub fn cons_list(items: impl IntoIterator<Item = Self, IntoIter: DoubleEndedIterator>) -> Self {
      items
         .into_iter()
         .rev()
         .fold(Self::Empty, |tail, head| Self::cons(head, tail))
   }

   #[must_use]
   pub fn wrap(combiner: Self) -> Self {
      Self::Wrapped(Arc::new(combiner))
   }

   /// The value without any annotations.
   #[must_use]
   pub fn bare(&self) -> &Self {
      match *self {
         Self::Annotated(ref annotated) => annotated.value.bare(),
         ref value => value,
      }
   }

   #[must_use]
   pub fn type_name(&self) -> &'static str {
      match *self.bare() {
         Self::Null => "null",
         Self::Bool(_) => "bool",
         Self::Int(_) => "int",
         Self::String(_) => "string",
         Self::Keyword(_) => "keyword",
         Self::Symbol(_) => "symbol",
         Self::Ignore => "ignore",
         Self::Empty => "empty",
         Self::Pair(_) => "pair",
         Self::Cons(_) => "cons",
         Self::Scope(_) => "scope",
         Self::Bind(_) => "bind",
         Self::Annotated(_) => "annotated",
         Self::Operative(_) => "operative",
         Self::Wrapped(_) => "applicative",
         Self::Builtin(_) => "builtin",
         Self::Continuation(_) => "continuation",
         Self::ReadyContinuation(_) => "ready continuation",
         Self::DirPath(_) => "dir path",
         Self::FilePath(_) => "file path",
         Self::CommandPath(_) => "command path",
         Self::HostPath(_) => "host path",
         Self::FsPath(_) => "fs path",
         Self::ThunkPath(_) => "thunk path",
         Self::ExtendPath(_) => "extend path",
         Self::Thunk(_) => "thunk",
         Self::Source(_) => "source",
         Self::Sink(_) => "sink",
      }
   }

   /// Whether the value counts as false in conditionals.
   #[must_use]
   pub fn is_falsy(&self) -> bool {
      matches!(*self.bare(), Self::Null | Self::Bool(false))
   }
}

impl From<bool> for Value {
   fn from(bool: bool) -> Self {
      Self::Bool(bool)
   }
}

impl From<i64> for Value {
   fn from(int: i64) -> Self {
      Self::Int(int)
   }
}

impl From<ArcStr> for Value {
   fn from(string: ArcStr) -> Self {
      Self::String(string)
   }
}

impl From<Scope> for Value {
   fn from(scope: Scope) -> Self {
      Self::Scope(scope)
   }
}

impl From<Arc<Thunk>> for Value {
   fn from(thunk: Arc<Thunk>) -> Self {
      Self::Thunk(thunk)
   }
}

impl From<FileOrDirPath> for Value {
   fn from(path: FileOrDirPath) -> Self {
      match path {
         FileOrDirPath::File(file) => Self::FilePath(file),
         FileOrDirPath::Dir(dir) => Self::DirPath(dir),
      }
   }
}

impl<T: Into<Self>> From<Option<T>> for Value {
   fn from(option: Option<T>) -> Self {
      option.map_or(Self::Null, Into::into)
   }
}

// Equality.

type Visited = Vec<(usize, usize)>;

impl PartialEq for Value {
   fn eq(&self, other: &Self) -> bool {
      self.equals(other, &mut Vec::new())
   }
}

impl Value {
   pub(crate) fn equals(&self, other: &Self, visited: &mut Visited) -> bool {
      match (self.bare(), other.bare()) {
         (&Self::Null, &Self::Null)
         | (&Self::Ignore, &Self::Ignore)
         | (&Self::Empty, &Self::Empty) => true,

         (&Self::Bool(this), &Self::Bool(that)) => this == that,
         (&Self::Int(this), &Self::Int(that)) => this == that,
         (&Self::String(ref this), &Self::String(ref that))
         | (&Self::Keyword(ref this), &Self::Keyword(ref that))
         | (&Self::Symbol(ref this), &Self::Symbol(ref that)) => this == that,

         (&Self::Pair(ref this), &Self::Pair(ref that))
         | (&Self::Cons(ref this), &Self::Cons(ref that)) => {
            this.head.equals(&that.head, visited) && this.tail.equals(&that.tail, visited)
         },

         (&Self::Scope(ref this), &Self::Scope(ref that)) => this.equals(that, visited),

         (&Self::Bind(ref this), &Self::Bind(ref that)) => {
            this.len() == that.len()
               && this
                  .iter()
                  .zip(that.iter())
                  .all(|(this, that)| this.equals(that, visited))
         },

         (&Self::Operative(ref this), &Self::Operative(ref that)) => Arc::ptr_eq(this, that),
         (&Self::Wrapped(ref this), &Self::Wrapped(ref that)) => this.equals(that, visited),
         (&Self::Builtin(ref this), &Self::Builtin(ref that)) => Arc::ptr_eq(this, that),
         (&Self::Continuation(ref this), &Self::Continuation(ref that)) => this.ptr_eq(that),
         (&Self::ReadyContinuation(ref this), &Self::ReadyContinuation(ref that)) => {
            Arc::ptr_eq(this, that)
         },

         (&Self::DirPath(ref this), &Self::DirPath(ref that)) => this == that,
         (&Self::FilePath(ref this), &Self::FilePath(ref that)) => this == that,
         (&Self::CommandPath(ref this), &Self::CommandPath(ref that)) => this == that,
         (&Self::HostPath(ref this), &Self::HostPath(ref that)) => this == that,
         (&Self::FsPath(ref this), &Self::FsPath(ref that)) => this == that,
         (&Self::ThunkPath(ref this), &Self::ThunkPath(ref that)) => this == that,
         (&Self::ExtendPath(ref this), &Self::ExtendPath(ref that)) => {
            this.child == that.child && this.parent.equals(&that.parent, visited)
         },

         (&Self::Thunk(ref this), &Self::Thunk(ref that)) => this == that,

         (&Self::Source(ref this), &Self::Source(ref that)) => this == that,
         (&Self::Sink(ref this), &Self::Sink(ref that)) => this == that,

         _ => false,
      }
   }
}

// Display.

thread_local! {
   /// Scopes currently being displayed, to cut off self references.
   static DISPLAYING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

fn write_list(
   writer: &mut fmt::Formatter<'_>,
   value: &Value,
   open: &str,
   close: &str,
) -> fmt::Result {
   writer.write_str(open)?;

   let mut current = value;
   let mut first = true;

   loop {
      match *current.bare() {
         Value::Pair(ref pair) | Value::Cons(ref pair) => {
            if !first {
               writer.write_str(" ")?;
            }

            write!(writer, "{head}", head = pair.head)?;
            first = false;
            current = &pair.tail;
         },

         Value::Empty => break,

         ref rest => {
            write!(writer, " & {rest}")?;
            break;
         },
      }
   }

   writer.write_str(close)
}

impl fmt::Display for Value {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match *self {
         Self::Null => writer.write_str("null"),
         Self::Bool(true) => writer.write_str("true"),
         Self::Bool(false) => writer.write_str("false"),
         Self::Int(int) => write!(writer, "{int}"),
         Self::String(ref string) => write!(writer, "\"{string}\"", string = escape_string(string)),
         Self::Keyword(ref name) => write!(writer, ":{name}"),
         Self::Symbol(ref name) => writer.write_str(name),
         Self::Ignore => writer.write_str("_"),

         Self::Empty => writer.write_str("()"),
         Self::Pair(_) => write_list(writer, self, "(", ")"),
         Self::Cons(_) => write_list(writer, self, "[", "]"),

         Self::Scope(ref scope) => {
            let id = scope.id();

            let entered = DISPLAYING.with(|displaying| {
               let mut displaying = displaying.borrow_mut();

               if displaying.contains(&id) {
                  false
               } else {
                  displaying.push(id);
                  true
               }
            });

            if !entered {
               return writer.write_str("{...}");
            }

            let _guard = scopeguard::guard((), |()| {
               DISPLAYING.with(|displaying| displaying.borrow_mut().retain(|&other| other != id));
            });

            let bindings = scope.bindings();
            let bindings = bindings
               .iter()
               .format_with(" ", |(name, value), write| write(&format_args!(":{name} {value}")));

            write!(writer, "{{{bindings}}}")
         },

         Self::Bind(ref items) => write!(writer, "{{{items}}}", items = items.iter().format(" ")),

         Self::Annotated(ref annotated) => annotated.value.fmt(writer),

         Self::Operative(ref operative) => {
            write!(
               writer,
               "(op {formals} {eformal} {body})",
               formals = operative.formals,
               eformal = operative.eformal,
               body = operative.body,
            )
         },
         Self::Wrapped(ref combiner) => write!(writer, "(wrap {combiner})"),
         Self::Builtin(ref builtin) => write!(writer, "<builtin: {name}>", name = builtin.name),

         Self::Continuation(_) => writer.write_str("<continuation>"),
         Self::ReadyContinuation(ref ready) => write!(writer, "<continue: {value}>", value = ready.1),

         Self::DirPath(ref path) => path.fmt(writer),
         Self::FilePath(ref path) => path.fmt(writer),
         Self::CommandPath(ref path) => path.fmt(writer),
         Self::HostPath(ref path) => path.fmt(writer),
         Self::FsPath(ref path) => path.fmt(writer),
         Self::ThunkPath(ref path) => path.fmt(writer),
         Self::ExtendPath(ref path) => path.fmt(writer),

         Self::Thunk(ref thunk) => thunk.fmt(writer),

         Self::Source(ref source) => source.fmt(writer),
         Self::Sink(ref sink) => sink.fmt(writer),
      }
   }
}

impl fmt::Debug for Value {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(self, writer)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn annotations_are_transparent_to_equality() {
      let annotated = Value::Annotated(Arc::new(Annotated {
         value:   Value::Int(1),
         range:   None,
         comment: Some("one".into()),
         meta:    None,
      }));

      assert_eq!(annotated, Value::Int(1));
      assert_ne!(Value::Int(1), Value::string("1"));
   }

   #[test]
   fn pair_and_cons_differ() {
      let items = || [Value::Int(1), Value::Int(2)];

      assert_eq!(Value::list(items()), Value::list(items()));
      assert_ne!(Value::list(items()), Value::cons_list(items()));
   }

   #[test]
   fn display() {
      let list = Value::list_with_rest([Value::Int(1), Value::keyword("a")], Value::symbol("more"));
      assert_eq!(list.to_string(), "(1 :a & more)");

      let cons = Value::cons_list([Value::string("x\n"), Value::Ignore, Value::Null]);
      assert_eq!(cons.to_string(), "[\"x\\n\" _ null]");

      assert_eq!(Value::Empty.to_string(), "()");
   }

   #[test]
   fn self_referencing_scope_displays() {
      let scope = Scope::new([]);
      scope.set("self", Value::Scope(scope.clone()));
      scope.set("a", Value::Int(1));

      assert_eq!(Value::Scope(scope.clone()).to_string(), "{:self {...} :a 1}");
      assert_eq!(Value::Scope(scope.clone()), Value::Scope(scope));
   }
}
