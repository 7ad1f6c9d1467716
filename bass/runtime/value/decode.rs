use std::sync::Arc;

use arcstr::ArcStr;

use crate::{
   Error,
   Result,
   Scope,
   Value,
   thunk::Thunk,
   value::{
      CommandPath,
      DirPath,
      FileOrDirPath,
      FilePath,
      HostPath,
      Sink,
      Source,
      ThunkPath,
      json,
   },
};

/// Structural coercion out of a [`Value`]. Annotations are already stripped
/// when [`FromValue::from_value`] is called.
pub trait FromValue: Sized {
   /// What the value is decoded into, for errors.
   const NAME: &'static str;

   fn from_value(value: &Value) -> Option<Self>;
}

impl Value {
   pub fn decode<T: FromValue>(&self) -> Result<T> {
      let value = self.bare();

      T::from_value(value).ok_or_else(|| {
         Error::Decode {
            value: value.to_string(),
            have:  value.type_name(),
            need:  T::NAME,
         }
      })
   }

   #[must_use]
   pub fn as_symbol(&self) -> Option<&ArcStr> {
      match *self.bare() {
         Self::Symbol(ref name) => Some(name),
         _ => None,
      }
   }

   #[must_use]
   pub fn as_keyword(&self) -> Option<&ArcStr> {
      match *self.bare() {
         Self::Keyword(ref name) => Some(name),
         _ => None,
      }
   }

   #[must_use]
   pub fn is_combiner(&self) -> bool {
      matches!(
         *self.bare(),
         Self::Operative(_) | Self::Wrapped(_) | Self::Builtin(_)
      )
   }

   #[must_use]
   pub fn is_applicative(&self) -> bool {
      matches!(*self.bare(), Self::Wrapped(_))
   }

   /// Builtins on their own see their arguments unevaluated, so they count
   /// as operatives.
   #[must_use]
   pub fn is_operative(&self) -> bool {
      matches!(*self.bare(), Self::Operative(_) | Self::Builtin(_))
   }
}

impl FromValue for Value {
   const NAME: &'static str = "value";

   fn from_value(value: &Value) -> Option<Self> {
      Some(value.clone())
   }
}

impl FromValue for bool {
   const NAME: &'static str = "bool";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Bool(bool) => Some(bool),
         Value::Null => Some(false),
         _ => None,
      }
   }
}

impl FromValue for i64 {
   const NAME: &'static str = "int";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Int(int) => Some(int),
         _ => None,
      }
   }
}

impl FromValue for usize {
   const NAME: &'static str = "non-negative int";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Int(int) => usize::try_from(int).ok(),
         _ => None,
      }
   }
}

impl FromValue for ArcStr {
   const NAME: &'static str = "string";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::String(ref string) => Some(string.clone()),
         _ => None,
      }
   }
}

impl FromValue for Scope {
   const NAME: &'static str = "scope";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Scope(ref scope) => Some(scope.clone()),
         _ => None,
      }
   }
}

impl FromValue for Source {
   const NAME: &'static str = "source";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Source(ref source) => Some(source.clone()),
         _ => None,
      }
   }
}

impl FromValue for Sink {
   const NAME: &'static str = "sink";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Sink(ref sink) => Some(sink.clone()),
         _ => None,
      }
   }
}

/// Thunks decode from thunks, and from scopes shaped like thunk JSON.
impl FromValue for Arc<Thunk> {
   const NAME: &'static str = "thunk";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Thunk(ref thunk) => Some(thunk.clone()),
         Value::Scope(_) => json::decode_via_json::<Thunk>(value).map(Arc::new),
         _ => None,
      }
   }
}

impl FromValue for FilePath {
   const NAME: &'static str = "file path";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::FilePath(ref file) => Some(file.clone()),
         Value::Scope(_) => json::decode_via_json(value),
         _ => None,
      }
   }
}

impl FromValue for DirPath {
   const NAME: &'static str = "dir path";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::DirPath(ref dir) => Some(dir.clone()),
         Value::Scope(_) => json::decode_via_json(value),
         _ => None,
      }
   }
}

impl FromValue for CommandPath {
   const NAME: &'static str = "command path";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::CommandPath(ref command) => Some(command.clone()),
         Value::Scope(_) => json::decode_via_json(value),
         _ => None,
      }
   }
}

impl FromValue for FileOrDirPath {
   const NAME: &'static str = "file or dir path";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::FilePath(ref file) => Some(Self::File(file.clone())),
         Value::DirPath(ref dir) => Some(Self::Dir(dir.clone())),
         Value::Scope(_) => json::decode_via_json(value),
         _ => None,
      }
   }
}

impl FromValue for HostPath {
   const NAME: &'static str = "host path";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::HostPath(ref host) => Some(host.clone()),
         Value::Scope(_) => json::decode_via_json(value),
         _ => None,
      }
   }
}

impl FromValue for ThunkPath {
   const NAME: &'static str = "thunk path";

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::ThunkPath(ref path) => Some(path.clone()),
         Value::Scope(_) => json::decode_via_json(value),
         _ => None,
      }
   }
}

impl<T: FromValue> FromValue for Option<T> {
   const NAME: &'static str = T::NAME;

   fn from_value(value: &Value) -> Option<Self> {
      match *value {
         Value::Null => Some(None),
         ref value => T::from_value(value).map(Some),
      }
   }
}

impl<T: FromValue> FromValue for Vec<T> {
   const NAME: &'static str = "list";

   fn from_value(value: &Value) -> Option<Self> {
      value
         .to_vec()
         .ok()?
         .iter()
         .map(|item| T::from_value(item.bare()))
         .collect()
   }
}
