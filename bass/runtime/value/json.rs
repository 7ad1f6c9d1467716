//! JSON encoding of values.
//!
//! Data values map onto JSON directly. Scopes become objects whose keys have
//! `-` replaced with `_`, paths and thunks become objects with distinguishing
//! keys. Combiners, continuations, streams and unevaluated forms can not be
//! encoded.

use std::{
   cell::RefCell,
   result,
};

use serde::{
   Deserialize,
   Deserializer,
   Serialize,
   Serializer,
   de::DeserializeOwned,
   ser::{
      self,
      SerializeMap as _,
      SerializeSeq as _,
   },
};

use crate::{
   Error,
   Result,
   Scope,
   Value,
};

thread_local! {
   /// Scopes currently being encoded, to reject self references.
   static ENCODING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// The JSON key for a binding name.
#[must_use]
pub fn key_to_json(name: &str) -> String {
   name.replace('-', "_")
}

/// The binding name for a JSON key.
#[must_use]
pub fn key_from_json(key: &str) -> String {
   key.replace('_', "-")
}

impl Serialize for Scope {
   fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
      let id = self.id();

      let entered = ENCODING.with(|encoding| {
         let mut encoding = encoding.borrow_mut();

         if encoding.contains(&id) {
            false
         } else {
            encoding.push(id);
            true
         }
      });

      if !entered {
         return Err(ser::Error::custom("scope refers to itself"));
      }

      let _guard = scopeguard::guard((), |()| {
         ENCODING.with(|encoding| encoding.borrow_mut().retain(|&other| other != id));
      });

      let bindings = self.bindings();

      let mut map = serializer.serialize_map(Some(bindings.len()))?;
      for (name, value) in &bindings {
         map.serialize_entry(&key_to_json(name), value)?;
      }
      map.end()
   }
}

impl Serialize for Value {
   fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
      match *self {
         Self::Null => serializer.serialize_unit(),
         Self::Bool(bool) => serializer.serialize_bool(bool),
         Self::Int(int) => serializer.serialize_i64(int),
         Self::String(ref string) | Self::Keyword(ref string) | Self::Symbol(ref string) => {
            serializer.serialize_str(string)
         },

         Self::Empty => serializer.serialize_seq(Some(0))?.end(),

         Self::Pair(_) => {
            let mut list = self.iter_list();

            let mut seq = serializer.serialize_seq(None)?;
            for item in list.by_ref() {
               seq.serialize_element(item)?;
            }

            if !matches!(*list.rest(), Self::Empty) {
               return Err(ser::Error::custom(format!("cannot encode improper list {self}")));
            }

            seq.end()
         },

         Self::Scope(ref scope) => scope.serialize(serializer),

         Self::Annotated(ref annotated) => annotated.value.serialize(serializer),

         Self::DirPath(ref path) => path.serialize(serializer),
         Self::FilePath(ref path) => path.serialize(serializer),
         Self::CommandPath(ref path) => path.serialize(serializer),
         Self::HostPath(ref path) => path.serialize(serializer),
         Self::FsPath(ref path) => path.serialize(serializer),
         Self::ThunkPath(ref path) => path.serialize(serializer),

         Self::Thunk(ref thunk) => thunk.serialize(serializer),

         ref other => {
            Err(ser::Error::custom(format!(
               "cannot encode {type_name} {other}",
               type_name = other.type_name(),
            )))
         },
      }
   }
}

impl<'de> Deserialize<'de> for Value {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
      serde_json::Value::deserialize(deserializer).map(|json| from_json(&json))
   }
}

impl<'de> Deserialize<'de> for Scope {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
      match Value::deserialize(deserializer)? {
         Value::Scope(scope) => Ok(scope),
         other => {
            Err(serde::de::Error::custom(format!(
               "expected an object, got {other}"
            )))
         },
      }
   }
}

/// Encodes the value, failing with [`Error::Encode`] for values that have no
/// JSON form.
pub fn to_json(value: &Value) -> Result<serde_json::Value> {
   serde_json::to_value(value).map_err(|error| {
      tracing::debug!("Failed to encode {value}: {error}.");

      Error::Encode {
         value: value.to_string(),
      }
   })
}

/// Encodes the value as compact JSON text.
pub fn to_string(value: &Value) -> Result<String> {
   to_json(value).map(|json| json.to_string())
}

/// Decodes any JSON. Objects become scopes, arrays become lists, numbers
/// that are not integers are kept as their text.
#[must_use]
pub fn from_json(json: &serde_json::Value) -> Value {
   match *json {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(bool) => Value::Bool(bool),
      serde_json::Value::Number(ref number) => {
         number
            .as_i64()
            .map_or_else(|| Value::string(number.to_string()), Value::Int)
      },
      serde_json::Value::String(ref string) => Value::string(string.as_str()),
      serde_json::Value::Array(ref items) => Value::list(items.iter().map(from_json).collect::<Vec<_>>()),
      serde_json::Value::Object(ref object) => {
         let scope = Scope::new([]);

         for (key, value) in object {
            scope.set(key_from_json(key), from_json(value));
         }

         Value::Scope(scope)
      },
   }
}

/// Decodes a structured type out of a value by going through its JSON form,
/// so scopes decode into anything with the same shape.
pub fn decode_via_json<T: DeserializeOwned>(value: &Value) -> Option<T> {
   let json = to_json(value).ok()?;
   serde_json::from_value(json).ok()
}

#[cfg(test)]
mod tests {
   use proptest::prelude::*;

   use super::*;
   use crate::value::{
      DirPath,
      FileOrDirPath,
      FilePath,
      HostPath,
   };

   fn data() -> impl Strategy<Value = Value> {
      let leaf = prop_oneof![
         Just(Value::Null),
         any::<bool>().prop_map(Value::Bool),
         any::<i64>().prop_map(Value::Int),
         "[a-z ]{0,8}".prop_map(Value::string),
      ];

      leaf.prop_recursive(3, 24, 4, |inner| {
         prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::list),
            prop::collection::vec(("[a-z]{1,3}(-[a-z]{1,3})?", inner), 0..4).prop_map(|entries| {
               let scope = Scope::new([]);
               for (key, value) in entries {
                  scope.set(key, value);
               }
               Value::Scope(scope)
            }),
         ]
      })
   }

   proptest! {
      #[test]
      fn data_round_trips(value in data()) {
         let json = to_json(&value).unwrap();
         prop_assert_eq!(from_json(&json), value);
      }
   }

   #[test]
   fn keys_swap_hyphens() {
      let scope = Scope::new([]);
      scope.set("foo-bar", Value::Int(1));

      assert_eq!(to_string(&Value::Scope(scope)).unwrap(), r#"{"foo_bar":1}"#);

      let Value::Scope(decoded) = from_json(&serde_json::json!({ "a_b": true })) else {
         panic!("expected a scope");
      };
      assert_eq!(decoded.get("a-b"), Some(Value::Bool(true)));
   }

   #[test]
   fn paths() {
      assert_eq!(
         to_string(&Value::FilePath(FilePath::new("./a/b"))).unwrap(),
         r#"{"file":"./a/b"}"#,
      );

      let host = Value::HostPath(HostPath {
         context: "/src".into(),
         path:    FileOrDirPath::Dir(DirPath::new(".")),
      });
      assert_eq!(to_string(&host).unwrap(), r#"{"host":"/src","path":{"dir":"."}}"#);

      let decoded = from_json(&to_json(&host).unwrap());
      assert_eq!(decoded.decode::<HostPath>().ok(), host.decode::<HostPath>().ok());
   }

   #[test]
   fn unencodable() {
      let cons = Value::cons(Value::Int(1), Value::Empty);
      assert!(matches!(to_json(&cons), Err(Error::Encode { .. })));

      assert!(to_json(&Value::pair(Value::Int(1), Value::Int(2))).is_err());

      let scope = Scope::new([]);
      scope.set("self", Value::Scope(scope.clone()));
      assert!(to_json(&Value::Scope(scope)).is_err());
   }

   #[test]
   fn numbers() {
      assert_eq!(from_json(&serde_json::json!(1.5)), Value::string("1.5"));
      assert_eq!(from_json(&serde_json::json!(-3)), Value::Int(-3));
   }
}
