use std::fmt;

use arcstr::ArcStr;

use crate::{
   Error,
   Result,
   Value,
   value::{
      CommandPath,
      DirPath,
      FileOrDirPath,
      FilePath,
      FsPath,
      HostPath,
      ThunkPath,
   },
};

/// What a thunk runs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ThunkCmd {
   Command(CommandPath),
   File(FilePath),
   Thunk(ThunkPath),
   Host(HostPath),
   Fs(FsPath),
}

impl fmt::Display for ThunkCmd {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match *self {
         Self::Command(ref command) => command.fmt(writer),
         Self::File(ref file) => file.fmt(writer),
         Self::Thunk(ref path) => path.fmt(writer),
         Self::Host(ref host) => host.fmt(writer),
         Self::Fs(ref fs) => fs.fmt(writer),
      }
   }
}

impl From<ThunkCmd> for Value {
   fn from(cmd: ThunkCmd) -> Self {
      match cmd {
         ThunkCmd::Command(command) => Self::CommandPath(command),
         ThunkCmd::File(file) => Self::FilePath(file),
         ThunkCmd::Thunk(path) => Self::ThunkPath(path),
         ThunkCmd::Host(host) => Self::HostPath(host),
         ThunkCmd::Fs(fs) => Self::FsPath(fs),
      }
   }
}

impl TryFrom<&Value> for ThunkCmd {
   type Error = Error;

   fn try_from(value: &Value) -> Result<Self> {
      Ok(match *value.bare() {
         Value::CommandPath(ref command) => Self::Command(command.clone()),
         Value::FilePath(ref file) => Self::File(file.clone()),
         Value::ThunkPath(ref path) if !path.path.is_dir() => Self::Thunk(path.clone()),
         Value::HostPath(ref host) if !host.path.is_dir() => Self::Host(host.clone()),
         Value::FsPath(ref fs) if !fs.path.is_dir() => Self::Fs(fs.clone()),
         Value::String(ref name) => Self::Command(CommandPath { name: name.clone() }),

         ref other => {
            return Err(Error::Decode {
               value: other.to_string(),
               have:  other.type_name(),
               need:  "command",
            });
         },
      })
   }
}

/// The working directory of a thunk.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ThunkDir {
   Dir(DirPath),
   Thunk(ThunkPath),
   Host(HostPath),
}

impl From<ThunkDir> for Value {
   fn from(dir: ThunkDir) -> Self {
      match dir {
         ThunkDir::Dir(dir) => Self::DirPath(dir),
         ThunkDir::Thunk(path) => Self::ThunkPath(path),
         ThunkDir::Host(host) => Self::HostPath(host),
      }
   }
}

impl TryFrom<&Value> for ThunkDir {
   type Error = Error;

   fn try_from(value: &Value) -> Result<Self> {
      Ok(match *value.bare() {
         Value::DirPath(ref dir) => Self::Dir(dir.clone()),
         Value::ThunkPath(ref path) if path.path.is_dir() => Self::Thunk(path.clone()),
         Value::HostPath(ref host) if host.path.is_dir() => Self::Host(host.clone()),

         ref other => {
            return Err(Error::Decode {
               value: other.to_string(),
               have:  other.type_name(),
               need:  "dir path",
            });
         },
      })
   }
}

/// A cache directory shared between runs, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheSource {
   pub cache: ArcStr,
}

/// A secret provided by the runtime, keyed by its name. Its value never
/// takes part in the thunk's hash.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecretSource {
   pub secret: ArcStr,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MountSource {
   Thunk(ThunkPath),
   Host(HostPath),
   Fs(FsPath),
   Cache(CacheSource),
   Secret(SecretSource),
}

impl fmt::Display for MountSource {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match *self {
         Self::Thunk(ref path) => path.fmt(writer),
         Self::Host(ref host) => host.fmt(writer),
         Self::Fs(ref fs) => fs.fmt(writer),
         Self::Cache(ref cache) => write!(writer, "<cache: {id}>", id = cache.cache),
         Self::Secret(ref secret) => write!(writer, "<secret: {name}>", name = secret.secret),
      }
   }
}

impl TryFrom<&Value> for MountSource {
   type Error = Error;

   fn try_from(value: &Value) -> Result<Self> {
      Ok(match *value.bare() {
         Value::ThunkPath(ref path) => Self::Thunk(path.clone()),
         Value::HostPath(ref host) => Self::Host(host.clone()),
         Value::FsPath(ref fs) => Self::Fs(fs.clone()),
         Value::Thunk(ref thunk) => {
            Self::Thunk(ThunkPath {
               thunk: thunk.clone(),
               path:  FileOrDirPath::Dir(DirPath::new(".")),
            })
         },

         Value::Scope(ref scope) => {
            if let Some(Value::String(cache)) = scope.get("cache").as_ref().map(Value::bare) {
               Self::Cache(CacheSource { cache: cache.clone() })
            } else if let Some(Value::String(secret)) = scope.get("secret").as_ref().map(Value::bare) {
               Self::Secret(SecretSource {
                  secret: secret.clone(),
               })
            } else {
               return Err(Error::Decode {
                  value: value.to_string(),
                  have:  "scope",
                  need:  "mount source",
               });
            }
         },

         ref other => {
            return Err(Error::Decode {
               value: other.to_string(),
               have:  other.type_name(),
               need:  "mount source",
            });
         },
      })
   }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThunkMount {
   pub source: MountSource,
   pub target: FileOrDirPath,
}

fn is_false(bool: &bool) -> bool {
   !bool
}

fn json_protocol() -> ArcStr {
   arcstr::literal!("json")
}

/// Where a thunk's response comes from, and how to decode it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Response {
   #[serde(default, skip_serializing_if = "is_false")]
   pub stdout: bool,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub file: Option<FilePath>,

   #[serde(default, skip_serializing_if = "is_false")]
   pub exit: bool,

   #[serde(default = "json_protocol")]
   pub protocol: ArcStr,
}

impl Default for Response {
   fn default() -> Self {
      Self {
         stdout:   true,
         file:     None,
         exit:     false,
         protocol: json_protocol(),
      }
   }
}

impl Response {
   #[must_use]
   pub fn file(file: FilePath, protocol: impl Into<ArcStr>) -> Self {
      Self {
         stdout:   false,
         file:     Some(file),
         exit:     false,
         protocol: protocol.into(),
      }
   }

   #[must_use]
   pub fn exit() -> Self {
      Self {
         stdout:   false,
         file:     None,
         exit:     true,
         protocol: json_protocol(),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn cmd_variants_are_detected_by_their_keys() {
      let command: ThunkCmd = serde_json::from_str(r#"{"command":"echo"}"#).unwrap();
      assert!(matches!(command, ThunkCmd::Command(_)));

      let file: ThunkCmd = serde_json::from_str(r#"{"file":"./run"}"#).unwrap();
      assert!(matches!(file, ThunkCmd::File(_)));

      let host: ThunkCmd =
         serde_json::from_str(r#"{"host":"/src","path":{"file":"./build.sh"}}"#).unwrap();
      assert!(matches!(host, ThunkCmd::Host(_)));

      let fs: ThunkCmd = serde_json::from_str(r#"{"fs":"std","path":{"file":"./root.bass"}}"#).unwrap();
      assert!(matches!(fs, ThunkCmd::Fs(_)));
   }

   #[test]
   fn responses() {
      assert_eq!(
         serde_json::to_string(&Response::default()).unwrap(),
         r#"{"stdout":true,"protocol":"json"}"#
      );

      let response: Response = serde_json::from_str(r#"{"exit":true}"#).unwrap();
      assert_eq!(response, Response::exit());

      assert_eq!(
         serde_json::to_string(&Response::file(FilePath::new("out"), "raw")).unwrap(),
         r#"{"file":{"file":"out"},"protocol":"raw"}"#
      );
   }

   #[test]
   fn cmd_from_values() {
      assert!(matches!(
         ThunkCmd::try_from(&Value::string("echo")).unwrap(),
         ThunkCmd::Command(_)
      ));
      assert!(ThunkCmd::try_from(&Value::DirPath(DirPath::new("./"))).is_err());
      assert!(ThunkDir::try_from(&Value::FilePath(FilePath::new("./x"))).is_err());
   }
}
