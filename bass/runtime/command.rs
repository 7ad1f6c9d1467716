//! Lowering thunks to the concrete commands a driver executes.
//!
//! Paths are symbolic until here. Plain paths become their text, paths
//! rooted somewhere else (a thunk's output, the host, an embedded
//! filesystem) become mounts under the working directory of the command,
//! and the arguments refer to them by where they are mounted.

use rustc_hash::FxHashSet;
use sha2::{
   Digest as _,
   Sha256,
};

use crate::{
   Error,
   Result,
   Scope,
   Value,
   thunk::{
      MountSource,
      Thunk,
   },
   value::{
      DirPath,
      FileOrDirPath,
      json,
   },
};

/// The directory the shim and its files are mounted at inside a container.
pub const SHIM_DIR: &str = "/bass";

/// Where the shim reads the command from inside a container.
pub const SHIM_INPUT: &str = const_str::concat!(SHIM_DIR, "/cmd.json");

/// Where the shim copies the standard output of the command to.
pub const SHIM_OUTPUT: &str = const_str::concat!(SHIM_DIR, "/response");

/// The certificate authority the shim trusts, when present.
pub const SHIM_CA: &str = const_str::concat!(SHIM_DIR, "/ca.crt");

/// Every file a command leaves behind has its times set to this, as
/// seconds since the Unix epoch. 1985-10-26T08:15:00Z.
pub const EPOCH: i64 = 499_162_500;

/// A source mounted into the working directory of a command.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CommandMount {
   pub source: MountSource,
   pub target: String,
}

/// A thunk with every path resolved.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Command {
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub entrypoint: Vec<String>,

   pub args: Vec<String>,

   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub stdin: Vec<serde_json::Value>,

   /// `KEY=value` pairs.
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub env: Vec<String>,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub dir: Option<String>,

   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub mounts: Vec<CommandMount>,
}

impl Command {
   pub fn resolve(thunk: &Thunk) -> Result<Self> {
      let mut resolver = Resolver::default();

      if let Some(ref dir) = thunk.dir {
         let dir = resolver.string(&Value::from(dir.clone()))?;
         resolver.command.dir = Some(dir);
      }

      let cmd = resolver.string(&Value::from(thunk.cmd.clone()))?;
      resolver.command.args.push(cmd);

      for arg in &thunk.args {
         let arg = resolver.string(arg)?;
         resolver.command.args.push(arg);
      }

      if let Some(ref env) = thunk.env {
         for (name, value) in env.bindings() {
            let value = resolver.string(&value)?;

            resolver
               .command
               .env
               .push(format!("{name}={value}", name = json::key_to_json(&name)));
         }
      }

      for value in &thunk.stdin {
         let value = resolver.json(value)?;
         resolver.command.stdin.push(value);
      }

      for mount in &thunk.mounts {
         resolver.command.mounts.push(CommandMount {
            source: mount.source.clone(),
            target: mount.target.to_string(),
         });
      }

      Ok(resolver.command)
   }

   /// Everything to execute, program first.
   #[must_use]
   pub fn argv(&self) -> Vec<&str> {
      self
         .entrypoint
         .iter()
         .chain(&self.args)
         .map(String::as_str)
         .collect()
   }

   /// The environment as name and value pairs. Entries without a `=` are
   /// skipped.
   pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
      self.env.iter().filter_map(|pair| {
         let split = pair.split_once('=');

         if split.is_none() {
            tracing::warn!("Ignoring malformed environment entry {pair:?}.");
         }

         split
      })
   }
}

/// The concatenation form, `{:arg [...]}`.
fn concatenation(scope: &Scope) -> Option<Vec<Value>> {
   scope.get("arg")?.to_vec().ok()
}

/// The name a rooted path is mounted under.
fn root_name(source: &MountSource) -> Result<String> {
   Ok(match *source {
      MountSource::Thunk(ref path) => path.thunk.sha1()?,
      MountSource::Host(ref host) => {
         let digest = Sha256::digest(host.context.as_bytes());
         hex::encode(&digest[..20])
      },
      MountSource::Fs(ref fs) => fs.fs.to_string(),
      MountSource::Cache(ref cache) => cache.cache.to_string(),
      MountSource::Secret(ref secret) => secret.secret.to_string(),
   })
}

#[derive(Default)]
struct Resolver {
   command: Command,
   mounted: FxHashSet<String>,
}

impl Resolver {
   /// Mounts a rooted path and returns how the command refers to it.
   fn mount(&mut self, source: MountSource, path: &FileOrDirPath) -> Result<String> {
      let target = DirPath::new(format!("./{root}", root = root_name(&source)?))
         .extend(path)
         .to_string();

      if self.mounted.insert(target.clone()) {
         self.command.mounts.push(CommandMount {
            source,
            target: target.clone(),
         });
      }

      let depth = self.command.dir.as_deref().map_or(0, |dir| {
         dir.split('/')
            .filter(|component| !component.is_empty() && *component != ".")
            .count()
      });

      if depth == 0 {
         return Ok(target);
      }

      Ok(format!(
         "{up}{target}",
         up = "../".repeat(depth),
         target = target.strip_prefix("./").unwrap_or(&target),
      ))
   }

   fn string(&mut self, value: &Value) -> Result<String> {
      match *value.bare() {
         Value::String(ref string) => Ok(string.to_string()),
         Value::Int(int) => Ok(int.to_string()),

         Value::FilePath(ref file) => Ok(file.to_string()),
         Value::DirPath(ref dir) => Ok(dir.to_string()),
         Value::CommandPath(ref command) => Ok(command.name.to_string()),

         Value::ThunkPath(ref path) => self.mount(MountSource::Thunk(path.clone()), &path.path),
         Value::HostPath(ref host) => self.mount(MountSource::Host(host.clone()), &host.path),
         Value::FsPath(ref fs) => self.mount(MountSource::Fs(fs.clone()), &fs.path),

         Value::Thunk(_) => {
            let source = MountSource::try_from(value)?;
            self.mount(source, &FileOrDirPath::Dir(DirPath::new(".")))
         },

         Value::Scope(ref scope) => {
            let Some(values) = concatenation(scope) else {
               return Err(Error::Decode {
                  value: value.to_string(),
                  have:  "scope",
                  need:  "string",
               });
            };

            let mut joined = String::new();
            for value in &values {
               joined.push_str(&self.string(value)?);
            }

            Ok(joined)
         },

         ref other => {
            Err(Error::Decode {
               value: other.to_string(),
               have:  other.type_name(),
               need:  "string",
            })
         },
      }
   }

   /// Resolves every path in a value, keeping its structure.
   fn json(&mut self, value: &Value) -> Result<serde_json::Value> {
      match *value.bare() {
         Value::FilePath(_)
         | Value::DirPath(_)
         | Value::CommandPath(_)
         | Value::ThunkPath(_)
         | Value::HostPath(_)
         | Value::FsPath(_) => self.string(value).map(serde_json::Value::String),

         Value::Scope(ref scope) if concatenation(scope).is_some() => {
            self.string(value).map(serde_json::Value::String)
         },

         Value::Scope(ref scope) => {
            let mut object = serde_json::Map::new();

            for (name, value) in scope.bindings() {
               object.insert(json::key_to_json(&name), self.json(&value)?);
            }

            Ok(serde_json::Value::Object(object))
         },

         Value::Pair(_) if value.bare().is_list() => {
            let mut items = Vec::new();

            for item in value.bare().iter_list() {
               items.push(self.json(item)?);
            }

            Ok(serde_json::Value::Array(items))
         },

         _ => json::to_json(value),
      }
   }
}

#[cfg(test)]
mod tests {
   use std::sync::Arc;

   use super::*;
   use crate::{
      thunk::{
         ThunkCmd,
         ThunkDir,
      },
      value::{
         CommandPath,
         FilePath,
         ThunkPath,
      },
   };

   fn run() -> Thunk {
      Thunk::new(ThunkCmd::Command(CommandPath { name: "run".into() }))
   }

   fn script() -> ThunkPath {
      ThunkPath {
         thunk: Arc::new(Thunk::new(ThunkCmd::File(FilePath::new("./yo")))),
         path:  FileOrDirPath::File(FilePath::new("./script")),
      }
   }

   #[test]
   fn command_paths() {
      assert_eq!(Command::resolve(&run()).unwrap(), Command {
         args: vec!["run".to_owned()],
         ..Command::default()
      });

      let file = Thunk::new(ThunkCmd::File(FilePath::new("./run")));
      assert_eq!(Command::resolve(&file).unwrap().args, ["./run"]);
   }

   #[test]
   fn thunk_paths_are_mounted_once() {
      let script = script();
      let hash = script.thunk.sha1().unwrap();

      let thunk = Thunk::new(ThunkCmd::Thunk(script.clone())).with_args(vec![
         Value::ThunkPath(script.clone()),
         Value::string("--verbose"),
      ]);

      let command = Command::resolve(&thunk).unwrap();
      let target = format!("./{hash}/script");

      assert_eq!(command.args, [target.clone(), target.clone(), "--verbose".to_owned()]);
      assert_eq!(command.mounts, [CommandMount {
         source: MountSource::Thunk(script),
         target,
      }]);
   }

   #[test]
   fn paths_are_relative_to_the_dir() {
      let script = script();
      let hash = script.thunk.sha1().unwrap();

      let dir = ThunkPath {
         thunk: script.thunk.clone(),
         path:  FileOrDirPath::Dir(DirPath::new("./src")),
      };

      let thunk = run()
         .with_dir(ThunkDir::Thunk(dir))
         .with_args(vec![Value::ThunkPath(script)]);

      let command = Command::resolve(&thunk).unwrap();

      assert_eq!(command.dir, Some(format!("./{hash}/src/")));
      assert_eq!(command.args[1], format!("../../{hash}/script"));
      assert_eq!(command.mounts.len(), 2);
   }

   #[test]
   fn env_and_concatenation() {
      let env = Scope::new([]);
      env.set("foo-bar", Value::string("baz"));

      let arg = Scope::new([]);
      arg.set(
         "arg",
         Value::list([Value::string("--dir="), Value::DirPath(DirPath::new("./out"))]),
      );

      let command = Command::resolve(&run().with_env(env).with_args(vec![Value::Scope(arg)])).unwrap();

      assert_eq!(command.env, ["foo_bar=baz"]);
      assert_eq!(command.env_pairs().collect::<Vec<_>>(), [("foo_bar", "baz")]);
      assert_eq!(command.args, ["run", "--dir=./out/"]);
   }

   #[test]
   fn malformed_env_entries_are_skipped() {
      let command = Command {
         env: vec!["A=1".to_owned(), "BROKEN".to_owned(), "B=x=y".to_owned()],
         ..Command::default()
      };

      assert_eq!(command.env_pairs().collect::<Vec<_>>(), [("A", "1"), ("B", "x=y")]);
   }

   #[test]
   fn stdin_keeps_its_structure() {
      let scope = Scope::new([]);
      scope.set("path", Value::FilePath(FilePath::new("./a")));
      scope.set("n", Value::Int(1));

      let command = Command::resolve(&run().with_stdin(vec![
         Value::Scope(scope),
         Value::list([Value::CommandPath(CommandPath { name: "ls".into() })]),
      ]))
      .unwrap();

      assert_eq!(command.stdin, [
         serde_json::json!({ "path": "./a", "n": 1 }),
         serde_json::json!(["ls"]),
      ]);
   }

   #[test]
   fn unresolvable() {
      let thunk = run().with_args(vec![Value::Bool(true)]);
      assert!(matches!(Command::resolve(&thunk), Err(Error::Decode { need: "string", .. })));
   }

   #[test]
   fn argv() {
      let command = Command {
         entrypoint: vec!["tini".to_owned()],
         args: vec!["run".to_owned()],
         ..Command::default()
      };

      assert_eq!(command.argv(), ["tini", "run"]);
      assert_eq!(
         serde_json::to_string(&command).unwrap(),
         r#"{"entrypoint":["tini"],"args":["run"]}"#
      );
   }
}
