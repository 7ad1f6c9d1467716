//! Thunks: reproducible descriptions of a process to run.
//!
//! A thunk is identified by the hash of its JSON encoding. Every field is
//! emitted in declaration order and scopes keep their insertion order, so
//! equal thunks always encode to the same bytes.

use std::{
   fmt,
   sync::Arc,
};

use sha1::Sha1;
use sha2::{
   Digest as _,
   Sha256,
};

use crate::{
   Error,
   Result,
   Scope,
   Value,
   value::FileOrDirPath,
};

mod image;
pub use image::{
   ImageRef,
   Platform,
   ThunkImage,
};

mod types;
pub use types::{
   CacheSource,
   MountSource,
   Response,
   SecretSource,
   ThunkCmd,
   ThunkDir,
   ThunkMount,
};

fn is_false(bool: &bool) -> bool {
   !bool
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Thunk {
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub image: Option<ThunkImage>,

   #[serde(default, skip_serializing_if = "is_false")]
   pub insecure: bool,

   pub cmd: ThunkCmd,

   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub args: Vec<Value>,

   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub stdin: Vec<Value>,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub env: Option<Scope>,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub dir: Option<ThunkDir>,

   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub mounts: Vec<ThunkMount>,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub response: Option<Response>,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub labels: Option<Scope>,
}

impl fmt::Display for Thunk {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self.name() {
         Ok(name) => write!(writer, "<thunk: {name}>"),
         Err(_) => write!(writer, "<thunk: {cmd}>", cmd = self.cmd),
      }
   }
}

impl Thunk {
   #[must_use]
   pub fn new(cmd: ThunkCmd) -> Self {
      Self {
         image: None,
         insecure: false,
         cmd,
         args: Vec::new(),
         stdin: Vec::new(),
         env: None,
         dir: None,
         mounts: Vec::new(),
         response: None,
         labels: None,
      }
   }

   /// The thunk a called path builds: the path is the command and the
   /// arguments are its standard input.
   pub fn from_command(path: &Value, stdin: Vec<Value>) -> Result<Self> {
      let mut thunk = Self::new(ThunkCmd::try_from(path)?);
      thunk.stdin = stdin;
      thunk.check()?;

      Ok(thunk)
   }

   pub fn from_json(json: &serde_json::Value) -> Result<Self> {
      Ok(Self::deserialize_json(json)?)
   }

   fn deserialize_json(json: &serde_json::Value) -> serde_json::Result<Self> {
      serde::Deserialize::deserialize(json)
   }

   /// Fails with [`Error::Encode`] unless every value in the thunk has a
   /// JSON encoding.
   pub fn check(&self) -> Result<()> {
      self.to_json().map(drop)
   }

   pub fn to_json(&self) -> Result<serde_json::Value> {
      serde_json::to_value(self).map_err(|error| {
         tracing::debug!("Failed to encode thunk: {error}.");

         Error::Encode {
            value: format!("<thunk: {cmd}>", cmd = self.cmd),
         }
      })
   }

   /// The stable JSON encoding the hash is computed over.
   pub fn to_bytes(&self) -> Result<Vec<u8>> {
      serde_json::to_vec(self).map_err(|_| {
         Error::Encode {
            value: format!("<thunk: {cmd}>", cmd = self.cmd),
         }
      })
   }

   /// The SHA-256 of the encoding, in hex.
   pub fn hash(&self) -> Result<String> {
      Ok(hex::encode(Sha256::digest(self.to_bytes()?)))
   }

   /// The SHA-1 of the encoding, in hex. Names the directories a thunk's
   /// outputs are mounted under.
   pub fn sha1(&self) -> Result<String> {
      Ok(hex::encode(Sha1::digest(self.to_bytes()?)))
   }

   /// A short name for logs and displays.
   pub fn name(&self) -> Result<String> {
      let mut hash = self.hash()?;
      hash.truncate(12);
      Ok(hash)
   }

   #[must_use]
   pub fn platform(&self) -> Option<&Platform> {
      self.image.as_ref().and_then(ThunkImage::platform)
   }

   #[must_use]
   pub fn response(&self) -> Response {
      self.response.clone().unwrap_or_default()
   }

   /// Sets the image. When the image is a thunk, its own image is replaced
   /// instead, so the chain of thunks is kept.
   #[must_use]
   pub fn with_image(mut self, image: ThunkImage) -> Self {
      self.image = Some(match self.image.take() {
         Some(ThunkImage::Thunk(inner)) => {
            ThunkImage::Thunk(Arc::new(Arc::unwrap_or_clone(inner).with_image(image)))
         },
         _ => image,
      });

      self
   }

   #[must_use]
   pub fn with_args(mut self, args: Vec<Value>) -> Self {
      self.args = args;
      self
   }

   #[must_use]
   pub fn with_stdin(mut self, stdin: Vec<Value>) -> Self {
      self.stdin = stdin;
      self
   }

   #[must_use]
   pub fn with_env(mut self, env: Scope) -> Self {
      self.env = Some(env);
      self
   }

   #[must_use]
   pub fn with_insecure(mut self, insecure: bool) -> Self {
      self.insecure = insecure;
      self
   }

   #[must_use]
   pub fn with_dir(mut self, dir: ThunkDir) -> Self {
      self.dir = Some(dir);
      self
   }

   #[must_use]
   pub fn with_response(mut self, response: Response) -> Self {
      self.response = Some(response);
      self
   }

   #[must_use]
   pub fn with_mount(mut self, source: MountSource, target: FileOrDirPath) -> Self {
      self.mounts.push(ThunkMount { source, target });
      self
   }

   /// Adds a label. Labels never change the command, only the hash.
   #[must_use]
   pub fn with_label(mut self, name: &str, value: Value) -> Self {
      let labels = Scope::new([]);

      if let Some(ref old) = self.labels {
         for (name, value) in old.bindings() {
            labels.set(name, value);
         }
      }

      labels.set(name, value);
      self.labels = Some(labels);
      self
   }

   /// Runs the current command through another one, passing the old command
   /// and the extra arguments before the old arguments.
   #[must_use]
   pub fn wrap_cmd(mut self, cmd: ThunkCmd, prepend: Vec<Value>) -> Self {
      let old = std::mem::replace(&mut self.cmd, cmd);

      let mut args = Vec::with_capacity(1 + prepend.len() + self.args.len());
      args.push(Value::from(old));
      args.extend(prepend);
      args.append(&mut self.args);

      self.args = args;
      self
   }
}

#[cfg(test)]
mod tests {
   use proptest::prelude::*;

   use super::*;
   use crate::value::{
      CommandPath,
      FilePath,
   };

   fn echo() -> Thunk {
      Thunk::new(ThunkCmd::File(FilePath::new("/bin/echo")))
         .with_args(vec![Value::string("hi")])
         .with_image(ThunkImage::Ref(ImageRef {
            platform:   Platform::new("linux", ""),
            repository: "alpine".into(),
            tag:        None,
            digest:     None,
         }))
   }

   #[test]
   fn keys_are_emitted_in_order() {
      let thunk = echo()
         .with_response(Response::default())
         .with_label("at", Value::Int(1));

      assert_eq!(
         String::from_utf8(thunk.to_bytes().unwrap()).unwrap(),
         r#"{"image":{"ref":{"platform":{"os":"linux"},"repository":"alpine"}},"cmd":{"file":"/bin/echo"},"args":["hi"],"response":{"stdout":true,"protocol":"json"},"labels":{"at":1}}"#
      );

      assert_eq!(
         thunk.hash().unwrap(),
         "ecb8d17db704fb40240930ce318a8fc3ca241ea14161b0ca2ddc0d54123aee32"
      );
      assert_eq!(thunk.sha1().unwrap(), "8b9d71362a53410a6c01fde309da13050419cb71");
      assert_eq!(thunk.name().unwrap(), "ecb8d17db704");
   }

   #[test]
   fn json_round_trip() {
      let thunk = echo().with_stdin(vec![Value::Int(1)]);
      let decoded = Thunk::from_json(&thunk.to_json().unwrap()).unwrap();

      assert_eq!(decoded, thunk);
      assert_eq!(decoded.hash().unwrap(), thunk.hash().unwrap());
   }

   #[test]
   fn labels_change_the_hash_only() {
      let thunk = echo();
      let labeled = thunk.clone().with_label("run", Value::Int(2));

      assert_ne!(thunk.hash().unwrap(), labeled.hash().unwrap());
      assert_eq!(thunk.cmd, labeled.cmd);
      assert_eq!(thunk.sha1().unwrap().len(), 40);
   }

   #[test]
   fn image_chains_are_rebased() {
      let base = echo();
      let outer = Thunk::new(ThunkCmd::Command(CommandPath { name: "ls".into() }))
         .with_image(ThunkImage::Thunk(Arc::new(base)));

      let rebased = outer.with_image(ThunkImage::Ref(ImageRef {
         platform:   Platform::new("linux", "arm64"),
         repository: "debian".into(),
         tag:        None,
         digest:     None,
      }));

      let Some(ThunkImage::Thunk(ref inner)) = rebased.image else {
         panic!("expected a thunk image");
      };
      assert!(matches!(inner.image, Some(ThunkImage::Ref(ref image)) if &*image.repository == "debian"));
      assert_eq!(rebased.platform().map(|platform| &*platform.arch), Some("arm64"));
   }

   #[test]
   fn wrap_cmd_prepends() {
      let wrapped = echo().wrap_cmd(
         ThunkCmd::Command(CommandPath { name: "env".into() }),
         vec![Value::string("-i")],
      );

      assert_eq!(wrapped.args, [
         Value::FilePath(FilePath::new("/bin/echo")),
         Value::string("-i"),
         Value::string("hi"),
      ]);
   }

   #[test]
   fn unencodable_stdin_is_rejected() {
      let path = Value::CommandPath(CommandPath { name: "cat".into() });

      assert!(Thunk::from_command(&path, vec![Value::Int(1)]).is_ok());
      assert!(matches!(
         Thunk::from_command(&path, vec![Value::cons(Value::Int(1), Value::Empty)]),
         Err(Error::Encode { .. })
      ));
   }

   proptest! {
      #[test]
      fn hashes_are_deterministic(args in prop::collection::vec(any::<i64>(), 0..8)) {
         let thunk = echo().with_args(args.iter().copied().map(Value::Int).collect());
         let again = Thunk::from_json(&thunk.to_json().unwrap()).unwrap();

         prop_assert_eq!(thunk.hash().unwrap(), again.hash().unwrap());
      }
   }
}
