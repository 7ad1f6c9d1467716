//! Path values.
//!
//! Plain paths ([`DirPath`], [`FilePath`], [`CommandPath`]) are only text.
//! The other kinds root a [`FileOrDirPath`] somewhere: on the host, in an
//! embedded filesystem, or in the output of a thunk that may not have run
//! yet.

use std::{
   fmt,
   path::PathBuf,
   sync::Arc,
};

use arcstr::ArcStr;

use crate::{
   Error,
   Result,
   Value,
   std_fs,
   thunk::Thunk,
};

pub const SEPARATOR: char = '/';

/// Joins a relative child onto a parent path.
fn join(parent: &str, child: &str) -> String {
   let child = child.strip_prefix("./").unwrap_or(child);

   match child {
      "" | "." => parent.to_owned(),
      child => format!("{parent}{SEPARATOR}{child}"),
   }
}

/// A path relative to whatever it is rooted in, without the leading `./`.
fn relative(path: &str) -> &str {
   let path = path.strip_prefix("./").unwrap_or(path);

   if path == "." { "" } else { path }
}

/// A directory path, stored without its trailing separator. The root
/// directory is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DirPath {
   #[serde(rename = "dir")]
   pub path: ArcStr,
}

impl fmt::Display for DirPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "{path}{SEPARATOR}", path = self.path)
   }
}

impl DirPath {
   #[must_use]
   pub fn new(path: impl Into<ArcStr>) -> Self {
      Self { path: path.into() }
   }

   #[must_use]
   pub fn extend(&self, child: &FileOrDirPath) -> FileOrDirPath {
      let path = ArcStr::from(join(&self.path, child.path()));

      match *child {
         FileOrDirPath::File(_) => FileOrDirPath::File(FilePath { path }),
         FileOrDirPath::Dir(_) => FileOrDirPath::Dir(Self { path }),
      }
   }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, serde::Serialize, serde::Deserialize)]
#[display("{path}")]
pub struct FilePath {
   #[serde(rename = "file")]
   pub path: ArcStr,
}

impl FilePath {
   #[must_use]
   pub fn new(path: impl Into<ArcStr>) -> Self {
      Self { path: path.into() }
   }

   /// The last component of the path.
   #[must_use]
   pub fn name(&self) -> &str {
      self
         .path
         .rsplit(SEPARATOR)
         .next()
         .unwrap_or(&self.path)
   }
}

/// `.name`, a command looked up in `$PATH` when run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, serde::Serialize, serde::Deserialize)]
#[display(".{name}")]
pub struct CommandPath {
   #[serde(rename = "command")]
   pub name: ArcStr,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum FileOrDirPath {
   File(FilePath),
   Dir(DirPath),
}

impl FileOrDirPath {
   #[must_use]
   pub fn path(&self) -> &ArcStr {
      match *self {
         Self::File(ref file) => &file.path,
         Self::Dir(ref dir) => &dir.path,
      }
   }

   #[must_use]
   pub fn is_dir(&self) -> bool {
      matches!(*self, Self::Dir(_))
   }

   /// The path relative to its root, without a leading `./`.
   #[must_use]
   pub fn relative(&self) -> &str {
      relative(self.path())
   }

   pub fn extend(&self, child: &Self) -> Result<Self> {
      match *self {
         Self::Dir(ref dir) => Ok(dir.extend(child)),
         Self::File(ref file) => {
            Err(Error::Decode {
               value: file.to_string(),
               have:  "file path",
               need:  "dir path",
            })
         },
      }
   }

   fn write_rooted(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      let relative = self.relative();

      match *self {
         Self::Dir(_) if relative.is_empty() => writer.write_str("/"),
         Self::Dir(_) => write!(writer, "/{relative}/"),
         Self::File(_) => write!(writer, "/{relative}"),
      }
   }
}

/// A path on the machine running Bass, relative to a context directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HostPath {
   #[serde(rename = "host")]
   pub context: ArcStr,
   pub path:    FileOrDirPath,
}

impl fmt::Display for HostPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<host: {context}>", context = self.context)?;
      self.path.write_rooted(writer)
   }
}

impl HostPath {
   #[must_use]
   pub fn to_path_buf(&self) -> PathBuf {
      let mut buf = PathBuf::from(&*self.context);

      let relative = self.path.relative();
      if !relative.is_empty() {
         buf.push(relative);
      }

      buf
   }
}

/// A path in one of the filesystems embedded in the binary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FsPath {
   pub fs:   ArcStr,
   pub path: FileOrDirPath,
}

impl fmt::Display for FsPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<fs: {fs}>", fs = self.fs)?;
      self.path.write_rooted(writer)
   }
}

impl FsPath {
   /// Reads the file this path points to.
   pub fn read(&self) -> Result<&'static str> {
      std_fs::read(&self.fs, self.path.relative()).ok_or_else(|| {
         Error::message(format!("no such file in embedded filesystem: {self}"))
      })
   }
}

/// A path inside the output of a thunk.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThunkPath {
   pub thunk: Arc<Thunk>,
   pub path:  FileOrDirPath,
}

impl fmt::Display for ThunkPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      self.thunk.fmt(writer)?;
      self.path.write_rooted(writer)
   }
}

/// A path extension that is resolved when evaluated, like `dir/file` where
/// `dir` is a symbol.
#[derive(Debug)]
pub struct ExtendPath {
   pub parent: Value,
   pub child:  FileOrDirPath,
}

impl fmt::Display for ExtendPath {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "{parent}{SEPARATOR}{child}", parent = self.parent, child = self.child)
   }
}

impl Value {
   /// Extends a directory-like path with a child path.
   pub fn extend(&self, child: &FileOrDirPath) -> Result<Self> {
      Ok(match *self.bare() {
         Self::DirPath(ref dir) => dir.extend(child).into(),

         Self::HostPath(ref host) => {
            Self::HostPath(HostPath {
               context: host.context.clone(),
               path:    host.path.extend(child)?,
            })
         },

         Self::FsPath(ref fs) => {
            Self::FsPath(FsPath {
               fs:   fs.fs.clone(),
               path: fs.path.extend(child)?,
            })
         },

         Self::ThunkPath(ref thunk) => {
            Self::ThunkPath(ThunkPath {
               thunk: thunk.thunk.clone(),
               path:  thunk.path.extend(child)?,
            })
         },

         // A thunk's output directory.
         Self::Thunk(ref thunk) => {
            Self::ThunkPath(ThunkPath {
               thunk: thunk.clone(),
               path:  DirPath::new(".").extend(child),
            })
         },

         ref other => {
            return Err(Error::Decode {
               value: other.to_string(),
               have:  other.type_name(),
               need:  "dir path",
            });
         },
      })
   }

   /// Whether the value is any kind of path.
   #[must_use]
   pub fn is_path(&self) -> bool {
      matches!(
         *self.bare(),
         Self::DirPath(_)
            | Self::FilePath(_)
            | Self::CommandPath(_)
            | Self::HostPath(_)
            | Self::FsPath(_)
            | Self::ThunkPath(_)
            | Self::ExtendPath(_)
      )
   }
}
