use std::{
   fmt,
   sync::Arc,
};

use arcstr::ArcStr;

use crate::thunk::Thunk;

/// The platform a thunk runs on. An empty architecture matches any.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Platform {
   pub os: ArcStr,

   #[serde(default, skip_serializing_if = "str::is_empty")]
   pub arch: ArcStr,
}

impl fmt::Display for Platform {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      if self.arch.is_empty() {
         writer.write_str(&self.os)
      } else {
         write!(writer, "{os}/{arch}", os = self.os, arch = self.arch)
      }
   }
}

impl Platform {
   #[must_use]
   pub fn new(os: impl Into<ArcStr>, arch: impl Into<ArcStr>) -> Self {
      Self {
         os:   os.into(),
         arch: arch.into(),
      }
   }

   /// The platform of the machine running Bass, with any architecture.
   #[must_use]
   pub fn host() -> Self {
      Self::new(std::env::consts::OS, "")
   }

   /// Whether a runtime registered for this platform can run thunks that
   /// need the given one.
   #[must_use]
   pub fn can_select(&self, need: &Self) -> bool {
      self.os == need.os && (self.arch.is_empty() || need.arch.is_empty() || self.arch == need.arch)
   }
}

/// A reference to an image in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ImageRef {
   pub platform:   Platform,
   pub repository: ArcStr,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub tag: Option<ArcStr>,

   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub digest: Option<ArcStr>,
}

impl fmt::Display for ImageRef {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      match (&self.digest, &self.tag) {
         (Some(digest), _) => write!(writer, "{repository}@{digest}", repository = self.repository),
         (None, Some(tag)) => write!(writer, "{repository}:{tag}", repository = self.repository),
         (None, None) => write!(writer, "{repository}:latest", repository = self.repository),
      }
   }
}

/// What a thunk's filesystem starts out as.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThunkImage {
   Ref(ImageRef),
   Thunk(Arc<Thunk>),
}

impl ThunkImage {
   /// The platform of the image, looking through thunk images.
   #[must_use]
   pub fn platform(&self) -> Option<&Platform> {
      match *self {
         Self::Ref(ref image) => Some(&image.platform),
         Self::Thunk(ref thunk) => thunk.platform(),
      }
   }
}
