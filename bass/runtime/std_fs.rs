//! Filesystems embedded in the binary.
//!
//! `std` holds the standard library that is evaluated into ground, `demos`
//! holds example scripts that can be run without anything on disk.

use crate::value::{
   FileOrDirPath,
   FilePath,
   FsPath,
};

pub const STD: &str = "std";
pub const DEMOS: &str = "demos";

/// Standard library files, in the order they are evaluated into ground.
pub const BOOTSTRAP: &[&str] = &[
   "root.bass",
   "bool.bass",
   "lists.bass",
   "streams.bass",
   "run.bass",
];

type Files = phf::Map<&'static str, &'static str>;

static STD_FILES: Files = phf::phf_map! {
   "root.bass" => include_str!("std/root.bass"),
   "bool.bass" => include_str!("std/bool.bass"),
   "lists.bass" => include_str!("std/lists.bass"),
   "streams.bass" => include_str!("std/streams.bass"),
   "run.bass" => include_str!("std/run.bass"),
};

static DEMO_FILES: Files = phf::phf_map! {
   "hello.bass" => include_str!("demos/hello.bass"),
   "pipeline.bass" => include_str!("demos/pipeline.bass"),
};

fn files(fs: &str) -> Option<&'static Files> {
   match fs {
      STD => Some(&STD_FILES),
      DEMOS => Some(&DEMO_FILES),
      _ => None,
   }
}

/// The contents of a file, by its path relative to the filesystem root.
#[must_use]
pub fn read(fs: &str, path: &str) -> Option<&'static str> {
   files(fs)?.get(path).copied()
}

/// Every file in a filesystem, sorted.
#[must_use]
pub fn list(fs: &str) -> Vec<&'static str> {
   let mut names = files(fs)
      .map(|files| files.keys().copied().collect::<Vec<_>>())
      .unwrap_or_default();

   names.sort_unstable();
   names
}

#[must_use]
pub fn path(fs: &str, file: &str) -> FsPath {
   FsPath {
      fs:   fs.into(),
      path: FileOrDirPath::File(FilePath::new(format!("./{file}"))),
   }
}
