//! The on disk cache of a runtime.
//!
//! ```text
//! artifacts/<hash>/   what the thunk left in its working directory
//! responses/<hash>    its response, as a JSON stream
//! logs/<hash>         its standard error
//! locks/<hash>.lock   held while it runs
//! ```
//!
//! A thunk is cached once its response exists.

use std::{
   fs::File,
   io,
   path::{
      Path,
      PathBuf,
   },
   sync::Arc,
};

use dashmap::DashMap;
use nix::fcntl::{
   Flock,
   FlockArg,
};
use rustc_hash::FxBuildHasher;
use tokio::sync::{
   Mutex,
   OwnedMutexGuard,
};

use crate::Result;

/// Held while a thunk runs. Excludes other tasks of this process through
/// the mutex and other processes through the lock file.
pub struct CacheLock {
   _guard: OwnedMutexGuard<()>,
   _file:  Flock<File>,
}

pub struct Cache {
   root:  PathBuf,
   locks: DashMap<String, Arc<Mutex<()>>, FxBuildHasher>,
}

impl Cache {
   #[must_use]
   pub fn new(root: impl Into<PathBuf>) -> Self {
      Self {
         root:  root.into(),
         locks: DashMap::with_hasher(FxBuildHasher),
      }
   }

   #[must_use]
   pub fn root(&self) -> &Path {
      &self.root
   }

   #[must_use]
   pub fn artifacts(&self, hash: &str) -> PathBuf {
      self.root.join("artifacts").join(hash)
   }

   #[must_use]
   pub fn response(&self, hash: &str) -> PathBuf {
      self.root.join("responses").join(hash)
   }

   #[must_use]
   pub fn log(&self, hash: &str) -> PathBuf {
      self.root.join("logs").join(hash)
   }

   /// A directory shared by every run that mounts the cache with this id.
   #[must_use]
   pub fn shared(&self, id: &str) -> PathBuf {
      self.root.join("caches").join(id)
   }

   pub async fn is_cached(&self, hash: &str) -> bool {
      tokio::fs::try_exists(self.response(hash))
         .await
         .unwrap_or(false)
   }

   pub async fn read_response(&self, hash: &str) -> Result<Vec<u8>> {
      Ok(tokio::fs::read(self.response(hash)).await?)
   }

   /// Stores the response, marking the thunk as cached. The file appears
   /// at once or not at all.
   pub async fn write_response(&self, hash: &str, response: &[u8]) -> Result<()> {
      let path = self.response(hash);
      let partial = path.with_extension("partial");

      if let Some(parent) = path.parent() {
         tokio::fs::create_dir_all(parent).await?;
      }

      tokio::fs::write(&partial, response).await?;
      tokio::fs::rename(&partial, &path).await?;

      Ok(())
   }

   pub async fn lock(&self, hash: &str) -> Result<CacheLock> {
      let mutex = self.locks.entry(hash.to_owned()).or_default().clone();
      let guard = mutex.lock_owned().await;

      let dir = self.root.join("locks");
      tokio::fs::create_dir_all(&dir).await?;

      let path = dir.join(format!("{hash}.lock"));
      let file = tokio::task::spawn_blocking(move || {
         let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

         Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| io::Error::from(errno))
      })
      .await
      .map_err(io::Error::other)??;

      Ok(CacheLock {
         _guard: guard,
         _file:  file,
      })
   }

   /// Removes the whole cache.
   pub async fn prune(&self) -> Result<()> {
      match tokio::fs::remove_dir_all(&self.root).await {
         Ok(()) => {
            tracing::info!("Pruned cache at '{root}'.", root = self.root.display());
            Ok(())
         },

         Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
         Err(error) => Err(error.into()),
      }
   }
}

#[cfg(test)]
pub(crate) mod tests {
   use std::{
      sync::atomic::{
         AtomicUsize,
         Ordering,
      },
      time::Duration,
   };

   use super::*;

   /// A fresh directory under the system temporary directory.
   pub(crate) fn scratch(name: &str) -> PathBuf {
      static COUNT: AtomicUsize = AtomicUsize::new(0);

      let path = std::env::temp_dir().join(format!(
         "bass-{name}-{pid}-{count}",
         pid = std::process::id(),
         count = COUNT.fetch_add(1, Ordering::Relaxed),
      ));

      let _ = std::fs::remove_dir_all(&path);
      path
   }

   #[tokio::test]
   async fn responses_mark_thunks_cached() {
      let cache = Cache::new(scratch("cache"));

      assert!(!cache.is_cached("abc").await);
      cache.write_response("abc", b"1\n").await.unwrap();

      assert!(cache.is_cached("abc").await);
      assert_eq!(cache.read_response("abc").await.unwrap(), b"1\n");
      assert!(cache.artifacts("abc").ends_with("artifacts/abc"));

      cache.prune().await.unwrap();
      assert!(!cache.is_cached("abc").await);
      cache.prune().await.unwrap();
   }

   #[tokio::test]
   async fn locks_exclude() {
      let cache = Arc::new(Cache::new(scratch("locks")));

      let lock = cache.lock("abc").await.unwrap();

      let waiting = tokio::spawn({
         let cache = cache.clone();
         async move { cache.lock("abc").await.map(drop) }
      });

      tokio::time::sleep(Duration::from_millis(50)).await;
      assert!(!waiting.is_finished());

      drop(lock);
      waiting.await.unwrap().unwrap();

      cache.prune().await.unwrap();
   }
}
