//! Drivers that run thunks, and the pool that picks one per thunk.

use std::{
   io,
   path::Path,
   process::Stdio,
   sync::Arc,
};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;

use crate::{
   Context,
   Error,
   Result,
   Scope,
   Thunk,
   config::Config,
   thunk::{
      ImageRef,
      Platform,
   },
   value::{
      Source,
      ThunkPath,
   },
};

mod bass;
pub use bass::BassRuntime;

mod cache;
pub use cache::Cache;

mod local;
pub use local::{
   LocalConfig,
   LocalRuntime,
};

#[cfg(test)]
pub(crate) mod fake;

/// Something that runs thunks.
#[async_trait]
pub trait Runtime: Send + Sync + 'static {
   /// Runs the thunk to completion, writing its response as a JSON stream.
   async fn run(&self, ctx: &Context, out: &mut (dyn io::Write + Send), thunk: &Thunk) -> Result<()>;

   /// Runs a thunk whose response is a set of bindings, and returns them.
   async fn load(&self, ctx: &Context, thunk: &Thunk) -> Result<Scope> {
      let mut response = Vec::new();
      self.run(ctx, &mut response, thunk).await?;

      let source = Source::from_reader(thunk.to_string(), io::Cursor::new(response));
      match source.next().await? {
         Some(value) => value.decode::<Scope>(),
         None => Err(Error::message(format!("{thunk} responded with nothing to load"))),
      }
   }

   /// Writes a tar stream of the file or directory a thunk path points to.
   async fn export_path(
      &self,
      ctx: &Context,
      out: &mut (dyn io::Write + Send),
      path: &ThunkPath,
   ) -> Result<()>;

   /// Fills in the digest of an image reference.
   async fn resolve(&self, ctx: &Context, image: &ImageRef) -> Result<ImageRef>;

   /// Removes everything the runtime has cached.
   async fn prune(&self, ctx: &Context) -> Result<()> {
      let _ = ctx;
      Ok(())
   }
}

/// Runs the host `tar` in a directory, feeding it `input` and returning its
/// output.
pub(crate) async fn tar(dir: &Path, args: &[&str], input: &[u8]) -> Result<Vec<u8>> {
   let mut child = tokio::process::Command::new("tar")
      .args(args)
      .current_dir(dir)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()?;

   let mut stdin = child
      .stdin
      .take()
      .ok_or_else(|| Error::message("tar has no stdin"))?;

   let feed = async move {
      stdin.write_all(input).await?;
      stdin.shutdown().await
   };

   let ((), output) = tokio::try_join!(feed, child.wait_with_output())?;

   if !output.status.success() {
      return Err(Error::message(format!(
         "tar {args} failed: {stderr}",
         args = args.join(" "),
         stderr = String::from_utf8_lossy(&output.stderr).trim(),
      )));
   }

   Ok(output.stdout)
}

/// Every configured runtime along with the platform it runs. Thunks without
/// a platform run in process.
#[derive(Default)]
pub struct Pool {
   bass:     BassRuntime,
   runtimes: Vec<(Platform, Arc<dyn Runtime>)>,
}

impl Pool {
   /// Initializes every runtime in the config.
   pub fn from_config(config: &Config) -> Result<Self> {
      let mut pool = Self::default();

      for runtime in &config.runtimes {
         let driver: Arc<dyn Runtime> = match &*runtime.driver {
            "local" => {
               let local = serde_json::from_value::<Option<LocalConfig>>(runtime.config.clone())
                  .map_err(|error| {
                     Error::message(format!(
                        "invalid config for runtime {platform}: {error}",
                        platform = runtime.platform,
                     ))
                  })?
                  .unwrap_or_default();

               Arc::new(LocalRuntime::new(local.cache_dir.unwrap_or_else(|| config.cache_dir.clone())))
            },

            driver => {
               return Err(Error::message(format!(
                  "unknown driver for runtime {platform}: {driver}",
                  platform = runtime.platform,
               )));
            },
         };

         tracing::debug!(
            "Registered {driver} runtime for {platform}.",
            driver = runtime.driver,
            platform = runtime.platform,
         );

         pool = pool.with_runtime(runtime.platform.clone(), driver);
      }

      Ok(pool)
   }

   #[must_use]
   pub fn with_runtime(mut self, platform: Platform, runtime: Arc<dyn Runtime>) -> Self {
      self.runtimes.push((platform, runtime));
      self
   }

   /// The runtime for a platform, the in process one for none.
   pub fn select(&self, platform: Option<&Platform>) -> Result<&dyn Runtime> {
      let Some(platform) = platform else {
         return Ok(&self.bass);
      };

      self
         .runtimes
         .iter()
         .find(|&&(ref registered, _)| registered.can_select(platform))
         .map(|&(_, ref runtime)| &**runtime)
         .ok_or_else(|| {
            Error::NoRuntime {
               os:   platform.os.clone(),
               arch: platform.arch.clone(),
            }
         })
   }

   #[tracing::instrument(level = "debug", skip_all, fields(thunk = %thunk))]
   pub async fn run(&self, ctx: &Context, out: &mut (dyn io::Write + Send), thunk: &Thunk) -> Result<()> {
      self.select(thunk.platform())?.run(ctx, out, thunk).await
   }

   /// Runs the thunk and reads its response.
   pub async fn read(&self, ctx: &Context, thunk: &Thunk) -> Result<Source> {
      let mut response = Vec::new();
      self.run(ctx, &mut response, thunk).await?;

      Ok(Source::from_reader(thunk.to_string(), io::Cursor::new(response)))
   }

   #[tracing::instrument(level = "debug", skip_all, fields(thunk = %thunk))]
   pub async fn load(&self, ctx: &Context, thunk: &Thunk) -> Result<Scope> {
      self.select(thunk.platform())?.load(ctx, thunk).await
   }

   #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
   pub async fn export_path(
      &self,
      ctx: &Context,
      out: &mut (dyn io::Write + Send),
      path: &ThunkPath,
   ) -> Result<()> {
      self
         .select(path.thunk.platform())?
         .export_path(ctx, out, path)
         .await
   }

   pub async fn resolve(&self, ctx: &Context, image: &ImageRef) -> Result<ImageRef> {
      self.select(Some(&image.platform))?.resolve(ctx, image).await
   }

   /// Prunes every runtime.
   pub async fn prune(&self, ctx: &Context) -> Result<()> {
      self.bass.prune(ctx).await?;

      for &(ref platform, ref runtime) in &self.runtimes {
         tracing::info!("Pruning runtime for {platform}.");
         runtime.prune(ctx).await?;
      }

      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::config::RuntimeConfig;

   #[test]
   fn selection() {
      let pool = Pool::default().with_runtime(
         Platform::new("linux", ""),
         Arc::new(fake::FakeRuntime::default()),
      );

      assert!(pool.select(None).is_ok());
      assert!(pool.select(Some(&Platform::new("linux", "amd64"))).is_ok());
      assert!(matches!(
         pool.select(Some(&Platform::new("windows", ""))),
         Err(Error::NoRuntime { ref os, .. }) if os == "windows"
      ));
   }

   #[test]
   fn unknown_drivers() {
      let config = Config {
         runtimes: vec![RuntimeConfig {
            platform: Platform::new("linux", ""),
            driver:   "buildkit".into(),
            config:   serde_json::Value::Null,
         }],
         ..Config::default()
      };

      let Err(error) = Pool::from_config(&config) else {
         panic!("expected an unknown driver");
      };
      assert!(error.to_string().contains("buildkit"));
      assert!(Pool::from_config(&Config::default()).is_ok());
   }
}
