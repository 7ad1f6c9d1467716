//! Runs thunks as processes on the host.
//!
//! Every thunk gets its own working directory under the cache, which starts
//! out with its image, if the image is a thunk, and its mounts. What the
//! process leaves behind there is what paths into the thunk refer to.

use std::{
   ffi::OsString,
   io::{
      self,
      Write as _,
   },
   os::unix::process::ExitStatusExt as _,
   path::{
      Path,
      PathBuf,
   },
   process::Stdio,
   sync::PoisonError,
};

use async_trait::async_trait;
use tokio::io::{
   AsyncBufReadExt as _,
   AsyncReadExt as _,
   AsyncWriteExt as _,
   BufReader,
};

use super::{
   Cache,
   Runtime,
   tar,
};
use crate::{
   Context,
   Error,
   Result,
   Thunk,
   command::{
      Command,
      CommandMount,
   },
   protocol,
   std_fs,
   thunk::{
      ImageRef,
      MountSource,
      ThunkImage,
   },
   value::{
      DirPath,
      FileOrDirPath,
      ThunkPath,
   },
};

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LocalConfig {
   /// Overrides the cache directory of the config.
   #[serde(default)]
   pub cache_dir: Option<PathBuf>,
}

/// A path below a working directory, without a leading `./`.
fn below(root: &Path, path: &str) -> PathBuf {
   let relative = path.trim_start_matches("./").trim_end_matches('/');

   if relative.is_empty() || relative == "." {
      root.to_path_buf()
   } else {
      root.join(relative)
   }
}

/// The executable for the first argument of a command. Paths are relative
/// to the working directory, names are looked up in `$PATH`.
fn program(name: &str, dir: &Path) -> Result<PathBuf> {
   if name.contains('/') {
      return Ok(dir.join(name));
   }

   which::which(name).map_err(|error| Error::message(format!("cannot find command {name}: {error}")))
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
   status
      .code()
      .or_else(|| status.signal().map(|signal| 128 + signal))
      .unwrap_or(1)
}

pub struct LocalRuntime {
   cache: Cache,
}

impl LocalRuntime {
   #[must_use]
   pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
      Self {
         cache: Cache::new(cache_dir),
      }
   }

   #[must_use]
   pub fn cache(&self) -> &Cache {
      &self.cache
   }

   /// Runs the thunk unless it is cached, and returns its hash.
   async fn ensure(&self, ctx: &Context, thunk: &Thunk) -> Result<String> {
      let hash = thunk.hash()?;

      if self.cache.is_cached(&hash).await {
         tracing::debug!("Using cached response of {thunk}.");
         return Ok(hash);
      }

      let _lock = self.cache.lock(&hash).await?;

      // Another run might have finished while we waited.
      if self.cache.is_cached(&hash).await {
         return Ok(hash);
      }

      self.execute(ctx, thunk, &hash).await?;
      Ok(hash)
   }

   #[tracing::instrument(level = "info", skip_all, fields(thunk = %thunk))]
   async fn execute(&self, ctx: &Context, thunk: &Thunk, hash: &str) -> Result<()> {
      let command = Command::resolve(thunk)?;
      let workdir = self.cache.artifacts(hash);

      if tokio::fs::try_exists(&workdir).await? {
         tokio::fs::remove_dir_all(&workdir).await?;
      }
      tokio::fs::create_dir_all(&workdir).await?;

      match thunk.image {
         Some(ThunkImage::Thunk(ref base)) => {
            let root = ThunkPath {
               thunk: base.clone(),
               path:  FileOrDirPath::Dir(DirPath::new(".")),
            };

            let mut archive = Vec::new();
            ctx.pool.export_path(ctx, &mut archive, &root).await?;
            tar(&workdir, &["-x", "-f", "-"], &archive).await?;
         },

         Some(ThunkImage::Ref(ref image)) => {
            tracing::debug!("Running on the host, ignoring image {image}.");
         },

         None => {},
      }

      for mount in &command.mounts {
         self.mount(ctx, &workdir, mount).await?;
      }

      let dir = command
         .dir
         .as_deref()
         .map_or_else(|| workdir.clone(), |dir| below(&workdir, dir));
      tokio::fs::create_dir_all(&dir).await?;

      let argv = command.argv();
      let Some((&name, args)) = argv.split_first() else {
         return Err(Error::message(format!("{thunk} has nothing to run")));
      };

      let mut child = tokio::process::Command::new(program(name, &dir)?)
         .args(args)
         .current_dir(&dir)
         .env_clear()
         .envs(std::env::var_os("PATH").map(|path| (OsString::from("PATH"), path)))
         .envs(command.env_pairs())
         .stdin(Stdio::piped())
         .stdout(Stdio::piped())
         .stderr(Stdio::piped())
         .kill_on_drop(true)
         .spawn()?;

      let (Some(mut stdin), Some(mut stdout), Some(stderr)) =
         (child.stdin.take(), child.stdout.take(), child.stderr.take())
      else {
         return Err(Error::message("child process is missing its standard streams"));
      };

      let response = thunk.response();
      let mut json = Vec::new();
      let mut writer = protocol::writer(&response.protocol, &mut json, ctx.stderr.clone())?;

      let log_path = self.cache.log(hash);
      if let Some(parent) = log_path.parent() {
         tokio::fs::create_dir_all(parent).await?;
      }
      let mut log = tokio::fs::File::create(&log_path).await?;

      let feed = async {
         for value in &command.stdin {
            let mut line = serde_json::to_vec(value)?;
            line.push(b'\n');
            stdin.write_all(&line).await?;
         }

         stdin.shutdown().await?;
         drop(stdin);
         Ok::<_, Error>(())
      };

      let relay_stdout = async {
         let mut chunk = vec![0; 8192];

         loop {
            let read = stdout.read(&mut chunk).await?;
            if read == 0 {
               return Ok::<_, Error>(());
            }

            if response.stdout {
               writer.write_all(&chunk[..read])?;
            } else {
               ctx.stderr
                  .lock()
                  .unwrap_or_else(PoisonError::into_inner)
                  .write_all(&chunk[..read])?;
            }
         }
      };

      let relay_stderr = async {
         let mut lines = BufReader::new(stderr).lines();

         while let Some(line) = lines.next_line().await? {
            log.write_all(line.as_bytes()).await?;
            log.write_all(b"\n").await?;
            ctx.log(&line);
         }

         log.flush().await?;
         Ok::<_, Error>(())
      };

      let finished = async {
         let ((), (), (), status) = tokio::try_join!(feed, relay_stdout, relay_stderr, async {
            Ok(child.wait().await?)
         })?;

         Ok::<_, Error>(status)
      };

      let status = tokio::select! {
         status = finished => status?,

         () = ctx.cancel.cancelled() => {
            tracing::warn!("Interrupted {thunk}, killing it.");
            return Err(Error::Interrupted);
         },
      };

      let code = exit_code(status);

      if response.exit {
         writeln!(writer, "{code}")?;
      } else if code != 0 {
         tracing::debug!(
            "{thunk} failed, logs are in '{path}'.",
            path = log_path.display(),
         );

         return Err(Error::Failed {
            thunk: thunk.to_string(),
            code,
         });
      }

      if let Some(ref file) = response.file {
         let content = tokio::fs::read(below(&dir, &file.path)).await?;
         writer.write_all(&content)?;
      }

      writer.finish()?;
      drop(writer);

      self.cache.write_response(hash, &json).await
   }

   async fn mount(&self, ctx: &Context, workdir: &Path, mount: &CommandMount) -> Result<()> {
      let target = below(workdir, &mount.target);
      if let Some(parent) = target.parent() {
         tokio::fs::create_dir_all(parent).await?;
      }

      tracing::debug!("Mounting {source} at {target}.", source = mount.source, target = mount.target);

      match mount.source {
         MountSource::Thunk(ref path) => {
            let mut archive = Vec::new();
            ctx.pool.export_path(ctx, &mut archive, path).await?;

            if path.path.is_dir() {
               tokio::fs::create_dir_all(&target).await?;
               tar(&target, &["-x", "-f", "-"], &archive).await?;
            } else {
               let content = tar(workdir, &["-x", "-O", "-f", "-"], &archive).await?;
               tokio::fs::write(&target, content).await?;
            }
         },

         MountSource::Host(ref host) => {
            let source = std::path::absolute(host.to_path_buf())?;
            tokio::fs::symlink(source, &target).await?;
         },

         MountSource::Fs(ref fs) => {
            if fs.path.is_dir() {
               let prefix = match fs.path.relative().trim_end_matches('/') {
                  "" => String::new(),
                  dir => format!("{dir}/"),
               };

               for name in std_fs::list(&fs.fs) {
                  let Some(rest) = name.strip_prefix(&*prefix) else {
                     continue;
                  };

                  let file = below(&target, rest);
                  if let Some(parent) = file.parent() {
                     tokio::fs::create_dir_all(parent).await?;
                  }

                  tokio::fs::write(file, std_fs::read(&fs.fs, name).unwrap_or_default()).await?;
               }
            } else {
               tokio::fs::write(&target, fs.read()?).await?;
            }
         },

         MountSource::Cache(ref cache) => {
            let shared = self.cache.shared(&cache.cache);
            tokio::fs::create_dir_all(&shared).await?;
            tokio::fs::symlink(shared, &target).await?;
         },

         MountSource::Secret(ref secret) => {
            return Err(Error::message(format!(
               "the local runtime has no secret named {name}",
               name = secret.secret,
            )));
         },
      }

      Ok(())
   }
}

#[async_trait]
impl Runtime for LocalRuntime {
   async fn run(&self, ctx: &Context, out: &mut (dyn io::Write + Send), thunk: &Thunk) -> Result<()> {
      let hash = self.ensure(ctx, thunk).await?;

      out.write_all(&self.cache.read_response(&hash).await?)?;
      Ok(())
   }

   async fn export_path(
      &self,
      ctx: &Context,
      out: &mut (dyn io::Write + Send),
      path: &ThunkPath,
   ) -> Result<()> {
      let hash = self.ensure(ctx, &path.thunk).await?;
      let artifacts = self.cache.artifacts(&hash);

      let archive = match path.path {
         FileOrDirPath::Dir(ref dir) => {
            tar(&below(&artifacts, &dir.path), &["-c", "-f", "-", "."], &[]).await?
         },

         FileOrDirPath::File(ref file) => {
            let file = below(&artifacts, &file.path);

            let (Some(parent), Some(name)) = (file.parent(), file.file_name().and_then(|name| name.to_str()))
            else {
               return Err(Error::message(format!("cannot export {path}")));
            };

            tar(parent, &["-c", "-f", "-", name], &[]).await?
         },
      };

      out.write_all(&archive)?;
      Ok(())
   }

   async fn resolve(&self, _: &Context, image: &ImageRef) -> Result<ImageRef> {
      if image.digest.is_some() {
         return Ok(image.clone());
      }

      Err(Error::message(format!(
         "the local runtime has no registry to resolve {image} with"
      )))
   }

   async fn prune(&self, _: &Context) -> Result<()> {
      self.cache.prune().await
   }
}

#[cfg(test)]
mod tests {
   use std::sync::Arc;

   use super::{
      super::{
         Pool,
         cache::tests::scratch,
      },
      *,
   };
   use crate::{
      Value,
      thunk::{
         Platform,
         Response,
         ThunkCmd,
      },
      value::{
         CommandPath,
         FilePath,
      },
   };

   fn host() -> ThunkImage {
      ThunkImage::Ref(ImageRef {
         platform:   Platform::host(),
         repository: "host".into(),
         tag:        None,
         digest:     None,
      })
   }

   fn shell(script: &str) -> Thunk {
      Thunk::new(ThunkCmd::Command(CommandPath { name: "sh".into() }))
         .with_args(vec![Value::string("-c"), Value::string(script)])
         .with_image(host())
   }

   fn context(name: &str) -> (Context, Arc<LocalRuntime>) {
      let runtime = Arc::new(LocalRuntime::new(scratch(name)));
      let pool = Pool::default().with_runtime(Platform::host(), runtime.clone());

      (Context::builder().pool(Arc::new(pool)).build(), runtime)
   }

   #[tokio::test]
   async fn runs_and_caches() {
      let (ctx, runtime) = context("local-run");

      let echo = Thunk::new(ThunkCmd::Command(CommandPath { name: "echo".into() }))
         .with_args(vec![Value::string("\"hi\"")])
         .with_image(host());

      let values = ctx.pool.read(&ctx, &echo).await.unwrap().collect().await.unwrap();
      assert_eq!(values, [Value::string("hi")]);

      let hash = echo.hash().unwrap();
      assert!(runtime.cache().is_cached(&hash).await);

      let again = ctx.pool.read(&ctx, &echo).await.unwrap().collect().await.unwrap();
      assert_eq!(again, values);

      runtime.prune(&ctx).await.unwrap();
   }

   #[tokio::test]
   async fn responses() {
      let (ctx, runtime) = context("local-responses");

      let failing = shell("exit 3").with_response(Response::exit());
      let values = ctx.pool.read(&ctx, &failing).await.unwrap().collect().await.unwrap();
      assert_eq!(values, [Value::Int(3)]);

      let file = shell("echo 'a b' > out").with_response(Response::file(FilePath::new("./out"), "unix-table"));
      let values = ctx.pool.read(&ctx, &file).await.unwrap().collect().await.unwrap();
      assert_eq!(values, [Value::list([Value::string("a"), Value::string("b")])]);

      let error = ctx.pool.read(&ctx, &shell("exit 2")).await.err().unwrap();
      assert!(matches!(error, Error::Failed { code: 2, .. }));

      runtime.prune(&ctx).await.unwrap();
   }

   #[tokio::test]
   async fn stdin_and_env() {
      let (ctx, runtime) = context("local-stdin");

      let env = crate::Scope::new([]);
      env.set("greeting", Value::string("hello"));

      let thunk = shell("cat; echo \"\\\"$greeting\\\"\"")
         .with_stdin(vec![Value::Int(1), Value::list([Value::Int(2)])])
         .with_env(env);

      let values = ctx.pool.read(&ctx, &thunk).await.unwrap().collect().await.unwrap();
      assert_eq!(values, [
         Value::Int(1),
         Value::list([Value::Int(2)]),
         Value::string("hello"),
      ]);

      runtime.prune(&ctx).await.unwrap();
   }

   #[tokio::test]
   async fn thunk_paths_are_mounted() {
      let (ctx, runtime) = context("local-mounts");

      let producer = Arc::new(shell("mkdir -p out && echo '\"made\"' > out/file"));
      let path = ThunkPath {
         thunk: producer,
         path:  FileOrDirPath::File(FilePath::new("./out/file")),
      };

      let consumer = Thunk::new(ThunkCmd::Command(CommandPath { name: "cat".into() }))
         .with_args(vec![Value::ThunkPath(path)])
         .with_image(host());

      let values = ctx.pool.read(&ctx, &consumer).await.unwrap().collect().await.unwrap();
      assert_eq!(values, [Value::string("made")]);

      runtime.prune(&ctx).await.unwrap();
   }
}
