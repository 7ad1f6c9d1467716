//! Runs thunks whose command is Bass code, in this process.

use std::{
   io,
   sync::Arc,
};

use async_once_cell::OnceCell;
use async_trait::async_trait;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use super::{
   Runtime,
   tar,
};
use crate::{
   Context,
   Error,
   Result,
   Scope,
   Thunk,
   Value,
   ground::{
      self,
      RunState,
   },
   std_fs,
   thunk::{
      ImageRef,
      ThunkCmd,
   },
   value::{
      DirPath,
      FileOrDirPath,
      FilePath,
      FsPath,
      HostPath,
      Sink,
      Source,
      ThunkPath,
      json,
      stream::BufferSink,
   },
};

/// The file extension of Bass source, added to module paths on load.
pub const EXTENSION: &str = ".bass";

struct Module {
   scope:    Scope,
   response: Vec<u8>,
}

/// The directory containing a file path, as a directory path.
fn parent(file: &FilePath) -> DirPath {
   match file.path.rsplit_once('/') {
      Some((dir, _)) if !dir.is_empty() => DirPath::new(dir),
      _ => DirPath::new("."),
   }
}

fn with_extension(path: &str, load: bool) -> String {
   if load && !path.ends_with(EXTENSION) {
      format!("{path}{EXTENSION}")
   } else {
      path.to_owned()
   }
}

fn file_of(path: &FileOrDirPath) -> Result<&FilePath> {
   match *path {
      FileOrDirPath::File(ref file) => Ok(file),
      FileOrDirPath::Dir(ref dir) => {
         Err(Error::Decode {
            value: dir.to_string(),
            have:  "dir path",
            need:  "file path",
         })
      },
   }
}

/// Modules are evaluated once per thunk hash. Running calls `main` with the
/// arguments of the thunk, loading does not.
#[derive(Default)]
pub struct BassRuntime {
   modules: DashMap<(String, bool), Arc<OnceCell<Module>>, FxBuildHasher>,
}

impl BassRuntime {
   async fn module(&self, ctx: &Context, thunk: &Thunk, load: bool) -> Result<Arc<OnceCell<Module>>> {
      let key = (thunk.hash()?, load);
      let cell = self.modules.entry(key).or_default().clone();

      cell
         .get_or_try_init(Self::evaluate(ctx, thunk, load))
         .await?;

      Ok(cell)
   }

   /// Reads the source of the module along with the directory it is in.
   async fn source(ctx: &Context, thunk: &Thunk, load: bool) -> Result<(String, Value)> {
      match thunk.cmd {
         ThunkCmd::Command(ref command) => {
            let name = with_extension(&command.name, true);

            let source = std_fs::read(std_fs::STD, &name).ok_or_else(|| {
               Error::message(format!("no module named {name} in the standard library"))
            })?;

            let dir = FsPath {
               fs:   std_fs::STD.into(),
               path: FileOrDirPath::Dir(DirPath::new(".")),
            };

            Ok((source.to_owned(), Value::FsPath(dir)))
         },

         ThunkCmd::Host(ref host) => {
            let file = file_of(&host.path)?;
            let file = FilePath::new(with_extension(&file.path, load));

            let path = HostPath {
               context: host.context.clone(),
               path:    FileOrDirPath::File(file.clone()),
            };

            let source = tokio::fs::read_to_string(path.to_path_buf())
               .await
               .map_err(|error| Error::message(format!("cannot read {path}: {error}")))?;

            let dir = HostPath {
               context: host.context.clone(),
               path:    FileOrDirPath::Dir(parent(&file)),
            };

            Ok((source, Value::HostPath(dir)))
         },

         ThunkCmd::Fs(ref fs) => {
            let file = file_of(&fs.path)?;
            let file = FilePath::new(with_extension(&file.path, load));

            let path = FsPath {
               fs:   fs.fs.clone(),
               path: FileOrDirPath::File(file.clone()),
            };

            let dir = FsPath {
               fs:   fs.fs.clone(),
               path: FileOrDirPath::Dir(parent(&file)),
            };

            Ok((path.read()?.to_owned(), Value::FsPath(dir)))
         },

         ThunkCmd::Thunk(ref path) => {
            let file = file_of(&path.path)?;
            let file = FilePath::new(with_extension(&file.path, load));

            let module = ThunkPath {
               thunk: path.thunk.clone(),
               path:  FileOrDirPath::File(file.clone()),
            };

            let mut archive = Vec::new();
            ctx.pool.export_path(ctx, &mut archive, &module).await?;

            let content = tar(&std::env::temp_dir(), &["-x", "-O", "-f", "-"], &archive).await?;
            let source = String::from_utf8(content)
               .map_err(|_| Error::message(format!("{module} is not valid UTF-8")))?;

            let dir = ThunkPath {
               thunk: path.thunk.clone(),
               path:  FileOrDirPath::Dir(parent(&file)),
            };

            Ok((source, Value::ThunkPath(dir)))
         },

         ThunkCmd::File(ref file) => {
            Err(Error::message(format!(
               "cannot run {file} in process, did you mean *dir*/{name}?",
               name = file.path.trim_start_matches("./"),
            )))
         },
      }
   }

   #[tracing::instrument(level = "debug", skip_all, fields(thunk = %thunk, load))]
   async fn evaluate(ctx: &Context, thunk: &Thunk, load: bool) -> Result<Module> {
      let (source, dir) = Self::source(ctx, thunk, load).await?;

      let stdout = BufferSink::default();
      let ground = ground::ground().await?;

      let scope = ground::run_scope(
         &ground,
         RunState::builder()
            .args(thunk.args.clone())
            .maybe_env(thunk.env.clone())
            .dir(dir)
            .stdin(Source::from_values("stdin", thunk.stdin.clone()))
            .stdout(Sink::new(thunk.to_string(), stdout.clone()))
            .build(),
      );

      crate::eval_source(ctx, &scope, &thunk.cmd.to_string(), &source).await?;

      if !load {
         ground::run_main(ctx, &scope, thunk.args.clone()).await?;
      }

      let mut response = Vec::new();
      for value in stdout.values().await {
         response.extend_from_slice(json::to_string(&value)?.as_bytes());
         response.push(b'\n');
      }

      Ok(Module { scope, response })
   }
}

#[async_trait]
impl Runtime for BassRuntime {
   async fn run(&self, ctx: &Context, out: &mut (dyn io::Write + Send), thunk: &Thunk) -> Result<()> {
      let cell = self.module(ctx, thunk, false).await?;

      if let Some(module) = cell.get() {
         out.write_all(&module.response)?;
      }

      Ok(())
   }

   async fn load(&self, ctx: &Context, thunk: &Thunk) -> Result<Scope> {
      let cell = self.module(ctx, thunk, true).await?;

      cell
         .get()
         .map(|module| module.scope.clone())
         .ok_or_else(|| Error::message(format!("{thunk} failed to load")))
   }

   async fn export_path(&self, _: &Context, _: &mut (dyn io::Write + Send), path: &ThunkPath) -> Result<()> {
      Err(Error::message(format!("cannot export {path}, it runs in process")))
   }

   async fn resolve(&self, _: &Context, image: &ImageRef) -> Result<ImageRef> {
      Err(Error::message(format!("cannot resolve {image} without a registry")))
   }

   async fn prune(&self, _: &Context) -> Result<()> {
      self.modules.clear();
      Ok(())
   }
}
