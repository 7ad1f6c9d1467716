use std::{
   io,
   path::PathBuf,
   sync::Arc,
};

use arcstr::ArcStr;
use tokio::sync::watch;

use super::{
   apply,
   func,
   func_async,
   func_cont,
   try_cont,
};
use crate::{
   Context,
   Cont,
   Error,
   Result,
   Scope,
   Thunk,
   Value,
   protocol,
   runtime::tar,
   thunk::{
      ImageRef,
      MountSource,
      Response,
      ThunkCmd,
      ThunkDir,
      ThunkImage,
   },
   value::{
      Builtin,
      DirPath,
      FileOrDirPath,
      FilePath,
      Source,
      ThunkPath,
      json,
   },
};

fn thunk(value: &Value) -> Result<Thunk> {
   value.decode::<Arc<Thunk>>().map(Arc::unwrap_or_clone)
}

fn with(thunk: Thunk) -> Result<Value> {
   thunk.check()?;
   Ok(Value::from(Arc::new(thunk)))
}

/// A name given as a string, keyword or symbol.
fn name(value: &Value) -> Result<ArcStr> {
   match *value.bare() {
      Value::String(ref name) | Value::Keyword(ref name) | Value::Symbol(ref name) => Ok(name.clone()),

      ref other => {
         Err(Error::Decode {
            value: other.to_string(),
            have:  other.type_name(),
            need:  "name",
         })
      },
   }
}

fn image(value: &Value) -> Result<ThunkImage> {
   match *value.bare() {
      Value::Thunk(ref thunk) => Ok(ThunkImage::Thunk(thunk.clone())),

      Value::Scope(_) => {
         json::decode_via_json::<ImageRef>(value)
            .map(ThunkImage::Ref)
            .ok_or_else(|| {
               Error::Decode {
                  value: value.to_string(),
                  have:  "scope",
                  need:  "image",
               }
            })
      },

      ref other => {
         Err(Error::Decode {
            value: other.to_string(),
            have:  other.type_name(),
            need:  "image",
         })
      },
   }
}

fn flag(scope: &Scope, name: &str) -> Result<bool> {
   scope.get(name).map_or(Ok(false), |value| value.decode::<bool>())
}

/// Decodes `{:stdout true}`, `{:file ./out}` or `{:exit true}`, each with
/// an optional `:protocol`.
fn response(value: &Value) -> Result<Response> {
   let scope = value.decode::<Scope>()?;

   let protocol = scope
      .get("protocol")
      .map(|protocol| name(&protocol))
      .transpose()?
      .unwrap_or_else(|| arcstr::literal!("json"));

   let file = scope
      .get("file")
      .map(|file| file.decode::<FilePath>())
      .transpose()?;

   let response = Response {
      stdout: flag(&scope, "stdout")?,
      file,
      exit: flag(&scope, "exit")?,
      protocol,
   };

   if !response.stdout && response.file.is_none() && !response.exit {
      return Err(Error::message(format!(
         "response {value} has none of :stdout, :file or :exit"
      )));
   }

   Ok(response)
}

fn image_value(image: &ImageRef) -> Result<Value> {
   Ok(json::from_json(&serde_json::to_value(image)?))
}

/// A directory on the host, relative to the current directory.
fn host_dir(path: &Value) -> Option<PathBuf> {
   match *path.bare() {
      Value::HostPath(ref host) if host.path.is_dir() => Some(host.to_path_buf()),
      Value::DirPath(ref dir) => Some(PathBuf::from(&*dir.path)),
      _ => None,
   }
}

/// Runs the thunk behind a thunk path and returns the file it points to.
async fn read_thunk_file(ctx: &Context, path: &ThunkPath) -> Result<Vec<u8>> {
   let mut archive = Vec::new();
   ctx.pool.export_path(ctx, &mut archive, path).await?;

   tar(&std::env::temp_dir(), &["-x", "-O", "-f", "-"], &archive).await
}

async fn read(ctx: &Context, readable: &Value, protocol: &str) -> Result<Source> {
   let bytes = match *readable.bare() {
      Value::Thunk(ref thunk) if &*thunk.response().protocol == protocol => {
         return ctx.pool.read(ctx, thunk).await;
      },

      Value::Thunk(ref thunk) => {
         let response = Response {
            protocol: protocol.into(),
            ..thunk.response()
         };

         let thunk = Arc::unwrap_or_clone(thunk.clone()).with_response(response);
         return ctx.pool.read(ctx, &thunk).await;
      },

      Value::ThunkPath(ref path) if !path.path.is_dir() => read_thunk_file(ctx, path).await?,
      Value::FsPath(ref fs) if !fs.path.is_dir() => fs.read()?.as_bytes().to_vec(),
      Value::HostPath(ref host) if !host.path.is_dir() => tokio::fs::read(host.to_path_buf()).await?,
      Value::FilePath(ref file) => tokio::fs::read(&*file.path).await?,

      ref other => {
         return Err(Error::Decode {
            value: other.to_string(),
            have:  other.type_name(),
            need:  "thunk or file path",
         });
      },
   };

   protocol::decode(protocol, &bytes, ctx.stderr.clone())
}

async fn export(ctx: &Context, path: &Value, dest: &Value) -> Result<()> {
   let path = match *path.bare() {
      Value::Thunk(ref thunk) => {
         ThunkPath {
            thunk: thunk.clone(),
            path:  FileOrDirPath::Dir(DirPath::new(".")),
         }
      },

      _ => path.decode::<ThunkPath>()?,
   };

   let Some(dest) = host_dir(dest) else {
      return Err(Error::Decode {
         value: dest.to_string(),
         have:  dest.type_name(),
         need:  "host dir path",
      });
   };

   let mut archive = Vec::new();
   ctx.pool.export_path(ctx, &mut archive, &path).await?;

   tokio::fs::create_dir_all(&dest).await?;
   tar(&dest, &["-x", "-f", "-"], &archive).await?;

   tracing::info!("Exported {path} to '{dest}'.", dest = dest.display());
   Ok(())
}

/// Starts running the thunk in a worker. The handler is called with null once
/// the thunk succeeds, or with the error message if it fails.
fn start(ctx: &Context, thunk: Arc<Thunk>, handler: Value) -> Value {
   let (sender, receiver) = watch::channel(None::<Result<Value>>);
   let worker = ctx.fork();

   ctx.spawn(async move {
      let result = match worker.pool.run(&worker, &mut io::sink(), &thunk).await {
         Ok(()) => Ok(Value::Null),
         Err(error) if error.is_interrupted() => Err(error),
         Err(error) => Ok(Value::string(error.to_string())),
      };

      let result = match result {
         Ok(outcome) => {
            crate::trampoline(&worker, apply(&worker, &handler, vec![outcome], Cont::identity())).await
         },
         Err(error) => Err(error),
      };

      if let Err(ref error) = result {
         tracing::debug!("Handler of {thunk} failed: {error}");
      }

      sender.send_replace(Some(result));
   });

   let wait = Builtin::new("wait", move |_, _, _, cont| {
      let mut receiver = receiver.clone();

      cont.suspend(async move {
         let done = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::message("worker stopped without a result"))?;

         done
            .clone()
            .unwrap_or_else(|| Err(Error::message("worker stopped without a result")))
      })
   });

   Value::wrap(Value::Builtin(Arc::new(wait)))
}

pub(super) fn register(scope: &Scope) {
   func(
      scope,
      "with-image",
      "returns the thunk with its image set\n\nThe image is either a thunk or an image ref scope. When the image of the thunk is a thunk itself, the innermost image is set.",
      |args| {
         let [target, base] = args.exact::<2>()?;
         with(thunk(&target)?.with_image(image(&base)?))
      },
   );

   func(
      scope,
      "with-dir",
      "returns the thunk with its working directory set",
      |args| {
         let [target, dir] = args.exact::<2>()?;
         with(thunk(&target)?.with_dir(ThunkDir::try_from(&dir)?))
      },
   );

   func(scope, "with-args", "returns the thunk with its arguments set", |args| {
      let [target, arguments] = args.exact::<2>()?;
      with(thunk(&target)?.with_args(arguments.to_vec()?))
   });

   func(
      scope,
      "with-stdin",
      "returns the thunk with the values written to its standard input set",
      |args| {
         let [target, stdin] = args.exact::<2>()?;
         with(thunk(&target)?.with_stdin(stdin.to_vec()?))
      },
   );

   func(
      scope,
      "with-env",
      "returns the thunk with its environment set",
      |args| {
         let [target, env] = args.exact::<2>()?;
         with(thunk(&target)?.with_env(env.decode::<Scope>()?))
      },
   );

   func(
      scope,
      "with-insecure",
      "returns the thunk with its insecure flag set\n\nInsecure thunks run with elevated privileges.",
      |args| {
         let [target, insecure] = args.exact::<2>()?;
         with(thunk(&target)?.with_insecure(insecure.decode::<bool>()?))
      },
   );

   func(
      scope,
      "with-response",
      "returns the thunk with where its response is read from set\n\nThe response is a scope with one of :stdout, :file or :exit and an optional :protocol.",
      |args| {
         let [target, scope] = args.exact::<2>()?;
         with(thunk(&target)?.with_response(response(&scope)?))
      },
   );

   func(
      scope,
      "wrap-cmd",
      "runs the command of the thunk through another command\n\nThe old command and the extra arguments come before the old arguments.",
      |args| {
         let ([target, cmd], prepend) = args.at_least::<2>()?;
         with(thunk(&target)?.wrap_cmd(ThunkCmd::try_from(&cmd)?, prepend))
      },
   );

   func(
      scope,
      "with-label",
      "returns the thunk with a label set\n\nLabels only change the hash, so thunks differing in labels run separately.",
      |args| {
         let [target, label, value] = args.exact::<3>()?;
         with(thunk(&target)?.with_label(&name(&label)?, value))
      },
   );

   func(
      scope,
      "with-mount",
      "returns the thunk with a source mounted at the target path",
      |args| {
         let [target, source, path] = args.exact::<3>()?;

         let path = path.decode::<FileOrDirPath>()?;
         with(thunk(&target)?.with_mount(MountSource::try_from(&source)?, path))
      },
   );

   func(scope, "thunk-cmd", "returns the command of the thunk", |args| {
      let [target] = args.exact::<1>()?;
      Ok(Value::from(thunk(&target)?.cmd))
   });

   func_async(
      scope,
      "load",
      "runs the thunk as a module and returns its scope",
      |ctx, args| {
         async move {
            let [target] = args.exact::<1>()?;
            let module = ctx.pool.load(&ctx, &thunk(&target)?).await?;

            Ok(Value::Scope(module))
         }
      },
   );

   func_async(
      scope,
      "resolve",
      "returns the image ref with its digest filled in",
      |ctx, args| {
         async move {
            let [reference] = args.exact::<1>()?;

            let Some(reference) = json::decode_via_json::<ImageRef>(&reference) else {
               return Err(Error::Decode {
                  value: reference.to_string(),
                  have:  reference.type_name(),
                  need:  "image ref",
               });
            };

            image_value(&ctx.pool.resolve(&ctx, &reference).await?)
         }
      },
   );

   func_async(
      scope,
      "run",
      "runs the thunk, failing if its command fails\n\nReturns null.",
      |ctx, args| {
         async move {
            let [target] = args.exact::<1>()?;
            ctx.pool.run(&ctx, &mut io::sink(), &thunk(&target)?).await?;

            Ok(Value::Null)
         }
      },
   );

   func_async(
      scope,
      "succeeds?",
      "returns whether the command of the thunk exits with zero",
      |ctx, args| {
         async move {
            let [target] = args.exact::<1>()?;

            match ctx.pool.run(&ctx, &mut io::sink(), &thunk(&target)?).await {
               Ok(()) => Ok(Value::Bool(true)),
               Err(error) if matches!(error.root(), Error::Failed { .. }) => Ok(Value::Bool(false)),
               Err(error) => Err(error),
            }
         }
      },
   );

   func_async(
      scope,
      "read",
      "returns a source of the values in the response of a thunk or in a file\n\nThe protocol defaults to :json.",
      |ctx, args| {
         async move {
            let ([readable], protocol) = args.optional::<1>()?;

            let protocol = match protocol {
               Some(ref protocol) => name(protocol)?,
               None => arcstr::literal!("json"),
            };

            read(&ctx, &readable, &protocol).await.map(Value::Source)
         }
      },
   );

   func_async(
      scope,
      "export",
      "writes the output of a thunk, or the path into it, to a directory on the host",
      |ctx, args| {
         async move {
            let [path, dest] = args.exact::<2>()?;
            export(&ctx, &path, &dest).await?;

            Ok(Value::Null)
         }
      },
   );

   func_cont(
      scope,
      "start",
      "runs the thunk in the background and returns a function that waits for it\n\nThe handler is called with null when the thunk succeeds and with the error otherwise. Waiting returns what the handler returned.",
      |ctx, args, cont| {
         let [target, handler] = try_cont!(cont, args.exact::<2>());
         let target = try_cont!(cont, target.decode::<Arc<Thunk>>());

         cont.call(Ok(start(ctx, target, handler)))
      },
   );

   func_async(
      scope,
      "wait",
      "waits for every thunk started in the background",
      |ctx, args| {
         async move {
            args.exact::<0>()?;
            ctx.wait().await;

            Ok(Value::Null)
         }
      },
   );
}

#[cfg(test)]
mod tests {
   use super::{
      super::{
         RunState,
         ground,
         run_scope,
         tests::run_ok,
      },
      *,
   };
   use crate::{
      runtime::{
         Pool,
         fake::FakeRuntime,
      },
      thunk::Platform,
      value::CommandPath,
   };

   async fn run_faked(source: &str) -> (Result<Value>, Arc<FakeRuntime>) {
      let fake = Arc::new(FakeRuntime::default());
      let pool = Pool::default().with_runtime(Platform::new("linux", ""), fake.clone());
      let ctx = Context::builder().pool(Arc::new(pool)).build();

      let ground = ground().await.unwrap();
      let scope = run_scope(&ground, RunState::default());

      let result = crate::eval_source(&ctx, &scope, "test.bass", source).await;
      ctx.wait().await;

      (result, fake)
   }

   const ECHO: &str = r#"(def echo (from {:platform {:os "linux"} :repository "alpine"} (with-args (.echo) ["\"hi\""])))"#;

   #[tokio::test]
   async fn builders() {
      assert_eq!(run_ok("(thunk? (.echo))").await, Value::Bool(true));

      let Value::Thunk(built) = run_ok(
         r#"(with-label (with-insecure (with-env (with-stdin (with-args (.ls) ["-la"]) [1]) {:a "b"}) true) :at 1)"#,
      )
      .await
      else {
         panic!("expected a thunk");
      };

      assert_eq!(built.cmd, ThunkCmd::Command(CommandPath { name: "ls".into() }));
      assert_eq!(built.args, [Value::string("-la")]);
      assert_eq!(built.stdin, [Value::Int(1)]);
      assert!(built.insecure);
      assert!(built.env.as_ref().is_some_and(|env| env.get("a") == Some(Value::string("b"))));
      assert!(built.labels.as_ref().is_some_and(|labels| labels.get("at") == Some(Value::Int(1))));

      assert_eq!(
         run_ok("(thunk-cmd (wrap-cmd (.ls) .strace \"-f\"))").await,
         Value::CommandPath(CommandPath { name: "strace".into() })
      );
   }

   #[tokio::test]
   async fn responses() {
      let Value::Thunk(built) = run_ok("(with-response (.ls) {:exit true})").await else {
         panic!("expected a thunk");
      };
      assert_eq!(built.response(), Response::exit());

      let Value::Thunk(built) = run_ok("(with-response (.ls) {:file ./out :protocol :unix-table})").await else {
         panic!("expected a thunk");
      };
      assert_eq!(built.response(), Response::file(FilePath::new("./out"), "unix-table"));

      let (result, _) = run_faked("(with-response (.ls) {:protocol :raw})").await;
      assert!(result.is_err());
   }

   #[tokio::test]
   async fn reading_runs_once() {
      let (result, fake) = run_faked(&format!(
         "{ECHO} [(next (read echo :json)) (next (read echo :json))]"
      ))
      .await;

      assert_eq!(result.unwrap(), Value::list([Value::string("hi"), Value::string("hi")]));
      assert_eq!(fake.runs().len(), 1);

      let (result, _) = run_faked(&format!("{ECHO} (next (read echo :raw))")).await;
      assert_eq!(result.unwrap(), Value::string("\"hi\"\n"));
   }

   #[tokio::test]
   async fn running() {
      let (result, fake) = run_faked(&format!("{ECHO} [(run echo) (succeeds? echo)]")).await;

      assert_eq!(result.unwrap(), Value::list([Value::Null, Value::Bool(true)]));
      assert_eq!(fake.runs().len(), 1);

      // Without an image, commands are modules of the standard library.
      let (result, _) = run_faked("(run (.echo))").await;
      assert!(result.unwrap_err().to_string().contains("echo.bass"));
   }

   #[tokio::test]
   async fn resolving() {
      let (result, _) =
         run_faked(r#"(resolve {:platform {:os "linux"} :repository "alpine" :tag "3"})"#).await;

      let Value::Scope(resolved) = result.unwrap() else {
         panic!("expected a scope");
      };

      assert_eq!(resolved.get("repository"), Some(Value::string("alpine")));
      assert!(matches!(resolved.get("digest"), Some(Value::String(ref digest)) if digest.starts_with("sha256:")));
   }

   #[tokio::test]
   async fn starting() {
      let (result, fake) = run_faked(&format!(
         "{ECHO} (def done (start echo (fn (error) (if (null? error) :ok :failed)))) (done)"
      ))
      .await;

      assert_eq!(result.unwrap(), Value::keyword("ok"));
      assert_eq!(fake.runs().len(), 1);

      let (result, fake) = run_faked(&format!("{ECHO} (start echo (fn (_) null)) (wait)")).await;

      assert_eq!(result.unwrap(), Value::Null);
      assert_eq!(fake.runs().len(), 1);
   }
}
