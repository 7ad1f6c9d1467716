use std::{
   io::{
      self,
      Write as _,
   },
   path::{
      Path,
      PathBuf,
   },
   sync::Arc,
};

use bass_runtime::{
   Context,
   Error,
   Scope,
   Thunk,
   Trace,
   Value,
   config::Config,
   ground::{
      self,
      RunState,
   },
   read,
   runtime::Pool,
   value::{
      DirPath,
      FileOrDirPath,
      FilePath,
      HostPath,
      Sink,
      Source,
      ThunkPath,
   },
};
use bass_syntax::{
   ReadError,
   ReadErrorKind,
};
use clap::Parser as _;
use cyn::ResultExt as _;
use tokio::io::{
   AsyncBufReadExt as _,
   AsyncReadExt as _,
   AsyncWriteExt as _,
   BufReader,
};
use tracing_subscriber::EnvFilter;
use yansi::Paint as _;

const FAIL_STDOUT: &str = "failed to write to stdout";
const FAIL_STDERR: &str = "failed to write to stderr";

#[derive(clap::Parser)]
#[command(version, about)]
struct Cli {
   /// Path to the configuration file.
   #[arg(long, global = true)]
   config: Option<PathBuf>,

   /// Show debug logs.
   #[arg(long, global = true)]
   debug: bool,

   /// Starts the REPL when omitted.
   #[command(subcommand)]
   command: Option<Command>,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Command {
   /// Start an interactive session.
   Repl,

   /// Run a script, calling its main function with the arguments.
   Run {
      /// Inputs to encode as JSON on *stdin*, as name=value. The value may be
      /// a path.
      #[arg(long = "input", short)]
      inputs: Vec<String>,

      /// The script to run.
      script: PathBuf,

      #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
      args: Vec<String>,
   },

   /// Run a thunk read from stdin as JSON and write its response to stdout.
   RunThunk,

   /// Write a thunk path read from stdin as JSON to stdout as a tar stream.
   Export,

   /// Release data and caches retained by runtimes.
   Prune,
}

/// Parses `name=value` inputs into a scope. A bare name is `true` and values
/// that look like paths are host paths.
fn inputs(inputs: &[String]) -> Scope {
   let scope = Scope::new([]);

   for input in inputs {
      let Some((name, arg)) = input.split_once('=') else {
         scope.set(input.as_str(), Value::Bool(true));
         continue;
      };

      let path_like = arg.starts_with('/') || arg.starts_with("./") || arg.starts_with("../");
      if !path_like {
         scope.set(name, Value::string(arg));
         continue;
      }

      let (dir, base) = arg.rsplit_once('/').unwrap_or((".", arg));

      let context = match dir.trim_start_matches("./") {
         "" if arg.starts_with('/') => "/",
         "" | "." => ".",
         dir => dir,
      };

      let path = match base {
         "" | "." => FileOrDirPath::Dir(DirPath::new(".")),
         base => FileOrDirPath::File(FilePath::new(format!("./{base}"))),
      };

      scope.set(name, Value::HostPath(HostPath {
         context: context.into(),
         path,
      }));
   }

   scope
}

fn environment() -> Scope {
   let scope = Scope::new([]);

   for (name, value) in std::env::vars_os() {
      if let (Ok(name), Ok(value)) = (name.into_string(), value.into_string()) {
         scope.set(name, Value::string(value));
      }
   }

   scope
}

/// The directory a script is in, as a host path.
fn dir_of(script: &Path) -> HostPath {
   let context = match script.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().as_ref().into(),
      _ => arcstr::literal!("."),
   };

   HostPath {
      context,
      path: FileOrDirPath::Dir(DirPath::new(".")),
   }
}

fn incomplete(error: &ReadError) -> bool {
   matches!(
      error.kind,
      ReadErrorKind::UnexpectedEnd { .. } | ReadErrorKind::UnterminatedString
   )
}

fn report(ctx: &Context, error: &Error) -> cyn::Result<()> {
   let stderr = &mut io::stderr().lock();

   if !error.is_interrupted() && !ctx.trace.is_empty() {
      ctx.trace.write(stderr).chain_err(FAIL_STDERR)?;
      writeln!(stderr).chain_err(FAIL_STDERR)?;
   }

   writeln!(stderr, "{error}", error = error.red()).chain_err(FAIL_STDERR)?;

   ctx.trace.reset();
   Ok(())
}

async fn read_stdin() -> cyn::Result<Vec<u8>> {
   let mut payload = Vec::new();

   tokio::io::stdin()
      .read_to_end(&mut payload)
      .await
      .chain_err("failed to read stdin")?;

   Ok(payload)
}

async fn write_stdout(bytes: &[u8]) -> cyn::Result<()> {
   let mut stdout = tokio::io::stdout();

   stdout.write_all(bytes).await.chain_err(FAIL_STDOUT)?;
   stdout.flush().await.chain_err(FAIL_STDOUT)
}

async fn setup(config: Option<&Path>) -> cyn::Result<Context> {
   let config = match config.map(Path::to_path_buf).or_else(Config::default_path) {
      Some(path) => {
         Config::load(&path).await.chain_err_with(|| {
            format!("failed to load config from '{path}'", path = path.display())
         })?
      },

      None => Config::default(),
   };

   let pool = Pool::from_config(&config).chain_err("failed to set up runtimes")?;

   let ctx = Context::builder()
      .trace(Trace::new(config.trace_size))
      .pool(Arc::new(pool))
      .build();

   let cancel = ctx.cancel.clone();
   tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
         tracing::debug!("Interrupted.");
         cancel.cancel();
      }
   });

   Ok(ctx)
}

async fn run(ctx: &Context, script: &Path, inputs: &[String], args: Vec<String>) -> cyn::Result<()> {
   let source = tokio::fs::read_to_string(script).await.chain_err_with(|| {
      format!("failed to read script from '{path}'", path = script.display())
   })?;

   let ground = ground::ground().await.chain_err("failed to set up ground")?;

   let stdin = if inputs.is_empty() {
      Source::from_reader("stdin", tokio::io::stdin())
   } else {
      Source::from_values("inputs", [Value::Scope(self::inputs(inputs))])
   };

   let args = args.into_iter().map(Value::string).collect::<Vec<_>>();

   let scope = ground::run_scope(
      &ground,
      RunState::builder()
         .args(args.clone())
         .env(environment())
         .dir(Value::HostPath(dir_of(script)))
         .stdin(stdin)
         .stdout(Sink::to_writer("stdout", tokio::io::stdout()))
         .build(),
   );

   let file = script.display().to_string();
   let result = async {
      bass_runtime::eval_source(ctx, &scope, &file, &source).await?;
      ground::run_main(ctx, &scope, args).await
   }
   .await;

   ctx.wait().await;

   if let Err(error) = result {
      report(ctx, &error)?;
      cyn::bail!("failed to run '{file}'");
   }

   Ok(())
}

async fn repl(ctx: &Context) -> cyn::Result<()> {
   let ground = ground::ground().await.chain_err("failed to set up ground")?;

   let scope = ground::run_scope(
      &ground,
      RunState::builder()
         .env(environment())
         .dir(Value::HostPath(dir_of(Path::new("./repl"))))
         .stdout(Sink::to_writer("stdout", tokio::io::stdout()))
         .build(),
   );

   let mut lines = BufReader::new(tokio::io::stdin()).lines();
   let mut buffer = String::new();

   loop {
      let prompt = if buffer.is_empty() { "=> " } else { "   " };

      let mut stdout = io::stdout().lock();
      write!(stdout, "{prompt}", prompt = prompt.dim()).chain_err(FAIL_STDOUT)?;
      stdout.flush().chain_err(FAIL_STDOUT)?;
      drop(stdout);

      let line = tokio::select! {
         line = lines.next_line() => line.chain_err("failed to read stdin")?,
         () = ctx.cancel.cancelled() => None,
      };

      let Some(line) = line else {
         break;
      };

      buffer.push_str(&line);
      buffer.push('\n');

      let forms = match read::read_all("(repl)", &buffer) {
         Ok(forms) => forms,
         Err(Error::Read { ref error, .. }) if incomplete(error) => continue,
         Err(error) => {
            buffer.clear();
            report(ctx, &error)?;
            continue;
         },
      };

      buffer.clear();

      for form in &forms {
         match bass_runtime::eval(ctx, form, &scope).await {
            Ok(value) => println!("{value}"),
            Err(error) => {
               report(ctx, &error)?;
               break;
            },
         }
      }

      ctx.trace.reset();
   }

   println!();
   ctx.wait().await;
   Ok(())
}

async fn run_thunk(ctx: &Context) -> cyn::Result<()> {
   let payload = read_stdin().await?;

   let json = serde_json::from_slice::<serde_json::Value>(&payload).chain_err("failed to decode thunk")?;
   let thunk = Thunk::from_json(&json).chain_err("failed to decode thunk")?;

   let mut response = Vec::new();
   ctx.pool
      .run(ctx, &mut response, &thunk)
      .await
      .chain_err_with(|| format!("failed to run {thunk}"))?;

   write_stdout(&response).await
}

async fn export(ctx: &Context) -> cyn::Result<()> {
   let payload = read_stdin().await?;

   let path = serde_json::from_slice::<ThunkPath>(&payload).chain_err("payload must be a thunk path")?;

   let mut archive = Vec::new();
   ctx.pool
      .export_path(ctx, &mut archive, &path)
      .await
      .chain_err_with(|| format!("failed to export {path}"))?;

   write_stdout(&archive).await
}

async fn execute(cli: Cli) -> cyn::Result<()> {
   let ctx = setup(cli.config.as_deref()).await?;

   match cli.command.unwrap_or(Command::Repl) {
      Command::Repl => repl(&ctx).await,

      Command::Run {
         inputs,
         script,
         args,
      } => run(&ctx, &script, &inputs, args).await,

      Command::RunThunk => run_thunk(&ctx).await,

      Command::Export => export(&ctx).await,

      Command::Prune => {
         ctx.pool
            .prune(&ctx)
            .await
            .chain_err("failed to prune runtimes")
      },
   }
}

#[tokio::main]
async fn main() -> cyn::Termination {
   let cli = Cli::parse();

   let default = if cli.debug { "debug" } else { "warn" };
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::try_from_env("BASS_LOG").unwrap_or_else(|_| EnvFilter::new(default)))
      .with_writer(io::stderr)
      .init();

   execute(cli).await.into()
}
