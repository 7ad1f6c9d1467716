//! Runs a resolved command inside a container.
//!
//! The command file is read and removed, the certificate authority of the
//! host is trusted if one was mounted, and the command runs with the shim as
//! its subreaper. Standard output goes to both our standard output and the
//! response file. Once the command succeeds every file it left behind has its
//! times reset, so equal commands produce equal outputs.

use std::{
   fs::{
      self,
      File,
      FileTimes,
   },
   io::{
      self,
      Read as _,
      Write as _,
   },
   os::unix::fs::MetadataExt as _,
   path::{
      Path,
      PathBuf,
   },
   process::{
      self,
      ChildStdout,
      Stdio,
   },
   thread,
   time::{
      Duration,
      SystemTime,
   },
};

use bass_runtime::command::{
   self,
   EPOCH,
   SHIM_CA,
   SHIM_INPUT,
   SHIM_OUTPUT,
};
use clap::Parser as _;
use cyn::ResultExt as _;
use nix::{
   errno::Errno,
   sys::{
      prctl,
      wait::{
         self,
         WaitStatus,
      },
   },
   unistd::Pid,
};
use tracing_subscriber::EnvFilter;

/// Trust anchors and the command that picks them up, per distribution.
const TRUSTS: &[(&str, &[&str])] = &[
   ("/usr/local/share/ca-certificates/bass.crt", &["update-ca-certificates"]),
   ("/usr/share/pki/trust/anchors/bass.pem", &["update-ca-certificates"]),
   ("/etc/pki/ca-trust/source/anchors/bass.pem", &["update-ca-trust", "extract"]),
   ("/etc/ca-certificates/trust-source/anchors/bass.crt", &["trust", "extract-compat"]),
];

/// Bundles the certificate is appended to when no trust anchor works.
const BUNDLES: &[&str] = &[
   "/etc/ssl/certs/ca-certificates.crt",
   "/etc/ssl/certs/ca-bundle.crt",
];

#[derive(clap::Parser)]
#[command(version, about, args_conflicts_with_subcommands = true)]
struct Cli {
   #[command(subcommand)]
   command: Option<Command>,

   /// Path to the command file.
   path: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug, Clone)]
enum Command {
   /// Run a command file.
   Run {
      /// Path to the command file.
      path: Option<PathBuf>,
   },
}

fn read_command(path: &Path) -> cyn::Result<command::Command> {
   let bytes = fs::read(path).chain_err_with(|| {
      format!("failed to read command from '{path}'", path = path.display())
   })?;

   let command = serde_json::from_slice(&bytes).chain_err("failed to decode command")?;

   fs::remove_file(path).chain_err("failed to remove command file")?;

   Ok(command)
}

fn install_ca() -> cyn::Result<()> {
   let cert = match fs::read(SHIM_CA) {
      Ok(cert) => cert,
      Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
      Err(error) => return Err(error).chain_err("failed to read certificate authority"),
   };

   for &(anchor, update) in TRUSTS {
      let anchor = Path::new(anchor);
      if !anchor.parent().is_some_and(Path::is_dir) {
         continue;
      }

      fs::write(anchor, &cert).chain_err_with(|| {
         format!("failed to write certificate authority to '{anchor}'", anchor = anchor.display())
      })?;

      let Some((program, args)) = update.split_first() else {
         break;
      };

      match process::Command::new(program).args(args).output() {
         Ok(output) if output.status.success() => {
            tracing::debug!("Installed certificate authority with {program}.");
            return Ok(());
         },

         Ok(output) => {
            cyn::bail!(
               "failed to install certificate authority with {program}: {stderr}",
               stderr = String::from_utf8_lossy(&output.stderr).trim(),
            );
         },

         Err(error) if error.kind() == io::ErrorKind::NotFound => break,
         Err(error) => return Err(error).chain_err_with(|| format!("failed to run {program}")),
      }
   }

   for &bundle in BUNDLES {
      if !Path::new(bundle).is_file() {
         continue;
      }

      let mut file = File::options()
         .append(true)
         .open(bundle)
         .chain_err_with(|| format!("failed to open '{bundle}'"))?;

      file
         .write_all(b"\n")
         .and_then(|()| file.write_all(&cert))
         .chain_err_with(|| format!("failed to append certificate authority to '{bundle}'"))?;

      return Ok(());
   }

   tracing::warn!("Found nowhere to install the certificate authority.");
   Ok(())
}

fn relay(stdout: Option<ChildStdout>, mut response: Option<File>) -> io::Result<()> {
   let Some(mut stdout) = stdout else {
      return Ok(());
   };

   let mut chunk = [0; 8192];

   loop {
      let read = match stdout.read(&mut chunk) {
         Ok(0) => return Ok(()),
         Ok(read) => read,
         Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
         Err(error) => return Err(error),
      };

      io::stdout().lock().write_all(&chunk[..read])?;

      if let Some(ref mut response) = response {
         response.write_all(&chunk[..read])?;
      }
   }
}

/// Reaps every child until the command exits, returning its exit code.
fn reap(command: Pid) -> cyn::Result<i32> {
   loop {
      match wait::waitpid(None::<Pid>, None) {
         Ok(WaitStatus::Exited(pid, code)) if pid == command => return Ok(code),
         Ok(WaitStatus::Signaled(pid, signal, _)) if pid == command => return Ok(128 + signal as i32),
         Ok(status) => tracing::debug!("Reaped {status:?}."),
         Err(Errno::EINTR) => {},
         Err(errno) => return Err(errno).chain_err("failed to wait for command"),
      }
   }
}

fn execute(command: &command::Command, output: Option<&Path>) -> cyn::Result<i32> {
   let argv = command.argv();
   let Some((program, args)) = argv.split_first() else {
      cyn::bail!("command has nothing to run");
   };

   let mut stdin = Vec::new();
   for value in &command.stdin {
      serde_json::to_writer(&mut stdin, value).chain_err("failed to encode stdin")?;
      stdin.push(b'\n');
   }

   let response = output
      .map(File::create)
      .transpose()
      .chain_err("failed to create response file")?;

   let mut child = process::Command::new(program);
   child
      .args(args)
      .envs(command.env_pairs())
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit());

   if let Some(ref dir) = command.dir {
      child.current_dir(dir);
   }

   let mut child = child
      .spawn()
      .chain_err_with(|| format!("failed to start {program}"))?;

   let pipe = child.stdin.take();
   let feeder = thread::spawn(move || {
      match pipe.map(|mut pipe| pipe.write_all(&stdin)) {
         Some(Err(error)) if error.kind() != io::ErrorKind::BrokenPipe => Err(error),
         _ => Ok(()),
      }
   });

   let stdout = child.stdout.take();
   let relayer = thread::spawn(move || relay(stdout, response));

   let pid = i32::try_from(child.id()).chain_err("process id out of range")?;
   let code = reap(Pid::from_raw(pid))?;

   feeder
      .join()
      .map_err(|_| cyn::chain!("stdin writer panicked"))?
      .chain_err("failed to write stdin")?;

   relayer
      .join()
      .map_err(|_| cyn::chain!("stdout relay panicked"))?
      .chain_err("failed to relay stdout")?;

   Ok(code)
}

fn normalize(path: &Path, device: u64, times: FileTimes) -> io::Result<()> {
   let metadata = fs::symlink_metadata(path)?;

   if metadata.dev() != device {
      tracing::debug!("Skipping mount point '{path}'.", path = path.display());
      return Ok(());
   }

   if metadata.is_dir() {
      for entry in fs::read_dir(path)? {
         normalize(&entry?.path(), device, times)?;
      }
   } else if !metadata.is_file() {
      return Ok(());
   }

   File::open(path)?.set_times(times)
}

/// Sets the times of everything under the root to the epoch, without
/// crossing into other filesystems.
fn normalize_times(root: &Path) -> io::Result<()> {
   let epoch = SystemTime::UNIX_EPOCH + Duration::from_secs(EPOCH.unsigned_abs());
   let times = FileTimes::new().set_accessed(epoch).set_modified(epoch);

   normalize(root, fs::symlink_metadata(root)?.dev(), times)
}

fn run(path: &Path) -> cyn::Result<i32> {
   let command = read_command(path)?;

   install_ca()?;

   prctl::set_child_subreaper(true).chain_err("failed to become a subreaper")?;

   let output = Path::new(SHIM_OUTPUT);
   let output = output.parent().is_some_and(Path::is_dir).then_some(output);

   let code = execute(&command, output)?;

   if code == 0 {
      normalize_times(Path::new(".")).chain_err("failed to normalize times")?;
   }

   Ok(code)
}

fn main() -> cyn::Termination {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::try_from_env("BASS_SHIM_LOG").unwrap_or_else(|_| EnvFilter::new("error")))
      .with_writer(io::stderr)
      .init();

   let cli = Cli::parse();

   let path = match cli.command {
      Some(Command::Run { path }) => path,
      None => cli.path,
   }
   .unwrap_or_else(|| PathBuf::from(SHIM_INPUT));

   match run(&path) {
      Ok(0) => cyn::Termination::success(),
      Ok(code) => cyn::Termination::code(u8::try_from(code).unwrap_or(1)),
      Err(chain) => chain.into(),
   }
}

#[cfg(test)]
mod tests {
   use clap::CommandFactory as _;

   use super::*;

   fn scratch(name: &str) -> PathBuf {
      let path = std::env::temp_dir().join(format!("bass-shim-{name}-{pid}", pid = process::id()));

      let _ = fs::remove_dir_all(&path);
      fs::create_dir_all(&path).unwrap();
      path
   }

   #[test]
   fn cli() {
      Cli::command().debug_assert();

      let cli = Cli::try_parse_from(["bass-shim", "run", "/tmp/cmd.json"]).unwrap();
      assert!(matches!(cli.command, Some(Command::Run { path: Some(_) })));

      let cli = Cli::try_parse_from(["bass-shim", "/tmp/cmd.json"]).unwrap();
      assert_eq!(cli.path, Some(PathBuf::from("/tmp/cmd.json")));
   }

   #[test]
   fn commands_are_burned_after_reading() {
      let dir = scratch("read");
      let path = dir.join("cmd.json");
      fs::write(&path, r#"{"args":["echo","hi"],"env":["A=b"]}"#).unwrap();

      let command = read_command(&path).unwrap();
      assert_eq!(command.argv(), ["echo", "hi"]);
      assert_eq!(command.env, ["A=b"]);
      assert!(!path.exists());

      fs::remove_dir_all(dir).unwrap();
   }

   #[test]
   fn execution() {
      let dir = scratch("execute");
      let output = dir.join("response");

      let command = command::Command {
         args: ["sh", "-c", "cat; echo \"$GREETING\"; exit 3"].map(str::to_owned).to_vec(),
         stdin: vec![serde_json::json!({ "a": 1 }), serde_json::json!(2)],
         env: vec!["GREETING=hello".to_owned()],
         dir: Some(dir.display().to_string()),
         ..command::Command::default()
      };

      assert_eq!(execute(&command, Some(&output)).unwrap(), 3);
      assert_eq!(fs::read_to_string(&output).unwrap(), "{\"a\":1}\n2\nhello\n");

      fs::remove_dir_all(dir).unwrap();
   }

   #[test]
   fn times_are_normalized() {
      let dir = scratch("times");
      fs::create_dir_all(dir.join("sub")).unwrap();
      fs::write(dir.join("sub/file"), "data").unwrap();

      normalize_times(&dir).unwrap();

      let epoch = SystemTime::UNIX_EPOCH + Duration::from_secs(EPOCH.unsigned_abs());
      for path in [dir.join("sub/file"), dir.join("sub"), dir.clone()] {
         assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), epoch);
      }

      fs::remove_dir_all(dir).unwrap();
   }
}
