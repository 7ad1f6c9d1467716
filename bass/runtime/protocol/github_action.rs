use std::{
   io,
   sync::PoisonError,
};

use bytes::{
   Buf as _,
   BytesMut,
};

use super::{
   ProtoWriter,
   emit,
};
use crate::Output;

/// Starts a workflow command line.
const DISPATCH: &[u8] = b"::";

/// A workflow command, `::name key=value,...::value`.
#[derive(Debug, PartialEq, Eq)]
struct Command<'a> {
   name:   &'a str,
   params: Vec<(&'a str, &'a str)>,
   value:  &'a str,
}

impl<'a> Command<'a> {
   fn parse(line: &'a str) -> Option<Self> {
      let (head, value) = line.strip_prefix("::")?.split_once("::")?;

      let (name, params) = match head.split_once(char::is_whitespace) {
         Some((name, params)) => (name, params.trim()),
         None => (head, ""),
      };

      if name.is_empty() {
         return None;
      }

      let params = params
         .split(',')
         .filter(|param| !param.is_empty())
         .map(|param| param.split_once('='))
         .collect::<Option<Vec<_>>>()?;

      Some(Self {
         name,
         params,
         value,
      })
   }

   fn param(&self, key: &str) -> Option<&'a str> {
      self
         .params
         .iter()
         .find(|&&(name, _)| name == key)
         .map(|&(_, value)| value)
   }
}

/// Reads logs interleaved with GitHub workflow commands. Plain text goes to
/// the log as soon as it arrives, command lines are held back until they
/// end. `set-output` commands make up the response, which is emitted as one
/// object when finished.
pub struct GitHubActionWriter<W> {
   out:     W,
   log:     Output,
   outputs: serde_json::Map<String, serde_json::Value>,

   /// In the middle of a plain line, which passes through until its end.
   midline: bool,
   pending: BytesMut,
}

impl<W: io::Write + Send> GitHubActionWriter<W> {
   pub fn new(out: W, log: Output) -> Self {
      Self {
         out,
         log,
         outputs: serde_json::Map::new(),
         midline: false,
         pending: BytesMut::new(),
      }
   }

   fn log(&self, bytes: &[u8]) -> io::Result<()> {
      self
         .log
         .lock()
         .unwrap_or_else(PoisonError::into_inner)
         .write_all(bytes)
   }

   fn handle(&mut self, line: &[u8]) -> io::Result<()> {
      use yansi::Paint as _;

      let line = String::from_utf8_lossy(line);

      let Some(command) = Command::parse(&line) else {
         // Not a command after all.
         return self.log(format!("{line}\n").as_bytes());
      };

      let message = match command.name {
         "set-output" => {
            match command.param("name") {
               Some(name) => {
                  self.outputs.insert(
                     name.to_owned(),
                     serde_json::Value::String(command.value.to_owned()),
                  );
               },

               None => tracing::warn!("Ignoring set-output without a name: {line}"),
            }

            return Ok(());
         },

         "error" => format!("error: {value}", value = command.value).red().to_string(),
         "warning" => format!("warning: {value}", value = command.value).yellow().to_string(),
         "notice" => format!("notice: {value}", value = command.value).blue().to_string(),

         _ => format!("unimplemented command: {line}").yellow().to_string(),
      };

      self.log(format!("{message}\n").as_bytes())
   }
}

impl<W: io::Write + Send> io::Write for GitHubActionWriter<W> {
   fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
      self.pending.extend_from_slice(buffer);

      while !self.pending.is_empty() {
         let newline = self.pending.iter().position(|&byte| byte == b'\n');

         if !self.midline && self.pending.starts_with(DISPATCH) {
            let Some(end) = newline else {
               break;
            };

            let line = self.pending.split_to(end + 1);
            self.handle(&line[..end])?;
            continue;
         }

         // Could still turn into a command.
         if !self.midline && DISPATCH.starts_with(&self.pending) {
            break;
         }

         match newline {
            Some(end) => {
               self.log(&self.pending[..=end])?;
               self.pending.advance(end + 1);
               self.midline = false;
            },

            None => {
               self.log(&self.pending)?;
               BytesMut::clear(&mut self.pending);
               self.midline = true;
            },
         }
      }

      Ok(buffer.len())
   }

   fn flush(&mut self) -> io::Result<()> {
      self.out.flush()
   }
}

impl<W: io::Write + Send> ProtoWriter for GitHubActionWriter<W> {
   fn finish(&mut self) -> io::Result<()> {
      let rest = self.pending.split();

      if !rest.is_empty() {
         if !self.midline && rest.starts_with(DISPATCH) {
            self.handle(&rest)?;
         } else {
            self.log(&rest)?;
         }
      }

      emit(
         &mut self.out,
         &serde_json::Value::Object(std::mem::take(&mut self.outputs)),
      )?;
      self.out.flush()
   }
}

#[cfg(test)]
mod tests {
   use std::sync::{
      Arc,
      Mutex,
   };

   use super::{
      super::tests::{
         feed,
         log,
      },
      *,
   };

   fn logged(log: &Arc<Mutex<Vec<u8>>>) -> String {
      String::from_utf8(log.lock().unwrap().clone()).unwrap()
   }

   #[test]
   fn parsing() {
      assert_eq!(
         Command::parse("::set-output name=foo::bar"),
         Some(Command {
            name:   "set-output",
            params: vec![("name", "foo")],
            value:  "bar",
         })
      );
      assert_eq!(
         Command::parse("::error::it broke"),
         Some(Command {
            name:   "error",
            params: Vec::new(),
            value:  "it broke",
         })
      );
      assert_eq!(Command::parse("::add-mask bad::x"), None);
      assert_eq!(Command::parse("::nothing"), None);
   }

   #[test]
   fn outputs_and_logs() {
      let (output, log) = log();

      assert_eq!(
         feed("github-action", &["::set-output name=foo::bar\nplain log\n"], output),
         "{\"foo\":\"bar\"}\n"
      );
      assert_eq!(logged(&log), "plain log\n");
   }

   #[test]
   fn commands_across_writes() {
      let (output, log) = log();

      assert_eq!(
         feed(
            "github-action",
            &["start ", "of a line\n:", ":set-output na", "me=a::1\n::set-output name=b::2"],
            output,
         ),
         "{\"a\":\"1\",\"b\":\"2\"}\n"
      );
      assert_eq!(logged(&log), "start of a line\n");
   }

   #[test]
   fn colons_mid_line_are_text() {
      let (output, log) = log();

      assert_eq!(
         feed("github-action", &["note", "::set-output name=a::1\n"], output),
         "{}\n"
      );
      assert_eq!(logged(&log), "note::set-output name=a::1\n");
   }

   #[test]
   fn partial_lines_pass_through() {
      let (output, log) = log();

      let mut out = Vec::new();
      let mut writer = GitHubActionWriter::new(&mut out, output);

      assert_eq!(io::Write::write(&mut writer, b"note").unwrap(), 4);
      assert!(writer.pending.is_empty());
      assert_eq!(logged(&log), "note");

      io::Write::write_all(&mut writer, b" more\n::set-output name=a::1").unwrap();
      writer.finish().unwrap();
      drop(writer);

      assert_eq!(logged(&log), "note more\n");
      assert_eq!(String::from_utf8(out).unwrap(), "{\"a\":\"1\"}\n");
   }

   #[test]
   fn annotations_are_logged() {
      let (output, log) = log();
      yansi::disable();

      feed("github-action", &["::warning::careful\n::error::broken\n"], output);
      assert_eq!(logged(&log), "warning: careful\nerror: broken\n");
   }
}
