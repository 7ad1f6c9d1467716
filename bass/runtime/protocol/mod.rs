//! Response protocols.
//!
//! A protocol turns the bytes a thunk writes into a stream of JSON values.
//! Each one is a [`ProtoWriter`] wrapping the destination of that stream:
//! bytes go in through [`io::Write`], and [`ProtoWriter::finish`] emits
//! whatever was held back until the end.

use std::io;

use bytes::BytesMut;

use crate::{
   Error,
   Output,
   Result,
   value::Source,
};

mod github_action;
mod json;
mod lines;
mod raw;
mod unix_table;

pub use github_action::GitHubActionWriter;
pub use json::JsonWriter;
pub use lines::LinesWriter;
pub use raw::RawWriter;
pub use unix_table::UnixTableWriter;

/// Every protocol name a response can ask for.
pub const NAMES: &[&str] = &["json", "raw", "lines", "unix-table", "github-action"];

pub trait ProtoWriter: io::Write + Send {
   /// Emits anything still buffered. Must be called once all bytes are
   /// written.
   fn finish(&mut self) -> io::Result<()>;
}

/// Wraps `out` in the writer for the named protocol. Text that is not part
/// of the response, like logs interleaved with workflow commands, goes to
/// `log`.
pub fn writer<'a>(
   name: &str,
   out: impl io::Write + Send + 'a,
   log: Output,
) -> Result<Box<dyn ProtoWriter + 'a>> {
   Ok(match name {
      "json" => Box::new(JsonWriter::new(out)),
      "raw" => Box::new(RawWriter::new(out)),
      "lines" => Box::new(LinesWriter::new(out)),
      "unix-table" => Box::new(UnixTableWriter::new(out)),
      "github-action" => Box::new(GitHubActionWriter::new(out, log)),

      name => return Err(Error::UnknownProtocol { name: name.into() }),
   })
}

/// Decodes a complete response into a source of values.
pub fn decode(name: &str, bytes: &[u8], log: Output) -> Result<Source> {
   let mut json = Vec::new();

   let mut writer = writer(name, &mut json, log)?;
   writer.write_all(bytes)?;
   writer.finish()?;
   drop(writer);

   Ok(Source::from_reader(
      format!("{name} response"),
      io::Cursor::new(json),
   ))
}

/// Writes one value of the JSON stream.
fn emit(out: &mut impl io::Write, value: &serde_json::Value) -> io::Result<()> {
   serde_json::to_writer(&mut *out, value)?;
   out.write_all(b"\n")
}

/// Holds bytes back until whole lines are available.
#[derive(Default)]
struct LineBuffer(BytesMut);

impl LineBuffer {
   fn push(&mut self, bytes: &[u8]) {
      self.0.extend_from_slice(bytes);
   }

   /// The next complete line, without its newline.
   fn next_line(&mut self) -> Option<String> {
      let end = self.0.iter().position(|&byte| byte == b'\n')?;

      let line = self.0.split_to(end + 1);
      Some(String::from_utf8_lossy(&line[..end]).into_owned())
   }

   /// Whatever follows the last newline.
   fn take_rest(&mut self) -> Option<String> {
      if self.0.is_empty() {
         return None;
      }

      Some(String::from_utf8_lossy(&self.0.split()).into_owned())
   }
}

#[cfg(test)]
mod tests {
   use std::sync::{
      Arc,
      Mutex,
   };

   use super::*;
   use crate::Value;

   pub(super) fn log() -> (Output, Arc<Mutex<Vec<u8>>>) {
      let buffer = Arc::new(Mutex::new(Vec::new()));
      let output: Output = buffer.clone();

      (output, buffer)
   }

   /// Writes the chunks one at a time, then finishes.
   pub(super) fn feed(name: &str, chunks: &[&str], log: Output) -> String {
      let mut out = Vec::new();

      let mut writer = writer(name, &mut out, log).unwrap();
      for chunk in chunks {
         writer.write_all(chunk.as_bytes()).unwrap();
      }
      writer.finish().unwrap();
      drop(writer);

      String::from_utf8(out).unwrap()
   }

   #[test]
   fn unknown_protocols() {
      let (log, _) = log();

      assert!(matches!(
         writer("yaml", Vec::new(), log),
         Err(Error::UnknownProtocol { ref name }) if name == "yaml"
      ));
   }

   #[tokio::test]
   async fn decoding() {
      let (log, _) = log();

      let source = decode("lines", b"hello\nworld\n", log).unwrap();
      assert_eq!(source.collect().await.unwrap(), [
         Value::string("hello"),
         Value::string("world"),
      ]);
   }

   #[test]
   fn line_buffers() {
      let mut buffer = LineBuffer::default();

      buffer.push(b"a\nb");
      assert_eq!(buffer.next_line().as_deref(), Some("a"));
      assert_eq!(buffer.next_line(), None);

      buffer.push(b"c\n");
      assert_eq!(buffer.next_line().as_deref(), Some("bc"));
      assert_eq!(buffer.take_rest(), None);
   }
}
