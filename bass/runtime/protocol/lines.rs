use std::io;

use super::{
   LineBuffer,
   ProtoWriter,
   emit,
};

/// Emits every line as a string.
pub struct LinesWriter<W> {
   out:    W,
   buffer: LineBuffer,
}

impl<W: io::Write + Send> LinesWriter<W> {
   pub fn new(out: W) -> Self {
      Self {
         out,
         buffer: LineBuffer::default(),
      }
   }
}

impl<W: io::Write + Send> io::Write for LinesWriter<W> {
   fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
      self.buffer.push(buffer);

      while let Some(line) = self.buffer.next_line() {
         emit(&mut self.out, &serde_json::Value::String(line))?;
      }

      Ok(buffer.len())
   }

   fn flush(&mut self) -> io::Result<()> {
      self.out.flush()
   }
}

impl<W: io::Write + Send> ProtoWriter for LinesWriter<W> {
   fn finish(&mut self) -> io::Result<()> {
      if let Some(rest) = self.buffer.take_rest() {
         emit(&mut self.out, &serde_json::Value::String(rest))?;
      }

      self.out.flush()
   }
}
