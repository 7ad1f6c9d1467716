use std::io;

use super::{
   ProtoWriter,
   emit,
};

/// Buffers everything and emits it as a single string.
pub struct RawWriter<W> {
   out:    W,
   buffer: Vec<u8>,
}

impl<W: io::Write + Send> RawWriter<W> {
   pub fn new(out: W) -> Self {
      Self {
         out,
         buffer: Vec::new(),
      }
   }
}

impl<W: io::Write + Send> io::Write for RawWriter<W> {
   fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
      self.buffer.extend_from_slice(buffer);
      Ok(buffer.len())
   }

   fn flush(&mut self) -> io::Result<()> {
      Ok(())
   }
}

impl<W: io::Write + Send> ProtoWriter for RawWriter<W> {
   fn finish(&mut self) -> io::Result<()> {
      let text = String::from_utf8_lossy(&self.buffer).into_owned();
      self.buffer.clear();

      emit(&mut self.out, &serde_json::Value::String(text))?;
      self.out.flush()
   }
}
