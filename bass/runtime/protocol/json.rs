use std::io;

use super::ProtoWriter;

/// Passes bytes through untouched, they are a JSON stream already.
pub struct JsonWriter<W> {
   out: W,
}

impl<W: io::Write + Send> JsonWriter<W> {
   pub fn new(out: W) -> Self {
      Self { out }
   }
}

impl<W: io::Write + Send> io::Write for JsonWriter<W> {
   fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
      self.out.write(buffer)
   }

   fn flush(&mut self) -> io::Result<()> {
      self.out.flush()
   }
}

impl<W: io::Write + Send> ProtoWriter for JsonWriter<W> {
   fn finish(&mut self) -> io::Result<()> {
      self.out.flush()
   }
}

#[cfg(test)]
mod tests {
   use super::super::tests::{
      feed,
      log,
   };

   #[test]
   fn passes_through() {
      let (log, _) = log();

      assert_eq!(feed("json", &["{\"a\":", " 1}\n", "2"], log), "{\"a\": 1}\n2");
   }
}
