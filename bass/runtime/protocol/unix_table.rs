use std::io;

use super::{
   LineBuffer,
   ProtoWriter,
   emit,
};

fn row(line: &str) -> serde_json::Value {
   serde_json::Value::Array(
      line
         .split_whitespace()
         .map(|column| serde_json::Value::String(column.to_owned()))
         .collect(),
   )
}

/// Emits every line as an array of its whitespace separated columns. Empty
/// lines are empty arrays.
pub struct UnixTableWriter<W> {
   out:    W,
   buffer: LineBuffer,
}

impl<W: io::Write + Send> UnixTableWriter<W> {
   pub fn new(out: W) -> Self {
      Self {
         out,
         buffer: LineBuffer::default(),
      }
   }
}

impl<W: io::Write + Send> io::Write for UnixTableWriter<W> {
   fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
      self.buffer.push(buffer);

      while let Some(line) = self.buffer.next_line() {
         emit(&mut self.out, &row(&line))?;
      }

      Ok(buffer.len())
   }

   fn flush(&mut self) -> io::Result<()> {
      self.out.flush()
   }
}

impl<W: io::Write + Send> ProtoWriter for UnixTableWriter<W> {
   fn finish(&mut self) -> io::Result<()> {
      if let Some(rest) = self.buffer.take_rest() {
         emit(&mut self.out, &row(&rest))?;
      }

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
   fn splits_columns() {
      let (log, _) = log();

      assert_eq!(
         feed("unix-table", &["a 1\nb\t2\n\nd  4  done\n"], log),
         "[\"a\",\"1\"]\n[\"b\",\"2\"]\n[]\n[\"d\",\"4\",\"done\"]\n"
      );
   }

   #[test]
   fn partial_lines_wait() {
      let (log, _) = log();

      assert_eq!(
         feed("unix-table", &["total 4\ndrwx", "r-xr-x 2 root\n", "-rw-r--r-- 1"], log),
         "[\"total\",\"4\"]\n[\"drwxr-xr-x\",\"2\",\"root\"]\n[\"-rw-r--r--\",\"1\"]\n"
      );
   }
}
