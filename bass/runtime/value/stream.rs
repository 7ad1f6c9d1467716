//! Streams of values flowing in and out of a run.

use std::{
   collections::VecDeque,
   fmt,
   sync::Arc,
};

use arcstr::ArcStr;
use async_trait::async_trait;
use bytes::{
   Buf as _,
   BytesMut,
};
use tokio::{
   io::{
      AsyncRead,
      AsyncReadExt as _,
      AsyncWrite,
      AsyncWriteExt as _,
   },
   sync::Mutex,
};
use tokio_util::codec::{
   Decoder,
   Encoder,
};

use crate::{
   Error,
   Result,
   Value,
   value::json,
};

#[async_trait]
pub trait PipeSource: Send + Sync {
   /// The next value, or [`None`] once the stream is over.
   async fn next(&self) -> Result<Option<Value>>;
}

#[async_trait]
pub trait PipeSink: Send + Sync {
   async fn emit(&self, value: &Value) -> Result<()>;
}

/// A stream of values that can be read from.
#[derive(Clone)]
pub struct Source {
   pub name: ArcStr,
   pipe:     Arc<dyn PipeSource>,
}

impl fmt::Display for Source {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<source: {name}>", name = self.name)
   }
}

impl PartialEq for Source {
   fn eq(&self, other: &Self) -> bool {
      Arc::ptr_eq(&self.pipe, &other.pipe)
   }
}

impl Source {
   #[must_use]
   pub fn new(name: impl Into<ArcStr>, pipe: impl PipeSource + 'static) -> Self {
      Self {
         name: name.into(),
         pipe: Arc::new(pipe),
      }
   }

   #[must_use]
   pub fn from_values(name: impl Into<ArcStr>, values: impl IntoIterator<Item = Value>) -> Self {
      Self::new(name, ListSource(Mutex::new(values.into_iter().collect())))
   }

   /// A source decoding a JSON stream out of a reader.
   #[must_use]
   pub fn from_reader(
      name: impl Into<ArcStr>,
      reader: impl AsyncRead + Unpin + Send + 'static,
   ) -> Self {
      Self::new(name, JsonSource {
         state: Mutex::new(JsonSourceState {
            reader: Box::new(reader),
            buffer: BytesMut::new(),
            codec:  JsonCodec,
            done:   false,
         }),
      })
   }

   pub async fn next(&self) -> Result<Option<Value>> {
      self.pipe.next().await
   }

   /// Reads every remaining value.
   pub async fn collect(&self) -> Result<Vec<Value>> {
      let mut values = Vec::new();

      while let Some(value) = self.next().await? {
         values.push(value);
      }

      Ok(values)
   }
}

/// A destination for values.
#[derive(Clone)]
pub struct Sink {
   pub name: ArcStr,
   pipe:     Arc<dyn PipeSink>,
}

impl fmt::Display for Sink {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(writer, "<sink: {name}>", name = self.name)
   }
}

impl PartialEq for Sink {
   fn eq(&self, other: &Self) -> bool {
      Arc::ptr_eq(&self.pipe, &other.pipe)
   }
}

impl Sink {
   #[must_use]
   pub fn new(name: impl Into<ArcStr>, pipe: impl PipeSink + 'static) -> Self {
      Self {
         name: name.into(),
         pipe: Arc::new(pipe),
      }
   }

   /// A sink writing each value as a line of JSON.
   #[must_use]
   pub fn to_writer(name: impl Into<ArcStr>, writer: impl AsyncWrite + Unpin + Send + 'static) -> Self {
      Self::new(name, JsonSink {
         writer: Mutex::new(Box::new(writer)),
      })
   }

   pub async fn emit(&self, value: &Value) -> Result<()> {
      self.pipe.emit(value).await
   }
}

struct ListSource(Mutex<VecDeque<Value>>);

#[async_trait]
impl PipeSource for ListSource {
   async fn next(&self) -> Result<Option<Value>> {
      Ok(self.0.lock().await.pop_front())
   }
}

/// Collects emitted values in memory.
#[derive(Default, Clone)]
pub struct BufferSink(Arc<Mutex<Vec<Value>>>);

impl BufferSink {
   pub async fn values(&self) -> Vec<Value> {
      self.0.lock().await.clone()
   }
}

#[async_trait]
impl PipeSink for BufferSink {
   async fn emit(&self, value: &Value) -> Result<()> {
      self.0.lock().await.push(value.clone());
      Ok(())
   }
}

/// Frames a stream of concatenated or newline separated JSON values.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
   fn decode_next(buffer: &mut BytesMut, eof: bool) -> Result<Option<serde_json::Value>> {
      let mut values = serde_json::Deserializer::from_slice(buffer).into_iter::<serde_json::Value>();

      match values.next() {
         // A number running into the end of the buffer may continue in the
         // next read.
         Some(Ok(value)) if !eof && value.is_number() && values.byte_offset() == buffer.len() => {
            Ok(None)
         },

         Some(Ok(value)) => {
            let offset = values.byte_offset();
            buffer.advance(offset);
            Ok(Some(value))
         },

         Some(Err(error)) if error.is_eof() && !eof => Ok(None),
         Some(Err(error)) => Err(error.into()),

         None => {
            buffer.clear();
            Ok(None)
         },
      }
   }
}

impl Decoder for JsonCodec {
   type Item = serde_json::Value;
   type Error = Error;

   fn decode(&mut self, buffer: &mut BytesMut) -> Result<Option<Self::Item>> {
      Self::decode_next(buffer, false)
   }

   fn decode_eof(&mut self, buffer: &mut BytesMut) -> Result<Option<Self::Item>> {
      Self::decode_next(buffer, true)
   }
}

impl Encoder<&Value> for JsonCodec {
   type Error = Error;

   fn encode(&mut self, value: &Value, buffer: &mut BytesMut) -> Result<()> {
      let json = json::to_string(value)?;

      buffer.extend_from_slice(json.as_bytes());
      buffer.extend_from_slice(b"\n");

      Ok(())
   }
}

struct JsonSourceState {
   reader: Box<dyn AsyncRead + Unpin + Send>,
   buffer: BytesMut,
   codec:  JsonCodec,
   done:   bool,
}

struct JsonSource {
   state: Mutex<JsonSourceState>,
}

#[async_trait]
impl PipeSource for JsonSource {
   async fn next(&self) -> Result<Option<Value>> {
      let mut guard = self.state.lock().await;
      let state = &mut *guard;

      loop {
         if let Some(json) = state.codec.decode(&mut state.buffer)? {
            return Ok(Some(json::from_json(&json)));
         }

         if state.done {
            return Ok(state
               .codec
               .decode_eof(&mut state.buffer)?
               .map(|json| json::from_json(&json)));
         }

         if state.reader.read_buf(&mut state.buffer).await? == 0 {
            state.done = true;
         }
      }
   }
}

struct JsonSink {
   writer: Mutex<Box<dyn AsyncWrite + Unpin + Send>>,
}

#[async_trait]
impl PipeSink for JsonSink {
   async fn emit(&self, value: &Value) -> Result<()> {
      let mut buffer = BytesMut::new();
      JsonCodec.encode(value, &mut buffer)?;

      let mut writer = self.writer.lock().await;
      writer.write_all(&buffer).await?;
      writer.flush().await?;

      Ok(())
   }
}

#[cfg(test)]
mod tests {
   use tokio::io::AsyncReadExt as _;

   use super::*;

   #[tokio::test]
   async fn list_sources_drain_in_order() {
      let source = Source::from_values("test", [Value::Int(1), Value::Int(2)]);

      assert_eq!(source.next().await.unwrap(), Some(Value::Int(1)));
      assert_eq!(source.next().await.unwrap(), Some(Value::Int(2)));
      assert_eq!(source.next().await.unwrap(), None);
      assert_eq!(source.to_string(), "<source: test>");
   }

   #[tokio::test]
   async fn reader_sources_decode_json_streams() {
      let source = Source::from_reader("stdin", &b"1 \"two\"\n[3]{\"four\": 4}\n"[..]);
      let values = source.collect().await.unwrap();

      assert_eq!(values.len(), 4);
      assert_eq!(values[0], Value::Int(1));
      assert_eq!(values[1], Value::string("two"));
      assert_eq!(values[2], Value::list([Value::Int(3)]));
   }

   #[tokio::test]
   async fn truncated_streams_fail() {
      let source = Source::from_reader("stdin", &b"[1, 2"[..]);
      assert!(source.next().await.is_err());
   }

   #[test]
   fn codec_waits_for_complete_values() {
      let mut buffer = BytesMut::from(&b"{\"a\": "[..]);
      assert!(JsonCodec.decode(&mut buffer).unwrap().is_none());

      buffer.extend_from_slice(b"1} 2");
      assert_eq!(
         JsonCodec.decode(&mut buffer).unwrap(),
         Some(serde_json::json!({ "a": 1 }))
      );

      // A bare number at the end could still grow.
      assert!(JsonCodec.decode(&mut buffer).unwrap().is_none());
      assert_eq!(
         JsonCodec.decode_eof(&mut buffer).unwrap(),
         Some(serde_json::json!(2))
      );
   }

   #[tokio::test]
   async fn writer_sinks_emit_lines() {
      let (writer, mut reader) = tokio::io::duplex(64);
      let sink = Sink::to_writer("stdout", writer);

      sink.emit(&Value::list([Value::Int(1)])).await.unwrap();
      drop(sink);

      let mut output = String::new();
      reader.read_to_string(&mut output).await.unwrap();
      assert_eq!(output, "[1]\n");
   }
}
