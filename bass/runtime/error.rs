use std::{
   io,
   sync::Arc,
};

use arcstr::ArcStr;
use ranged::Range;

pub type Result<T> = std::result::Result<T, Error>;

fn arity_need(need: &usize, variadic: &bool) -> String {
   if *variadic {
      format!("at least {need}")
   } else {
      need.to_string()
   }
}

/// Every error the runtime can produce. Errors travel through continuations
/// as plain values and are cheap to clone.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
   #[error("{error}")]
   Read {
      error: bass_syntax::ReadError,
      range: Range,
   },

   #[error("unbound symbol: {name}")]
   Unbound { name: ArcStr },

   #[error("cannot decode {value} ({have}) into {need}")]
   Decode {
      value: String,
      have:  &'static str,
      need:  &'static str,
   },

   #[error("bind mismatch: need {need}, have {have}")]
   BindMismatch { need: String, have: String },

   #[error("cannot bind {pattern}")]
   CannotBind { pattern: String },

   #[error("{name} arity: need {} arguments, given {have}", arity_need(.need, .variadic))]
   Arity {
      name:     ArcStr,
      need:     usize,
      have:     usize,
      variadic: bool,
   },

   #[error("bad key: {value} (expected a keyword or symbol)")]
   BadKey { value: String },

   #[error("cannot encode {value} as json")]
   Encode { value: String },

   #[error("no runtime configured for os={os}, arch={arch}")]
   NoRuntime { os: ArcStr, arch: ArcStr },

   #[error("unknown protocol: {name}")]
   UnknownProtocol { name: ArcStr },

   #[error("interrupted")]
   Interrupted,

   #[error("end of source")]
   EndOfSource,

   #[error("thunk {thunk} failed with exit status {code}")]
   Failed { thunk: String, code: i32 },

   #[error("{range}: {error}")]
   Traced { error: Arc<Error>, range: Range },

   #[error(transparent)]
   Io(Arc<io::Error>),

   #[error(transparent)]
   Json(Arc<serde_json::Error>),

   #[error("{0}")]
   Message(String),
}

impl From<io::Error> for Error {
   fn from(error: io::Error) -> Self {
      Self::Io(Arc::new(error))
   }
}

impl From<serde_json::Error> for Error {
   fn from(error: serde_json::Error) -> Self {
      Self::Json(Arc::new(error))
   }
}

impl Error {
   #[must_use]
   pub fn message(message: impl Into<String>) -> Self {
      Self::Message(message.into())
   }

   /// Strips every [`Error::Traced`] layer.
   #[must_use]
   pub fn root(&self) -> &Self {
      match *self {
         Self::Traced { ref error, .. } => error.root(),
         ref error => error,
      }
   }

   /// The innermost source range attached to this error.
   #[must_use]
   pub fn range(&self) -> Option<&Range> {
      match *self {
         Self::Traced {
            ref error,
            ref range,
         } => error.range().or(Some(range)),
         Self::Read { ref range, .. } => Some(range),
         _ => None,
      }
   }

   #[must_use]
   pub fn is_interrupted(&self) -> bool {
      matches!(self.root(), Self::Interrupted)
   }
}

#[cfg(test)]
mod tests {
   use ranged::Position;

   use super::*;

   #[test]
   fn arity_display() {
      let exact = Error::Arity {
         name:     arcstr::literal!("cons"),
         need:     2,
         have:     1,
         variadic: false,
      };
      assert_eq!(exact.to_string(), "cons arity: need 2 arguments, given 1");

      let variadic = Error::Arity {
         name:     arcstr::literal!("max"),
         need:     1,
         have:     0,
         variadic: true,
      };
      assert_eq!(
         variadic.to_string(),
         "max arity: need at least 1 arguments, given 0"
      );
   }

   #[test]
   fn traced_nests() {
      let range = |line| {
         Range::new(
            arcstr::literal!("test.bass"),
            Position { line, column: 1 },
            Position { line, column: 4 },
         )
      };

      let error = Error::Traced {
         error: Arc::new(Error::Traced {
            error: Arc::new(Error::Interrupted),
            range: range(2),
         }),
         range: range(1),
      };

      assert!(error.is_interrupted());
      assert_eq!(error.range(), Some(&range(2)));
      assert_eq!(
         error.to_string(),
         "test.bass:1:1..1:4: test.bass:2:1..2:4: interrupted"
      );
   }
}
