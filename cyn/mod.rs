//! Error chains for binaries.
//!
//! A [`Chain`] is a persistent list of displayable links, the outermost
//! context first. Libraries return their own error types and binaries attach
//! context with [`ResultExt`] and [`OptionExt`] before handing the chain to a
//! [`Termination`].

use std::{
   fmt,
   io::{
      self,
      Write as _,
   },
   process,
   result,
};

use yansi::Paint as _;

/// Creates a [`Chain`] from the provided format arguments.
///
/// # Example
///
/// ```rs
/// fn get_result() -> Result<()> {
///   Err(chain!("can't get the result"))
/// }
/// ```
#[macro_export]
macro_rules! chain {
   ($($t:tt)*) => {
      $crate::Chain::new().push_front_display(format!($($t)*))
   };
}

/// A macro that boils down to:
///
/// ```rs
/// return Err(chain!(arguments));
/// ```
#[macro_export]
macro_rules! bail {
   ($($t:tt)*) => {
      return Err($crate::chain!($($t)*).into())
   };
}

/// A type alias for concise use of [`Chain`] with [`Result`](result::Result).
pub type Result<T> = result::Result<T, Chain>;

/// Anything that can become a link.
pub trait StdDisplay: fmt::Display + Send + Sync + 'static {}

impl<T: fmt::Display + Send + Sync + 'static> StdDisplay for T {}

type Link = Box<dyn StdDisplay>;

/// A chain.
#[derive(Clone)]
pub struct Chain(rpds::ListSync<Link>);

impl fmt::Debug for Chain {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      writer
         .debug_list()
         .entries(self.0.iter().map(ToString::to_string))
         .finish()
   }
}

impl Default for Chain {
   fn default() -> Self {
      Self::new()
   }
}

impl Chain {
   #[must_use]
   pub fn new() -> Self {
      Self(rpds::List::new_sync())
   }

   #[must_use]
   pub fn push_front_display(&self, display: impl StdDisplay) -> Self {
      Self(self.0.push_front(Box::new(display)))
   }

   /// Joins every link, outermost first, with `": "`.
   #[must_use]
   pub fn joined(&self) -> String {
      let mut joined = String::new();

      let mut links = self.0.iter().peekable();
      while let Some(link) = links.next() {
         joined.push_str(&link.to_string());

         if links.peek().is_some() {
            joined.push_str(": ");
         }
      }

      joined
   }

   /// The outermost link, if any.
   #[must_use]
   pub fn first(&self) -> Option<String> {
      self.0.first().map(ToString::to_string)
   }

   /// Writes the chain, root cause first, with a coloured header per link.
   pub fn write_styled(&self, writer: &mut dyn io::Write) -> io::Result<()> {
      let reverse = self.0.reverse();
      let mut links = reverse.iter().peekable();

      while let Some(link) = links.next() {
         let header = if links.peek().is_none() {
            "error:"
         } else {
            "cause:"
         };

         let string = link.to_string();
         let mut chars = string.char_indices();

         write!(writer, "{header} ", header = header.red().bold())?;

         if let Some((_, first)) = chars.next()
            && let Some((second_start, second)) = chars.next()
            && second.is_lowercase()
         {
            writeln!(
               writer,
               "{first_lowercase}{rest}",
               first_lowercase = first.to_lowercase(),
               rest = &string[second_start..],
            )?;
         } else {
            writeln!(writer, "{string}")?;
         }
      }

      Ok(())
   }
}

pub trait OptionExt<T> {
   fn ok_or_chain(self, display: impl StdDisplay) -> Result<T>;

   fn ok_or_chain_with<D: StdDisplay>(self, display: impl FnOnce() -> D) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
   fn ok_or_chain(self, display: impl StdDisplay) -> Result<T> {
      self.ok_or_else(|| Chain::new().push_front_display(display))
   }

   fn ok_or_chain_with<D: StdDisplay>(self, display: impl FnOnce() -> D) -> Result<T> {
      self.ok_or_else(|| Chain::new().push_front_display(display()))
   }
}

pub trait ResultExt<T> {
   fn chain_err(self, display: impl StdDisplay) -> Result<T>;

   fn chain_err_with<D: StdDisplay>(self, display: impl FnOnce() -> D) -> Result<T>;
}

impl<T, E: StdDisplay> ResultExt<T> for result::Result<T, E> {
   fn chain_err(self, display: impl StdDisplay) -> Result<T> {
      self.map_err(|exist| {
         Chain::new()
            .push_front_display(exist)
            .push_front_display(display)
      })
   }

   fn chain_err_with<D: StdDisplay>(self, display: impl FnOnce() -> D) -> Result<T> {
      self.map_err(|exist| {
         Chain::new()
            .push_front_display(exist)
            .push_front_display(display())
      })
   }
}

impl<T> ResultExt<T> for Result<T> {
   fn chain_err(self, display: impl StdDisplay) -> Result<T> {
      self.map_err(|chain| chain.push_front_display(display))
   }

   fn chain_err_with<D: StdDisplay>(self, display: impl FnOnce() -> D) -> Result<T> {
      self.map_err(|chain| chain.push_front_display(display()))
   }
}

/// The termination type. Meant to be used as the return type of the main
/// function.
///
/// Will pretty print the chain to stderr and exit with the stored code.
#[derive(Debug, Clone)]
pub struct Termination {
   result: result::Result<(), Chain>,
   code:   u8,
}

impl From<Result<()>> for Termination {
   fn from(result: Result<()>) -> Self {
      match result {
         Ok(()) => Self::success(),
         Err(chain) => Self::error(chain),
      }
   }
}

impl From<Chain> for Termination {
   fn from(chain: Chain) -> Self {
      Self::error(chain)
   }
}

impl process::Termination for Termination {
   fn report(self) -> process::ExitCode {
      match self.result {
         Ok(()) => process::ExitCode::from(self.code),

         Err(chain) => {
            let writer = &mut io::stderr().lock();
            let _ = chain.write_styled(writer);
            let _ = writer.flush();
            process::ExitCode::from(self.code)
         },
      }
   }
}

impl Termination {
   /// Creates a successful [`Termination`] that returns success.
   #[must_use]
   pub fn success() -> Self {
      Self {
         result: Ok(()),
         code:   0,
      }
   }

   /// Creates a [`Termination`] from the provided [`Chain`].
   #[must_use]
   pub fn error(chain: Chain) -> Self {
      Self {
         result: Err(chain),
         code:   1,
      }
   }

   /// Exits silently with the given code.
   #[must_use]
   pub fn code(code: u8) -> Self {
      Self {
         result: Ok(()),
         code,
      }
   }

   #[must_use]
   pub fn is_success(&self) -> bool {
      self.result.is_ok() && self.code == 0
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn chain_displays_outermost_first() {
      let chain = chain!("root cause")
         .push_front_display("middle")
         .push_front_display("outer");

      assert_eq!(chain.joined(), "outer: middle: root cause");
      assert_eq!(chain.first().as_deref(), Some("outer"));
   }

   #[test]
   fn result_ext_wraps_foreign_errors() {
      let result: result::Result<(), &str> = Err("disk on fire");

      let chain = result.chain_err("failed to write").unwrap_err();
      assert_eq!(chain.joined(), "failed to write: disk on fire");
   }

   #[test]
   fn result_ext_pushes_onto_existing_chain() {
      let result: Result<()> = Err(chain!("inner"));

      let chain = result
         .chain_err_with(|| format!("outer {n}", n = 1))
         .unwrap_err();
      assert_eq!(chain.joined(), "outer 1: inner");
   }

   #[test]
   fn option_ext() {
      let none: Option<u8> = None;

      assert_eq!(none.ok_or_chain("missing").unwrap_err().joined(), "missing");
      assert_eq!(Some(3).ok_or_chain_with(|| "unused").unwrap(), 3);
   }

   #[test]
   fn bail_returns_early() {
      fn check(fail: bool) -> Result<u8> {
         if fail {
            bail!("failed with {code}", code = 7);
         }

         Ok(1)
      }

      assert_eq!(check(false).unwrap(), 1);
      assert_eq!(check(true).unwrap_err().joined(), "failed with 7");
   }

   #[test]
   fn styled_output_lists_root_cause_first() {
      yansi::disable();

      let chain = chain!("root").push_front_display("outer");

      let mut out = Vec::new();
      chain.write_styled(&mut out).unwrap();

      assert_eq!(String::from_utf8(out).unwrap(), "cause: root\nerror: outer\n");
   }

   #[test]
   fn termination_success() {
      assert!(Termination::from(Ok(())).is_success());
      assert!(!Termination::from(chain!("nope")).is_success());
      assert!(!Termination::code(2).is_success());
   }
}
