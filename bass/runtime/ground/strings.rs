use arcstr::ArcStr;

use super::func;
use crate::{
   Error,
   Scope,
   Value,
   value::{
      CommandPath,
      DirPath,
      FileOrDirPath,
      FilePath,
      path::SEPARATOR,
   },
};

fn symbol_name(value: &Value) -> crate::Result<ArcStr> {
   match *value.bare() {
      Value::Symbol(ref name) | Value::Keyword(ref name) => Ok(name.clone()),
      ref other => {
         Err(Error::Decode {
            value: other.to_string(),
            have:  other.type_name(),
            need:  "symbol",
         })
      },
   }
}

/// `dir/` is a directory, anything else a file.
fn parse_file_or_dir(string: &str) -> FileOrDirPath {
   match string.strip_suffix(SEPARATOR) {
      Some(dir) => FileOrDirPath::Dir(DirPath::new(dir)),
      None => FileOrDirPath::File(FilePath::new(string)),
   }
}

/// The last component of a path.
fn base_name(path: &str) -> &str {
   let path = path.trim_end_matches(SEPARATOR);
   path.rsplit(SEPARATOR).next().unwrap_or(path)
}

fn path_name(value: &Value) -> crate::Result<ArcStr> {
   Ok(match *value.bare() {
      Value::CommandPath(ref command) => command.name.clone(),
      Value::FilePath(ref file) => file.name().into(),
      Value::DirPath(ref dir) => base_name(&dir.path).into(),
      Value::HostPath(ref host) => base_name(host.path.path()).into(),
      Value::FsPath(ref fs) => base_name(fs.path.path()).into(),
      Value::ThunkPath(ref thunk) => base_name(thunk.path.path()).into(),
      Value::Thunk(ref thunk) => thunk.hash()?.into(),

      ref other => {
         return Err(Error::Decode {
            value: other.to_string(),
            have:  other.type_name(),
            need:  "path",
         });
      },
   })
}

pub(super) fn register(scope: &Scope) {
   func(
      scope,
      "symbol->string",
      "converts a symbol to a string",
      |args| {
         let [symbol] = args.exact::<1>()?;
         symbol_name(&symbol).map(Value::String)
      },
   );

   func(
      scope,
      "string->symbol",
      "converts a string to a symbol",
      |args| {
         let [string] = args.exact::<1>()?;
         Ok(Value::Symbol(string.decode::<ArcStr>()?))
      },
   );

   func(
      scope,
      "string->keyword",
      "converts a string to a keyword",
      |args| {
         let [string] = args.exact::<1>()?;
         Ok(Value::Keyword(string.decode::<ArcStr>()?))
      },
   );

   func(
      scope,
      "keyword->string",
      "converts a keyword to a string",
      |args| {
         let [keyword] = args.exact::<1>()?;
         symbol_name(&keyword).map(Value::String)
      },
   );

   func(
      scope,
      "str",
      "joins strings and values into one string\n\nStrings are joined as they are, other values as they display.",
      |args| {
         let mut joined = String::new();

         for value in args.all() {
            match *value.bare() {
               Value::String(ref string) => joined.push_str(string),
               ref other => joined.push_str(&other.to_string()),
            }
         }

         Ok(Value::string(joined))
      },
   );

   func(
      scope,
      "substring",
      "returns a portion of a string\n\nWith only a start offset, returns everything after it. With an end offset too, returns everything between them, excluding the end.",
      |args| {
         let ([string, start], end) = args.optional::<2>()?;
         let string = string.decode::<ArcStr>()?;
         let chars = string.chars().collect::<Vec<_>>();

         let start = start.decode::<usize>()?;
         let end = match end {
            Some(end) => end.decode::<usize>()?,
            None => chars.len(),
         };

         chars
            .get(start..end)
            .map(|chars| Value::string(chars.iter().collect::<String>()))
            .ok_or_else(|| {
               Error::message(format!(
                  "substring {start}..{end} is out of range for a string of {length} characters",
                  length = chars.len(),
               ))
            })
      },
   );

   func(
      scope,
      "trim",
      "removes whitespace from both ends of a string",
      |args| {
         let [string] = args.exact::<1>()?;
         Ok(Value::string(string.decode::<ArcStr>()?.trim()))
      },
   );

   func(
      scope,
      "scope->list",
      "returns a list alternating the keys and values of a scope\n\nThe list is what assoc takes after the scope.",
      |args| {
         let [scope] = args.exact::<1>()?;

         Ok(Value::list(
            scope
               .decode::<Scope>()?
               .bindings()
               .into_iter()
               .flat_map(|(name, value)| [Value::Keyword(name), value])
               .collect::<Vec<_>>(),
         ))
      },
   );

   func(
      scope,
      "string->fs-path",
      "parses a string into a file path, or a dir path if it ends in /",
      |args| {
         let [string] = args.exact::<1>()?;
         Ok(parse_file_or_dir(&string.decode::<ArcStr>()?).into())
      },
   );

   func(
      scope,
      "string->cmd-path",
      "converts a string to a file path if it contains a /, and to a command path otherwise",
      |args| {
         let [string] = args.exact::<1>()?;
         let string = string.decode::<ArcStr>()?;

         if !string.contains(SEPARATOR) {
            return Ok(Value::CommandPath(CommandPath { name: string }));
         }

         Ok(Value::FilePath(FilePath::new(parse_file_or_dir(&string).path().clone())))
      },
   );

   func(
      scope,
      "string->dir",
      "converts a string to a dir path, with or without a trailing /",
      |args| {
         let [string] = args.exact::<1>()?;
         let string = string.decode::<ArcStr>()?;

         Ok(Value::DirPath(DirPath::new(parse_file_or_dir(&string).path().clone())))
      },
   );

   func(
      scope,
      "subpath",
      "extends a directory path with a child path",
      |args| {
         let [parent, child] = args.exact::<2>()?;
         parent.extend(&child.decode::<FileOrDirPath>()?)
      },
   );

   func(
      scope,
      "path-name",
      "returns the last component of a path\n\nFor a command path, the command name. For a thunk, its hash.",
      |args| {
         let [path] = args.exact::<1>()?;
         path_name(&path).map(Value::String)
      },
   );
}

#[cfg(test)]
mod tests {
   use super::{
      super::tests::{
         run,
         run_ok,
      },
      *,
   };

   #[tokio::test]
   async fn conversions() {
      assert_eq!(run_ok("(symbol->string :hello!)").await, Value::string("hello!"));
      assert_eq!(run_ok(r#"(string->symbol "hello!")"#).await, Value::symbol("hello!"));
      assert_eq!(run_ok(r#"(string->keyword "a")"#).await, Value::keyword("a"));
      assert_eq!(run_ok("(keyword->string :a)").await, Value::string("a"));
   }

   #[tokio::test]
   async fn strings() {
      assert_eq!(
         run_ok(r#"(str "abc" 123 "def" :g)"#).await,
         Value::string("abc123def:g")
      );
      assert_eq!(run_ok(r#"(substring "abcdef" 2 4)"#).await, Value::string("cd"));
      assert_eq!(run_ok(r#"(substring "abcdef" 2)"#).await, Value::string("cdef"));
      assert!(run(r#"(substring "abc" 2 9)"#).await.is_err());
      assert_eq!(run_ok(r#"(trim " hello world!\n ")"#).await, Value::string("hello world!"));
   }

   #[tokio::test]
   async fn scope_lists() {
      assert_eq!(
         run_ok("(scope->list {:a 1 :b 2})").await,
         Value::list([Value::keyword("a"), Value::Int(1), Value::keyword("b"), Value::Int(2)])
      );
   }

   #[tokio::test]
   async fn paths() {
      assert_eq!(
         run_ok(r#"(string->fs-path "dir/")"#).await,
         Value::DirPath(DirPath::new("dir"))
      );
      assert_eq!(
         run_ok(r#"(string->fs-path "./file")"#).await,
         Value::FilePath(FilePath::new("./file"))
      );
      assert_eq!(
         run_ok(r#"(string->cmd-path "bash")"#).await,
         Value::CommandPath(CommandPath { name: "bash".into() })
      );
      assert_eq!(
         run_ok(r#"(string->cmd-path "scripts/foo")"#).await,
         Value::FilePath(FilePath::new("scripts/foo"))
      );
      assert_eq!(
         run_ok(r#"(string->dir "dir")"#).await,
         Value::DirPath(DirPath::new("dir"))
      );
      assert_eq!(
         run_ok("(subpath ./dir/ ./file)").await,
         Value::FilePath(FilePath::new("./dir/file"))
      );

      for (source, name) in [
         ("(path-name .bash)", "bash"),
         ("(path-name ./some/file)", "file"),
         ("(path-name ./some/dir/)", "dir"),
      ] {
         assert_eq!(run_ok(source).await, Value::string(name), "{source}");
      }
   }
}
