use std::{
   fmt,
   sync::{
      Arc,
      RwLock,
      RwLockReadGuard,
      RwLockWriteGuard,
      PoisonError,
      atomic::{
         AtomicBool,
         Ordering,
      },
   },
};

use arcstr::ArcStr;
use indexmap::IndexMap;
use ranged::Range;
use rustc_hash::{
   FxBuildHasher,
   FxHashSet,
};

use crate::value::{
   Symbol,
   Value,
};

type Bindings = IndexMap<Symbol, Value, FxBuildHasher>;

#[derive(Default)]
struct State {
   bindings:   Bindings,
   meta:       IndexMap<Symbol, Scope, FxBuildHasher>,
   commentary: Vec<ArcStr>,
}

struct Inner {
   name:    Option<ArcStr>,
   parents: Vec<Scope>,
   state:   RwLock<State>,
   frozen:  AtomicBool,
}

/// An environment: ordered bindings plus an ordered list of parents.
///
/// Parents are fixed at construction, so the parent graph can not contain a
/// cycle. Values bound in a scope may still refer back to it.
#[derive(Clone)]
pub struct Scope(Arc<Inner>);

impl fmt::Debug for Scope {
   fn fmt(&self, writer: &mut fmt::Formatter<'_>) -> fmt::Result {
      fmt::Display::fmt(&Value::Scope(self.clone()), writer)
   }
}

impl PartialEq for Scope {
   fn eq(&self, other: &Self) -> bool {
      self.equals(other, &mut Vec::new())
   }
}

impl Scope {
   /// Creates an empty scope. Duplicate parents are dropped, keeping the
   /// first occurrence.
   #[must_use]
   pub fn new(parents: impl IntoIterator<Item = Self>) -> Self {
      Self::build(None, parents)
   }

   #[must_use]
   pub fn named(name: impl Into<ArcStr>, parents: impl IntoIterator<Item = Self>) -> Self {
      Self::build(Some(name.into()), parents)
   }

   fn build(name: Option<ArcStr>, parents: impl IntoIterator<Item = Self>) -> Self {
      let mut seen = FxHashSet::default();

      let parents = parents
         .into_iter()
         .filter(|parent| seen.insert(parent.id()))
         .collect();

      Self(Arc::new(Inner {
         name,
         parents,
         state: RwLock::default(),
         frozen: AtomicBool::new(false),
      }))
   }

   fn read(&self) -> RwLockReadGuard<'_, State> {
      self.0.state.read().unwrap_or_else(PoisonError::into_inner)
   }

   fn write(&self) -> RwLockWriteGuard<'_, State> {
      debug_assert!(
         !self.0.frozen.load(Ordering::Relaxed),
         "wrote to frozen scope {name:?}",
         name = self.0.name,
      );

      self.0.state.write().unwrap_or_else(PoisonError::into_inner)
   }

   /// Identity of the scope, stable for its lifetime.
   #[must_use]
   pub fn id(&self) -> usize {
      Arc::as_ptr(&self.0) as usize
   }

   #[must_use]
   pub fn name(&self) -> Option<&ArcStr> {
      self.0.name.as_ref()
   }

   #[must_use]
   pub fn parents(&self) -> &[Self] {
      &self.0.parents
   }

   /// Marks the scope as read only. Writing to it afterwards is a bug and
   /// asserts in debug builds.
   pub fn freeze(&self) {
      self.0.frozen.store(true, Ordering::Relaxed);
   }

   /// Whether this scope or any of its ancestors is the other scope.
   #[must_use]
   pub fn descends_from(&self, other: &Self) -> bool {
      let mut visited = FxHashSet::default();
      self.descends_from_guarded(other, &mut visited)
   }

   fn descends_from_guarded(&self, other: &Self, visited: &mut FxHashSet<usize>) -> bool {
      if self.id() == other.id() {
         return true;
      }

      if !visited.insert(self.id()) {
         return false;
      }

      self
         .parents()
         .iter()
         .any(|parent| parent.descends_from_guarded(other, visited))
   }

   /// Looks a binding up, walking parents depth first in order.
   #[must_use]
   pub fn get(&self, name: &str) -> Option<Value> {
      let mut visited = FxHashSet::default();
      self.get_guarded(name, &mut visited)
   }

   fn get_guarded(&self, name: &str, visited: &mut FxHashSet<usize>) -> Option<Value> {
      if !visited.insert(self.id()) {
         return None;
      }

      if let Some(value) = self.read().bindings.get(name) {
         return Some(value.clone());
      }

      self
         .parents()
         .iter()
         .find_map(|parent| parent.get_guarded(name, visited))
   }

   #[must_use]
   pub fn has_local(&self, name: &str) -> bool {
      self.read().bindings.contains_key(name)
   }

   /// Binds in this scope, never in a parent.
   pub fn set(&self, name: impl Into<Symbol>, value: Value) {
      self.write().bindings.insert(name.into(), value);
   }

   /// Local bindings, in insertion order.
   #[must_use]
   pub fn bindings(&self) -> Vec<(Symbol, Value)> {
      self
         .read()
         .bindings
         .iter()
         .map(|(name, value)| (name.clone(), value.clone()))
         .collect()
   }

   /// Calls the function with each local binding, in insertion order. Stops
   /// at the first error.
   pub fn each<E>(&self, mut function: impl FnMut(&Symbol, &Value) -> Result<(), E>) -> Result<(), E> {
      for (name, value) in self.bindings() {
         function(&name, &value)?;
      }

      Ok(())
   }

   /// Every binding reachable from this scope whose name starts with the
   /// prefix. Shadowed bindings are skipped.
   #[must_use]
   pub fn complete(&self, prefix: &str) -> Vec<(Symbol, Value)> {
      let mut visited = FxHashSet::default();
      let mut seen = FxHashSet::default();
      let mut completions = Vec::new();

      self.complete_guarded(prefix, &mut visited, &mut seen, &mut completions);

      completions
   }

   fn complete_guarded(
      &self,
      prefix: &str,
      visited: &mut FxHashSet<usize>,
      seen: &mut FxHashSet<Symbol>,
      completions: &mut Vec<(Symbol, Value)>,
   ) {
      if !visited.insert(self.id()) {
         return;
      }

      for (name, value) in self.bindings() {
         if name.starts_with(prefix) && seen.insert(name.clone()) {
            completions.push((name, value));
         }
      }

      for parent in self.parents() {
         parent.complete_guarded(prefix, visited, seen, completions);
      }
   }

   /// The metadata recorded for a binding, searching parents too.
   #[must_use]
   pub fn meta(&self, name: &str) -> Option<Self> {
      if let Some(meta) = self.read().meta.get(name) {
         return Some(meta.clone());
      }

      self.parents().iter().find_map(|parent| parent.meta(name))
   }

   pub fn set_meta(&self, name: impl Into<Symbol>, meta: Self) {
      self.write().meta.insert(name.into(), meta);
   }

   /// Documents a binding with a comment and the range it was defined at.
   pub fn set_doc(&self, name: &str, doc: ArcStr, range: Option<&Range>) {
      self.annotate(name, Some(doc), range);
   }

   /// Records where a binding was defined, and its comment if it has one.
   /// Does nothing when there is neither.
   pub fn annotate(&self, name: &str, doc: Option<ArcStr>, range: Option<&Range>) {
      if doc.is_none() && range.is_none() {
         return;
      }

      let meta = Self::new([]);

      if let Some(doc) = doc {
         meta.set("doc", Value::String(doc));
      }

      if let Some(range) = range {
         meta.set("file", Value::String(range.file.clone()));
         meta.set("line", Value::Int(range.start.line.into()));
         meta.set("column", Value::Int(range.start.column.into()));
      }

      self.set_meta(name, meta);
   }

   #[must_use]
   pub fn doc(&self, name: &str) -> Option<ArcStr> {
      match self.meta(name)?.get("doc")? {
         Value::String(doc) => Some(doc),
         _ => None,
      }
   }

   /// Records a standalone comment.
   pub fn comment(&self, comment: ArcStr) {
      self.write().commentary.push(comment);
   }

   #[must_use]
   pub fn commentary(&self) -> Vec<ArcStr> {
      self.read().commentary.clone()
   }

   pub(crate) fn equals(&self, other: &Self, visited: &mut Vec<(usize, usize)>) -> bool {
      if self.id() == other.id() {
         return true;
      }

      let key = (self.id(), other.id());
      if visited.contains(&key) {
         return true;
      }
      visited.push(key);

      let (this, that) = (self.bindings(), other.bindings());

      this.len() == that.len()
         && this.iter().all(|(name, value)| {
            that
               .iter()
               .find(|&(other, _)| other == name)
               .is_some_and(|(_, other)| value.equals(other, visited))
         })
         && self.parents().len() == other.parents().len()
         && self
            .parents()
            .iter()
            .zip(other.parents())
            .all(|(this, that)| this.equals(that, visited))
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn lookup_is_depth_first_in_parent_order() {
      let grandparent = Scope::new([]);
      grandparent.set("k", Value::Int(0));

      let first = Scope::new([grandparent]);
      let second = Scope::new([]);
      second.set("k", Value::Int(2));

      let child = Scope::new([first, second]);
      assert_eq!(child.get("k"), Some(Value::Int(0)));
      assert_eq!(child.get("missing"), None);
   }

   #[test]
   fn set_never_writes_to_parents() {
      let parent = Scope::new([]);
      parent.set("a", Value::Int(1));

      let child = Scope::new([parent.clone()]);
      child.set("a", Value::Int(2));

      assert_eq!(parent.get("a"), Some(Value::Int(1)));
      assert_eq!(child.get("a"), Some(Value::Int(2)));
   }

   #[test]
   fn parents_are_deduplicated() {
      let parent = Scope::new([]);
      let child = Scope::new([parent.clone(), parent.clone()]);

      assert_eq!(child.parents().len(), 1);
      assert!(child.descends_from(&parent));
      assert!(!parent.descends_from(&child));
   }

   #[test]
   fn bindings_keep_insertion_order() {
      let scope = Scope::new([]);
      scope.set("b", Value::Int(1));
      scope.set("a", Value::Int(2));
      scope.set("b", Value::Int(3));

      let names = scope
         .bindings()
         .into_iter()
         .map(|(name, _)| name.to_string())
         .collect::<Vec<_>>();

      assert_eq!(names, ["b", "a"]);
   }

   #[test]
   fn complete_skips_shadowed() {
      let parent = Scope::new([]);
      parent.set("foo", Value::Int(1));
      parent.set("bar", Value::Int(1));

      let child = Scope::new([parent]);
      child.set("foo", Value::Int(2));
      child.set("food", Value::Int(3));

      let completions = child.complete("foo");
      assert_eq!(completions, [
         (ArcStr::from("foo"), Value::Int(2)),
         (ArcStr::from("food"), Value::Int(3)),
      ]);
   }

   #[test]
   fn docs_and_commentary() {
      let scope = Scope::new([]);
      scope.set("x", Value::Int(1));
      scope.set_doc("x", "the x".into(), None);
      scope.comment("a section".into());

      let child = Scope::new([scope.clone()]);
      assert_eq!(child.doc("x").as_deref(), Some("the x"));
      assert_eq!(scope.commentary(), [ArcStr::from("a section")]);
   }

   #[test]
   fn equality_is_structural() {
      let this = Scope::new([]);
      this.set("a", Value::Int(1));
      this.set("b", Value::Int(2));

      let that = Scope::new([]);
      that.set("b", Value::Int(2));
      that.set("a", Value::Int(1));

      assert_eq!(this, that);

      that.set("c", Value::Null);
      assert_ne!(this, that);
   }
}
