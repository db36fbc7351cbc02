//! Small standalone helpers with no module of their own.

/// A `u32` identity for the current OS thread, derived by hashing
/// `std::thread::ThreadId` (which has no stable numeric representation).
/// Ported verbatim from the donor's `ttlog/src/utils/mod.rs`.
pub fn current_thread_id_u32() -> u32 {
  use std::collections::hash_map::DefaultHasher;
  use std::hash::{Hash, Hasher};
  let mut hasher = DefaultHasher::new();
  std::thread::current().id().hash(&mut hasher);
  hasher.finish() as u32
}

#[cfg(test)]
mod __test__ {
  use super::*;

  #[test]
  fn current_thread_id_is_stable_within_a_thread() {
    assert_eq!(current_thread_id_u32(), current_thread_id_u32());
  }
}
