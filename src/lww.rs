//! Last-writer-wins register.
//!
//! Precedence on `set(value, lamport, writer)`: accept iff
//! `(lamport, writer) > (current.lamport, current.writer)` lexicographically
//! — ties broken by `writer` ascending. This is the deterministic
//! convergence rule: any two replicas that observe the same set of
//! `set` calls converge to the same value regardless of application order.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LWWRegister<V, W: Ord> {
    value: Option<V>,
    lamport: u64,
    writer: Option<W>,
}

impl<V, W: Ord + Clone> Default for LWWRegister<V, W> {
    fn default() -> Self {
        Self {
            value: None,
            lamport: 0,
            writer: None,
        }
    }
}

impl<V: Clone, W: Ord + Clone> LWWRegister<V, W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a candidate write, accepting it only if it causally
    /// dominates the current value under `(lamport, writer)` order.
    pub fn set(&mut self, value: V, lamport: u64, writer: W) {
        let accept = match &self.writer {
            None => true,
            Some(current_writer) => {
                (lamport, &writer) > (self.lamport, current_writer)
            }
        };
        if accept {
            self.value = Some(value);
            self.lamport = lamport;
            self.writer = Some(writer);
        }
    }

    pub fn get(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    pub fn writer(&self) -> Option<&W> {
        self.writer.as_ref()
    }

    /// Merges another register's write into this one using the same
    /// precedence rule as `set`.
    pub fn merge(&mut self, other: &Self)
    where
        V: Clone,
    {
        if let (Some(value), Some(writer)) = (other.value.clone(), other.writer.clone()) {
            self.set(value, other.lamport, writer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_lamport_wins() {
        let mut reg: LWWRegister<i32, &str> = LWWRegister::new();
        reg.set(1, 5, "alice");
        reg.set(2, 7, "bob");
        assert_eq!(reg.get(), Some(&2));
        reg.set(3, 6, "carol");
        assert_eq!(reg.get(), Some(&2), "stale write must not overwrite");
    }

    #[test]
    fn tie_broken_by_writer_ascending() {
        let mut reg: LWWRegister<i32, &str> = LWWRegister::new();
        reg.set(1, 5, "bob");
        reg.set(2, 5, "alice");
        assert_eq!(reg.get(), Some(&1), "alice < bob loses the tie");
        reg.set(3, 5, "zeta");
        assert_eq!(reg.get(), Some(&3), "zeta > bob wins the tie");
    }

    #[test]
    fn merge_is_order_independent() {
        let mut a: LWWRegister<i32, &str> = LWWRegister::new();
        a.set(1, 3, "alice");
        let mut b: LWWRegister<i32, &str> = LWWRegister::new();
        b.set(2, 4, "bob");

        let mut merged_ab = a.clone();
        merged_ab.merge(&b);
        let mut merged_ba = b.clone();
        merged_ba.merge(&a);
        assert_eq!(merged_ab, merged_ba);
        assert_eq!(merged_ab.get(), Some(&2));
    }
}
