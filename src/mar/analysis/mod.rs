//! Dataflow over the lowered graph: which locals are live, which are
//! definitely initialized, and from those, what each suspension point has
//! to keep.

use bit_vec::BitVec;

use crate::mar::indexed_vec::Idx;
use crate::mar::repr::*;

pub mod capture;
pub mod init;
pub mod liveness;

pub use self::capture::{Capture, CaptureKind, CaptureSet};
pub use self::init::Initialization;
pub use self::liveness::Liveness;

/// A set of locals, indexed by `Local`.
pub type LocalSet = BitVec;

pub fn empty_set(mar: &Mar) -> LocalSet {
    BitVec::from_elem(mar.local_decls.len(), false)
}

pub fn full_set(mar: &Mar) -> LocalSet {
    BitVec::from_elem(mar.local_decls.len(), true)
}

pub fn insert_all(set: &mut LocalSet, locals: &[Local]) {
    for local in locals {
        set.set(local.index(), true);
    }
}

pub fn remove_all(set: &mut LocalSet, locals: &[Local]) {
    for local in locals {
        set.set(local.index(), false);
    }
}

pub fn contains(set: &LocalSet, local: Local) -> bool {
    set.get(local.index()).unwrap_or(false)
}

/// The members of `set`, in index order.
pub fn locals_of(set: &LocalSet) -> Vec<Local> {
    set.iter()
        .enumerate()
        .filter(|(_, member)| *member)
        .map(|(index, _)| Local::new(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mar::test_util::mar_from_edges;

    #[test]
    fn test_set_helpers() {
        let mut mar = mar_from_edges(&[&[]]);
        for name in ["a", "b", "c"] {
            mar.local_decls.push(LocalDecl::new(
                syn::Ident::new(name, proc_macro2::Span::call_site()),
                Mutability::Not,
                LocalKind::Var,
            ));
        }

        let mut set = empty_set(&mar);
        insert_all(&mut set, &[Local::new(2), Local::new(0)]);
        assert_eq!(locals_of(&set), vec![Local::new(0), Local::new(2)]);

        remove_all(&mut set, &[Local::new(0)]);
        assert!(!contains(&set, Local::new(0)));
        assert!(contains(&set, Local::new(2)));
        assert_eq!(locals_of(&full_set(&mar)).len(), 3);
    }
}
