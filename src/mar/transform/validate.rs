use bit_vec::BitVec;
use syn::visit::{self, Visit};
use syn::{Item, Macro};

use super::pass::MarPass;
use crate::error::{Error, Result};
use crate::mar::extract::is_placeholder_macro;
use crate::mar::indexed_vec::Idx;
use crate::mar::repr::*;

/// Checks the structural invariants later stages rely on.
#[derive(Debug, Default)]
pub struct Validate;

impl MarPass for Validate {
    fn name(&self) -> &'static str {
        "Validate"
    }

    fn run_pass(&mut self, mar: &mut Mar) -> Result<()> {
        let num_blocks = mar.basic_blocks.len();
        let mut points_seen = BitVec::from_elem(mar.suspension_points.len(), false);

        for (bb, block) in mar.basic_blocks.iter_enumerated() {
            let terminator = match &block.terminator {
                Some(terminator) => terminator,
                None => {
                    return Err(Error::internal(
                        block.span,
                        format!("block {:?} has no terminator", bb),
                    ));
                }
            };

            for statement in &block.statements {
                if leaks_placeholder(statement) {
                    return Err(Error::internal(
                        statement.span,
                        format!("block {:?} copies a suspension point verbatim", bb),
                    ));
                }
            }

            if terminator.operands().iter().any(|operand| {
                let mut finder = FindPlaceholder(false);
                finder.visit_expr(&operand.expr);
                finder.0
            }) {
                return Err(Error::internal(
                    terminator.span,
                    format!("block {:?} terminator reads a suspension point", bb),
                ));
            }

            for succ in terminator.successors() {
                if succ.index() >= num_blocks {
                    return Err(Error::internal(
                        terminator.span,
                        format!(
                            "block {:?} terminator does not exist: {:?} len: {:?}",
                            bb, succ, num_blocks
                        ),
                    ));
                }
            }

            let point = match terminator.kind {
                TerminatorKind::Await { point, destination, .. } => {
                    if destination.index() >= mar.local_decls.len() {
                        return Err(Error::internal(
                            terminator.span,
                            format!("block {:?} awaits into undeclared {:?}", bb, destination),
                        ));
                    }
                    point
                }
                TerminatorKind::Yield { point, .. } => point,
                _ => continue,
            };

            match points_seen.get(point.index()) {
                Some(false) => points_seen.set(point.index(), true),
                Some(true) => {
                    return Err(Error::internal(
                        terminator.span,
                        format!("suspension point {} is reached from two blocks", point),
                    ));
                }
                None => {
                    return Err(Error::internal(
                        terminator.span,
                        format!("unknown suspension point {}", point),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// A placeholder left in a statement means its suspension was never lowered.
fn leaks_placeholder(statement: &Statement) -> bool {
    let mut finder = FindPlaceholder(false);
    match &statement.kind {
        StatementKind::Expr(stmt) => finder.visit_stmt(stmt),
        StatementKind::Let { init, diverge, .. } => {
            init.iter().chain(diverge).for_each(|expr| finder.visit_expr(expr));
        }
        StatementKind::Declare { .. } => {}
        StatementKind::Assign { value, .. } => finder.visit_expr(value),
    }
    finder.0
}

struct FindPlaceholder(bool);

impl<'ast> Visit<'ast> for FindPlaceholder {
    fn visit_macro(&mut self, mac: &'ast Macro) {
        if is_placeholder_macro(mac) {
            self.0 = true;
        }
        visit::visit_macro(self, mac);
    }

    fn visit_item(&mut self, _item: &'ast Item) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mar::test_util::*;

    #[test]
    fn test_well_formed() {
        let mut mar = mar_from_edges(&[&[1, 2], &[2], &[]]);
        assert!(Validate.run_pass(&mut mar).is_ok());
    }

    #[test]
    fn test_dangling_edge() {
        let mut mar = mar_from_edges(&[&[5]]);
        let err = Validate.run_pass(&mut mar).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_verbatim_placeholder() {
        let mut mar = mar_from_edges(&[&[]]);
        push_stmt(&mut mar, START_BLOCK, syn::parse_quote!(__stateful_suspend!(0);));
        let err = Validate.run_pass(&mut mar).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("copies a suspension point verbatim"), "{}", err);

        let mut mar = mar_from_edges(&[&[]]);
        push_stmt(&mut mar, START_BLOCK, syn::parse_quote!(println!("{}", 1);));
        assert!(Validate.run_pass(&mut mar).is_ok());
    }

    #[test]
    fn test_missing_terminator() {
        let mut mar = mar_from_edges(&[&[1], &[]]);
        mar.basic_blocks[BasicBlock::new(1)].terminator = None;
        let err = Validate.run_pass(&mut mar).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
