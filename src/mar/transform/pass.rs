use crate::error::Result;
use crate::mar::repr::Mar;

/// A rewrite of the graph of one function.
pub trait MarPass {
    fn name(&self) -> &'static str;

    fn run_pass(&mut self, mar: &mut Mar) -> Result<()>;
}
