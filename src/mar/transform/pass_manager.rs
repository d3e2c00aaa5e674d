use crate::error::Result;
use crate::mar::repr::*;

use super::pass::MarPass;

pub struct PassManager {
    passes: Vec<Box<dyn MarPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        PassManager { passes: vec![] }
    }

    pub fn add_pass(&mut self, pass: Box<dyn MarPass>) {
        self.passes.push(pass);
    }

    pub fn run(&mut self, mar: &mut Mar) -> Result<()> {
        for pass in &mut self.passes {
            debug!("pass: {} on `{}` ({} blocks)", pass.name(), mar.ident, mar.basic_blocks.len());
            pass.run_pass(mar)?;
        }

        // Passes renumber blocks; the suspension table follows them.
        mar.relink_suspension_points();

        Ok(())
    }
}

impl Default for PassManager {
    fn default() -> Self {
        PassManager::new()
    }
}
