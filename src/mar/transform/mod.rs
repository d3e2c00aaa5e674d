pub mod pass;
pub mod pass_manager;
pub mod remove_dead_blocks;
pub mod simplify_cfg;
pub mod validate;

pub use self::pass::MarPass;
pub use self::pass_manager::PassManager;
pub use self::remove_dead_blocks::RemoveDeadBlocks;
pub use self::simplify_cfg::SimplifyCfg;
pub use self::validate::Validate;
