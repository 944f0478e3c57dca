mod build;
mod info;
mod purge;

pub use build::cmd_build;
pub use info::cmd_info;
pub use purge::cmd_purge;
