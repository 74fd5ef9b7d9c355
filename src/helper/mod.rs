pub mod builder;
pub mod env;

pub use builder::{build_helper_spec, HELPER_CAPABILITIES};
pub use env::EnvBuilder;
