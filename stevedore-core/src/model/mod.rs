pub mod handle;
pub mod probe;
pub mod spec;
