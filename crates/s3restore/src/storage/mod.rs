pub mod scratch;

pub use scratch::ScratchDir;
