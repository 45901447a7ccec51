pub mod compiler;
pub mod dataset;
pub mod digest;
pub mod extract;
pub mod labeler;
pub mod process;
pub mod sources;
pub mod toolchain;
