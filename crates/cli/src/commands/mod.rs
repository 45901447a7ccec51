pub mod build;
pub mod corpus;
pub mod extract;
pub mod progress;
pub mod toolchains;
pub mod util;
pub mod verify;

pub use build::*;
pub use corpus::*;
pub use extract::*;
pub use progress::*;
pub use toolchains::*;
pub use util::*;
pub use verify::*;
