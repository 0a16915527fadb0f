mod format;
mod paths;
mod transfer;

pub use format::*;
pub use paths::*;
pub use transfer::*;
