mod credentials;
mod entry;
mod remote;
mod transfer;

pub use credentials::*;
pub use entry::*;
pub use remote::*;
pub use transfer::*;
