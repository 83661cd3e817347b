mod edge;
mod listing;
mod profile;
mod status;

pub use edge::*;
pub use listing::*;
pub use profile::*;
pub use status::*;
