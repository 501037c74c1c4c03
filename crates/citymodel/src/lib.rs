pub mod boundaries;
pub mod merge;
pub mod model;
pub mod prune;

pub use merge::*;
pub use model::*;
pub use prune::*;
