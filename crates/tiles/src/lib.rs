pub mod fetch;
pub mod page;
pub mod sources;

pub use fetch::*;
pub use page::*;
pub use sources::*;
