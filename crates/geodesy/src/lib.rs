pub mod bbox;
pub mod converter;
pub mod grid;
pub mod rdnap;
pub mod sources;

pub use bbox::*;
pub use converter::*;
pub use rdnap::*;
pub use sources::*;
