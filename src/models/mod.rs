pub mod playlist;
pub mod task;
pub mod track;

pub use playlist::*;
pub use task::*;
pub use track::*;
