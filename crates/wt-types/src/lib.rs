pub mod combination;
pub mod errors;
pub mod export;
pub mod period;
pub mod result;
pub mod space;
pub mod task;

pub use combination::*;
pub use errors::*;
pub use export::*;
pub use period::*;
pub use result::*;
pub use space::*;
pub use task::*;
