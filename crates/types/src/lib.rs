pub mod event;
pub mod pool;
pub mod record;
pub mod scalars;
pub mod usage;

pub use event::*;
pub use pool::*;
pub use record::*;
pub use scalars::*;
pub use usage::*;
