pub mod cursor;
mod display;
pub mod layout;
pub mod ndbox;

pub use cursor::{Cursor, IndexIter, OffsetIter, ValueIter};
pub use layout::{Dims, MAX_RANK};
pub use ndbox::NdBox;
