mod catalog;
mod cloned_table;
mod column;
mod counter;
mod foreign_key;
mod index;
mod rule;
mod table;
mod trigger;
mod view;

pub use catalog::*;
pub use cloned_table::*;
pub use column::*;
pub use counter::*;
pub use foreign_key::*;
pub use index::*;
pub use rule::*;
pub use table::*;
pub use trigger::*;
pub use view::*;
