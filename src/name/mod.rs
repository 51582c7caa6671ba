mod interner;
mod name;

pub use interner::{InternedName, NameInterner};
pub use name::Name;
