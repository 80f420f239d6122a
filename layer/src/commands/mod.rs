pub mod cat;
pub mod list;

pub use cat::run as cat;
pub use list::run as list;
