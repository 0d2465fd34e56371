pub mod check;
pub mod list;
pub mod prelude;
pub mod render;
pub mod watch;
