pub mod prelude;

pub mod servers;
pub mod users;
