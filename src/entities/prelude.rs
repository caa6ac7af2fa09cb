pub use super::servers::Entity as Servers;
pub use super::users::Entity as Users;
