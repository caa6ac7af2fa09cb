mod servers;

pub use servers::{cmd_server_add, cmd_server_command, cmd_server_list, cmd_server_remove};
