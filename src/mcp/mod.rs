pub mod protocol;
pub mod server;

pub use protocol::{error_codes, Request, Response, MCP_VERSION};
pub use server::{MCPServer, Server, ToolInfo};
