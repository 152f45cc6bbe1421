// Configuration module

mod parser;
mod types;

pub use parser::{parse_config_file, parse_config_string};
pub use types::{ReactorConfig, ServerConfig};
