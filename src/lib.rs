pub mod admin_token;
pub mod config;
pub mod domain;
pub mod fanout;
pub mod geo;
pub mod http;
pub mod key_status;
pub mod probe;
pub mod server_status;
pub mod state;
pub mod status;
pub mod uri;
pub mod version;
