pub mod client;
pub mod settings;
pub mod util;
