pub mod connection_settings;

pub use connection_settings::ConnectionSettings;
