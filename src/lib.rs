// Configuration loading (TOML + environment)
pub mod config;

// Persistent OAuth credential
pub mod credentials;

// Authorization code flow and token endpoint client
pub mod oauth;

// Credential lifecycle (validate, refresh, re-authorize)
pub mod auth;
