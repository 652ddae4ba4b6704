pub mod channels;
pub mod encoding;
pub mod health;
pub mod logos;
pub mod progress;
pub mod proxies;
pub mod rules;
pub mod sources;
