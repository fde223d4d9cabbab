pub mod assets;
pub mod dispatch;
pub mod health;
pub mod integrations;
pub mod scheduler;
pub mod settings;
pub mod substrate;
pub mod terminal;

#[cfg(test)]
pub mod testing;
