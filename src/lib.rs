pub mod config;
pub mod core;
pub mod game;

#[cfg(test)]
pub mod test_support;
