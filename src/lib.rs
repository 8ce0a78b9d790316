pub mod config;
pub mod error;
pub mod events;
pub mod gallery;
pub mod gesture;
pub mod presenter;
pub mod tasks {
    pub mod loader;
}
