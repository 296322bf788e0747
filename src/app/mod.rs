// Application layer - Use case interactors

pub mod compress_interactor;
pub mod container;
pub mod fallback_controller;

// Re-export interactors
pub use compress_interactor::CompressInteractor;
pub use container::{AppContainer, BackendStatus, DefaultAppContainer};
pub use fallback_controller::{FallbackController, FallbackReport};
