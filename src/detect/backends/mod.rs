pub mod contrast;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use contrast::ContrastBackend;
pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
