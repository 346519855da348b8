pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubGateway;

#[cfg(feature = "backend-tract")]
pub use tract::TractGateway;
