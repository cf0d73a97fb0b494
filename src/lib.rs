pub mod emit;
pub mod identity;
pub mod logging;
pub mod naming;
pub mod overlay;
pub mod pragma;
pub mod preprocess;
pub mod resolve;
pub mod session;
