pub mod hrv;
pub mod rsa;
pub mod sqi;
