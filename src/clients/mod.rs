pub mod geocoding;
pub mod sigv4;
pub mod storage;
