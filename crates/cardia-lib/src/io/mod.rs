pub mod ecg;
pub mod events;
pub mod storage;
