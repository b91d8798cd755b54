pub mod dispatch;
pub mod queue;
pub mod speech;
pub mod storage;
