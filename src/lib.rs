pub mod mtp;
pub mod transport;

// 重导出常用模块
pub use mtp::*;
pub use transport::*;
