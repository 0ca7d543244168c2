pub mod exports;
pub mod generate;
pub mod init;
pub mod lifecycle;
pub mod list;
pub mod purge;
pub mod revise;
pub mod round;
pub mod session;
pub mod status;
