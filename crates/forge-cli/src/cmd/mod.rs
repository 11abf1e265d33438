pub mod analyze;
pub mod feature;
pub mod init;
pub mod serve;
