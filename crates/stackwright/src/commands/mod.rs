pub mod build;
pub mod deploy;
pub mod init;
pub mod status;
pub mod transform;
