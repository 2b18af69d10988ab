pub mod daemon;
pub mod init;
pub mod run;
pub mod status;
