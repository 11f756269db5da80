pub mod audit;
pub mod init;
pub mod policy;
pub mod run;
