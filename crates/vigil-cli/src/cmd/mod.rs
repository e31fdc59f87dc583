pub mod action;
pub mod approve;
pub mod goal;
pub mod init;
pub mod run;
pub mod status;
