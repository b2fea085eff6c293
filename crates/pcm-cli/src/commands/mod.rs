pub mod reservoir;
pub mod run;
pub mod topology;
