pub mod interval;
pub mod watch;
