pub mod clock;
pub mod line_protocol;
pub mod retry;
