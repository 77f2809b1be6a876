//! Camera session lifecycle and mode arbitration.

mod controller;


pub use controller::{SessionController, SessionMode, SessionState, StartInfo};
