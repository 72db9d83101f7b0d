//! Debounced key grid with LED bookkeeping

pub mod controller;
pub mod grid;
pub mod io;
pub mod key;

pub use controller::{Controller, SleepPolicy, TickReport};
pub use grid::{Grid, Rotation};
pub use io::{LedFault, LedSink, RawSwitch, OFF};
pub use key::{KeyEvent, KeyState, KeyTiming};
