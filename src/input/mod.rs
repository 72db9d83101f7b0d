pub mod keystrokes;

use crate::error::ActionFault;
use crate::layers::{Action, ConsumerCode, KeyCode};

pub use keystrokes::KeystrokeSender;

/// Host-side delivery of bound actions
pub trait ActionSink {
    /// Press `codes` in order, then release them all
    fn send_keys(&mut self, codes: &[KeyCode]) -> Result<(), ActionFault>;

    /// Type literal text
    fn write_text(&mut self, text: &str) -> Result<(), ActionFault>;

    /// Send a media / consumer control code
    fn send_consumer_code(&mut self, code: ConsumerCode) -> Result<(), ActionFault>;
}

/// Play one action through a sink
pub fn play<A>(sink: &mut A, action: &Action) -> Result<(), ActionFault>
where
    A: ActionSink + ?Sized,
{
    match action {
        Action::Key(code) => sink.send_keys(std::slice::from_ref(code)),
        Action::Chord(codes) => sink.send_keys(codes),
        Action::Text(text) => sink.write_text(text),
        Action::Consumer(code) => sink.send_consumer_code(*code),
    }
}
