/// JSON frame envelopes fanned out to presentation subscribers.
pub mod broadcast;
