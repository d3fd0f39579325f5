//! Request dispatch across the model pool

mod dispatcher;
mod error;
mod probe;
mod selector;

pub use dispatcher::{Dispatcher, truncate_prompt};
pub use error::DispatchError;
pub use probe::{PROBE_PROMPT, ProbeResult, ProbeStatus, ProviderHealth, ProviderProbe};
pub use selector::{Candidate, CandidateSelector, Selection};
