pub mod audio;
pub mod builders;
pub mod classifier;
pub mod domain;
pub mod poller;
pub mod ports;
pub mod prompt;
pub mod view;

pub use builders::{GenerationOutput, GenerationRequest, ValidationError};
pub use classifier::{classify, classify_port_error, user_message, ErrorCategory, RawError};
pub use domain::{
    AspectRatio, Capability, DataUri, DataUriError, MediaRef, Operation, PhotoAsset, PoemRecord,
    Voice,
};
pub use poller::PollPolicy;
pub use ports::{GenerationClient, PortError, PortResult};
pub use view::{Effect, RequestToken, Transition, TransitionError, ViewEvent, ViewMachine};
