pub mod console;
pub mod coordinator;
pub mod queue;
pub mod transport;

pub use console::ConsoleTransport;
pub use coordinator::{EventRelay, PlaybackCoordinator, PlaybackNotice, PlaybackSnapshot};
pub use queue::PlayQueue;
pub use transport::{
    AudioTransport, PlaybackPosition, PlaybackState, TrackDescriptor, TransportEvent,
};
