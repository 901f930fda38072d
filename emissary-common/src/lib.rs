pub mod envelope;
pub mod logging;
pub mod shutdown;

pub use envelope::{Envelope, QueuedMessage};
pub use shutdown::{Shutdown, Signal};
pub use tracing;
