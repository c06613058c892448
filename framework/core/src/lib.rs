mod error;
mod shutdown;

pub mod prelude {
    pub use crate::error::{ConfigError, IterationInterruptedError};
    pub use crate::shutdown::{ShutdownHandle, ShutdownListener};
}
