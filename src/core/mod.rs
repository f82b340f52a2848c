pub mod clock;
pub mod error;
pub mod lock;
pub mod logging;

pub use clock::{Clock, SystemClock, day_string};
pub use error::{ConfigError, SupervisorError, SupervisorResult};
pub use logging::{ComponentLogger, LogContext};
