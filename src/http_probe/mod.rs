pub mod cert;
pub mod error;
pub mod resolve;
pub mod result;
pub mod timer;

pub mod prelude {
    pub use super::cert::{CertExpiry, Clock, SystemClock};
    pub use super::error::ProbeError;
    pub use super::resolve::Resolve;
    pub use super::result::{PhaseMarks, PhaseTimings, ProbeResult};
    pub use super::timer::PhaseTimer;
}

use std::fmt::Write;

/// Render an error together with its chain of sources.
pub fn report(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}
