//! Maps `Box<dyn Error>` from trait boundaries to typed `ControllerError`.
//!
//! The traits in `magloop_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `magloop_hardware::HwError` downcasting.

use crate::error::ControllerError;

/// Map a trait-boundary error to a typed `ControllerError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ControllerError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<magloop_hardware::error::HwError>() {
            return match hw {
                magloop_hardware::error::HwError::Timeout => ControllerError::Timeout,
                other @ magloop_hardware::error::HwError::DriverFault(_) => {
                    ControllerError::HardwareFault(other.to_string())
                }
                other => ControllerError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ControllerError::Timeout
    } else {
        ControllerError::Hardware(s)
    }
}

/// Convert a trait-boundary result into a core result with context.
pub(crate) fn hw<T>(
    r: std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>,
    what: &'static str,
) -> crate::error::Result<T> {
    r.map_err(|e| eyre::Report::new(map_hw_error(&*e)).wrap_err(what))
}
