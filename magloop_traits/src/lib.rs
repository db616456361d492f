//! Hardware capability traits shared by the controller crates.
//!
//! The motion engine only ever talks to a stepper driver through [`Motor`] and
//! to the home limit switch through [`LimitSwitch`]. Errors cross these
//! boundaries as `Box<dyn Error + Send + Sync>` and are mapped to typed errors
//! inside `magloop_core`.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Stepper driver capability used by the motion controller.
///
/// Sign convention: a positive `delta` moves away from home.
pub trait Motor {
    /// Energise the coils (driver enable line asserted).
    fn enable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Release coil current.
    fn disable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Linear speed profile for the next move, in steps/s².
    fn set_speed_profile(
        &mut self,
        acceleration: u32,
        deceleration: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Issue `delta` steps and block until they are done or `halt` fires.
    ///
    /// `halt` is consulted before every step pulse; once it returns `true` no
    /// further pulse may be issued. Returns the signed number of steps that
    /// were actually issued.
    fn move_steps(
        &mut self,
        delta: i64,
        halt: &dyn Fn() -> bool,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>>;

    /// Microstep divisor the driver is running at (1 = full steps).
    fn microsteps(&self) -> u16 {
        1
    }
}

impl<M: Motor + ?Sized> Motor for Box<M> {
    fn enable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).enable()
    }
    fn disable(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).disable()
    }
    fn set_speed_profile(
        &mut self,
        acceleration: u32,
        deceleration: u32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set_speed_profile(acceleration, deceleration)
    }
    fn move_steps(
        &mut self,
        delta: i64,
        halt: &dyn Fn() -> bool,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        (**self).move_steps(delta, halt)
    }
    fn microsteps(&self) -> u16 {
        (**self).microsteps()
    }
}

/// Raw home limit switch input (no debouncing).
pub trait LimitSwitch {
    /// `true` while the switch contact is closed.
    fn is_pressed(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

impl<F> LimitSwitch for F
where
    F: Fn() -> bool,
{
    fn is_pressed(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self())
    }
}
