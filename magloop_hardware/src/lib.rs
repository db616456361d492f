pub mod driver_chip;
pub mod error;
pub mod sim;
pub mod step_dir;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use driver_chip::{ChipTiming, CommandBus, HardwareMicrostepDriver};
pub use error::HwError;
pub use sim::{SimAxisConfig, SimStats, SimulatedAxis, SimulatedMotor, SimulatedSwitch};
pub use step_dir::{DriverTiming, SoftwareMicrostepDriver, SpeedRamp, StepDirPins};
