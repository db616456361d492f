use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("spi error: {0}")]
    Spi(String),
    #[error("driver busy timeout")]
    Timeout,
    #[error("driver fault: status {0:#06x}")]
    DriverFault(u16),
    #[error("invalid microstep divisor: {0}")]
    InvalidMicrostep(u16),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
