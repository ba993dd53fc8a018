use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoxError {
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Out of range: {0}")]
    OutOfRange(String),

    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),

    #[error("Unsupported transfer: {0}")]
    UnsupportedTransfer(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Payload-free discriminant of [`BoxError`], handy for matching in callers and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfMemory,
    OutOfRange,
    UnsupportedDevice,
    UnsupportedTransfer,
    InvalidState,
    InvalidArgument,
}

impl BoxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BoxError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            BoxError::OutOfRange(_) => ErrorKind::OutOfRange,
            BoxError::UnsupportedDevice(_) => ErrorKind::UnsupportedDevice,
            BoxError::UnsupportedTransfer(_) => ErrorKind::UnsupportedTransfer,
            BoxError::InvalidState(_) => ErrorKind::InvalidState,
            BoxError::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

pub type BoxResult<T> = Result<T, BoxError>;

// Convert vk::ErrorCode (Vulkan failure codes) into BoxError
impl From<vulkanalia::vk::ErrorCode> for BoxError {
    fn from(c: vulkanalia::vk::ErrorCode) -> Self {
        use vulkanalia::vk::ErrorCode;

        match c {
            ErrorCode::OUT_OF_HOST_MEMORY | ErrorCode::OUT_OF_DEVICE_MEMORY => {
                BoxError::OutOfMemory(format!("vk::ErrorCode: {:?}", c))
            }
            _ => BoxError::UnsupportedDevice(format!("vk::ErrorCode: {:?}", c)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vulkanalia::vk::ErrorCode;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            BoxError::OutOfRange("x".into()).kind(),
            ErrorKind::OutOfRange
        );
        assert_eq!(
            BoxError::InvalidState("x".into()).kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn vulkan_memory_codes_become_out_of_memory() {
        let err: BoxError = ErrorCode::OUT_OF_DEVICE_MEMORY.into();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);

        let err: BoxError = ErrorCode::INITIALIZATION_FAILED.into();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDevice);
    }

    #[test]
    fn display_carries_message() {
        let err = BoxError::UnsupportedTransfer("CPU:0 -> CUDA:0".into());
        assert_eq!(err.to_string(), "Unsupported transfer: CPU:0 -> CUDA:0");
    }
}
