use std::sync::OnceLock;

use crate::utils::error::{BoxError, BoxResult};

pub const ENV_CPU_MEMORY_LIMIT: &str = "NDBOX_CPU_MEMORY_LIMIT";
pub const ENV_HOST_ALIGNMENT: &str = "NDBOX_HOST_ALIGNMENT";
pub const ENV_ACCEL: &str = "NDBOX_ACCEL";

static ACTIVE: OnceLock<BackendConfig> = OnceLock::new();

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendConfig {
    /// Upper bound on bytes held by the CPU backend. `None` uses physical memory.
    pub cpu_memory_limit_bytes: Option<u64>,
    pub host_alignment: usize,
    /// When false the Vulkan loader is never touched.
    pub accel_enabled: bool,
    pub application_name: String,
}

impl BackendConfig {
    /// Defaults overlaid with any `NDBOX_*` environment variables.
    pub fn from_env() -> BoxResult<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(ENV_CPU_MEMORY_LIMIT) {
            let limit = raw.trim().parse::<u64>().map_err(|e| {
                BoxError::InvalidArgument(format!("{}='{}': {}", ENV_CPU_MEMORY_LIMIT, raw, e))
            })?;
            config.cpu_memory_limit_bytes = Some(limit);
        }

        if let Ok(raw) = std::env::var(ENV_HOST_ALIGNMENT) {
            config.host_alignment = raw.trim().parse::<usize>().map_err(|e| {
                BoxError::InvalidArgument(format!("{}='{}': {}", ENV_HOST_ALIGNMENT, raw, e))
            })?;
        }

        if let Ok(raw) = std::env::var(ENV_ACCEL) {
            config.accel_enabled = parse_switch(&raw).ok_or_else(|| {
                BoxError::InvalidArgument(format!("{}='{}': expected on/off", ENV_ACCEL, raw))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BoxResult<()> {
        if !self.host_alignment.is_power_of_two() || self.host_alignment < 8 {
            return Err(BoxError::InvalidArgument(format!(
                "Host alignment must be a power of two no smaller than 8, got {}",
                self.host_alignment
            )));
        }

        if self.cpu_memory_limit_bytes == Some(0) {
            return Err(BoxError::InvalidArgument(
                "CPU memory limit must be positive".to_string(),
            ));
        }

        if self.application_name.contains('\0') {
            return Err(BoxError::InvalidArgument(
                "Application name cannot contain NUL bytes".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_cpu_memory_limit(mut self, bytes: u64) -> Self {
        self.cpu_memory_limit_bytes = Some(bytes);
        self
    }

    pub fn with_host_alignment(mut self, alignment: usize) -> Self {
        self.host_alignment = alignment;
        self
    }

    pub fn with_accel(mut self, enabled: bool) -> Self {
        self.accel_enabled = enabled;
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cpu_memory_limit_bytes: None,
            host_alignment: 64,
            accel_enabled: true,
            application_name: "ndbox".to_string(),
        }
    }
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Some(true),
        "0" | "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Install the process-wide configuration. Must run before any backend is used.
pub fn install(config: BackendConfig) -> BoxResult<()> {
    config.validate()?;
    ACTIVE.set(config).map_err(|_| {
        BoxError::InvalidState(
            "Backend configuration already installed or already in use".to_string(),
        )
    })
}

/// The installed configuration, or the environment-derived one on first use.
pub fn active() -> &'static BackendConfig {
    ACTIVE.get_or_init(|| {
        BackendConfig::from_env().unwrap_or_else(|e| {
            tracing::warn!("ignoring malformed backend environment: {}", e);
            BackendConfig::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ErrorKind;

    #[test]
    fn default_is_valid() {
        BackendConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_alignment() {
        let err = BackendConfig::default()
            .with_host_alignment(12)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert!(BackendConfig::default().with_host_alignment(4).validate().is_err());
        assert!(BackendConfig::default().with_host_alignment(128).validate().is_ok());
    }

    #[test]
    fn rejects_zero_limit() {
        let config = BackendConfig::default().with_cpu_memory_limit(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn switch_parsing() {
        assert_eq!(parse_switch("OFF"), Some(false));
        assert_eq!(parse_switch(" 1 "), Some(true));
        assert_eq!(parse_switch("maybe"), None);
    }
}
