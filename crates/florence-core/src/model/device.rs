//! Execution device selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Device the model weights are placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Host CPU
    Cpu,
    /// CUDA GPU by ordinal
    Cuda(i32),
}

impl Default for Device {
    fn default() -> Self {
        Device::Cuda(0)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(0) => write!(f, "cuda"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    /// Accepts `cpu`, `cuda` and `cuda:N` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => match other.strip_prefix("cuda:") {
                Some(ordinal) => ordinal
                    .parse::<i32>()
                    .ok()
                    .filter(|n| *n >= 0)
                    .map(Device::Cuda)
                    .ok_or_else(|| format!("Invalid CUDA ordinal in device '{s}'")),
                None => Err(format!(
                    "Unknown device '{s}' (expected cpu, cuda or cuda:N)"
                )),
            },
        }
    }
}

impl Serialize for Device {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Device {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:2".parse::<Device>().unwrap(), Device::Cuda(2));
        assert!("cuda:-1".parse::<Device>().is_err());
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for device in [Device::Cpu, Device::Cuda(0), Device::Cuda(3)] {
            let parsed: Device = device.to_string().parse().unwrap();
            assert_eq!(parsed, device);
        }
    }

    #[test]
    fn test_default_is_cuda() {
        assert_eq!(Device::default(), Device::Cuda(0));
        assert_eq!(Device::default().to_string(), "cuda");
    }

    #[test]
    fn test_serde_as_string() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            device: Device,
        }

        let toml = toml::to_string(&Wrapper {
            device: Device::Cuda(1),
        })
        .unwrap();
        assert!(toml.contains("device = \"cuda:1\""));

        let back: Wrapper = toml::from_str("device = \"cpu\"").unwrap();
        assert_eq!(back.device, Device::Cpu);
    }
}
