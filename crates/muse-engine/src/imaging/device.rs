use std::fmt;
use std::process::Command;

use tracing::debug;

use crate::config::non_empty_env;

pub const COMPUTE_CAPABILITY_ENV: &str = "MUSE_CUDA_COMPUTE_CAPABILITY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Cuda => "cuda",
            Device::Cpu => "cpu",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    BFloat16,
    Float16,
    Float32,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Precision::BFloat16 => "bfloat16",
            Precision::Float16 => "float16",
            Precision::Float32 => "float32",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accelerator {
    pub compute_major: u32,
    pub compute_minor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSelection {
    pub device: Device,
    pub precision: Precision,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        select_device(None)
    }
}

/// Ampere and newer get bfloat16, older GPUs float16, no GPU means CPU float32.
pub fn select_device(accelerator: Option<Accelerator>) -> DeviceSelection {
    match accelerator {
        Some(gpu) if gpu.compute_major >= 8 => DeviceSelection {
            device: Device::Cuda,
            precision: Precision::BFloat16,
        },
        Some(_) => DeviceSelection {
            device: Device::Cuda,
            precision: Precision::Float16,
        },
        None => DeviceSelection {
            device: Device::Cpu,
            precision: Precision::Float32,
        },
    }
}

/// Reads the env override first, then asks `nvidia-smi`. Any failure means no GPU.
pub fn probe_accelerator() -> Option<Accelerator> {
    if let Some(raw) = non_empty_env(COMPUTE_CAPABILITY_ENV) {
        return parse_compute_capability(&raw);
    }
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=compute_cap", "--format=csv,noheader"])
        .output();
    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout.lines().next().and_then(parse_compute_capability)
        }
        Ok(output) => {
            debug!(status = %output.status, "nvidia-smi reported no usable GPU");
            None
        }
        Err(err) => {
            debug!("nvidia-smi unavailable: {err}");
            None
        }
    }
}

pub fn parse_compute_capability(raw: &str) -> Option<Accelerator> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed.is_empty() {
        return None;
    }
    let (major, minor) = trimmed.split_once('.').unwrap_or((trimmed, "0"));
    Some(Accelerator {
        compute_major: major.trim().parse().ok()?,
        compute_minor: minor.trim().parse().ok()?,
    })
}
