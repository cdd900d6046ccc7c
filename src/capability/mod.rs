use std::fmt;
use std::process::Command;

use sysinfo::System;
use tracing::debug;

use crate::registry::FileVariant;

/// Coarse bucket describing local hardware's ability to run larger or less
/// quantized models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    High,
    Medium,
    Low,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Capability::High => write!(f, "high"),
            Capability::Medium => write!(f, "medium"),
            Capability::Low => write!(f, "low"),
        }
    }
}

/// Hardware facts the capability classing reads. Injected so the classing
/// stays a pure function that tests can drive without real hardware.
pub trait PlatformProbe {
    fn total_ram_gb(&self) -> f64;
    fn has_gpu_acceleration(&self) -> bool;
}

/// Probes the actual machine: RAM via sysinfo, GPU assumed present on
/// macOS (Metal) and detected with a best-effort nvidia-smi call elsewhere.
pub struct SystemProbe;

impl PlatformProbe for SystemProbe {
    fn total_ram_gb(&self) -> f64 {
        let sys = System::new_all();
        sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0)
    }

    fn has_gpu_acceleration(&self) -> bool {
        if cfg!(target_os = "macos") {
            return true;
        }
        match Command::new("nvidia-smi").output() {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

/// Classifies the machine. Recomputed at each call; nothing is cached.
pub fn classify(probe: &dyn PlatformProbe) -> Capability {
    let ram_gb = probe.total_ram_gb();
    let has_gpu = probe.has_gpu_acceleration();
    debug!("capability probe: ram={:.1}GB gpu={}", ram_gb, has_gpu);

    if has_gpu && ram_gb >= 32.0 {
        Capability::High
    } else if (has_gpu && ram_gb >= 16.0) || ram_gb >= 24.0 {
        Capability::Medium
    } else {
        Capability::Low
    }
}

/// Quantization preference per capability class, most preferred first.
pub fn preferred_tags(capability: Capability) -> &'static [&'static str] {
    match capability {
        Capability::High => &["Q8_0", "Q6_K", "Q5_K_M"],
        Capability::Medium => &["Q5_K_M", "Q4_K_M", "Q4_0"],
        Capability::Low => &["Q4_K_M", "Q3_K_M", "Q2_K"],
    }
}

/// Picks the best variant for the capability class: first preferred tag
/// that any variant carries wins; with no tag match the first variant in
/// input order is the fallback. None only when `variants` is empty.
pub fn recommend(variants: &[FileVariant], capability: Capability) -> Option<&FileVariant> {
    if variants.is_empty() {
        return None;
    }

    for tag in preferred_tags(capability) {
        if let Some(variant) = variants
            .iter()
            .find(|v| v.quantization.as_deref() == Some(*tag))
        {
            return Some(variant);
        }
    }

    variants.first()
}
