//! GPU identification from the strings an OpenCL driver reports.
//!
//! The queue layer keys driver-defect workarounds off the GPU family
//! (Adreno 3xx event timers, Mali kernel pools), and that decision has to be
//! made before any kernel runs. Everything here is pure string
//! classification of `CL_DEVICE_NAME` / `CL_DEVICE_VENDOR` values; there is
//! no OpenCL dependency and classification never fails, it only degrades to
//! `Unknown`.
//!
//! # Examples
//!
//! ```
//! use hone_device::{GpuInfo, GpuVendor};
//!
//! let gpu = GpuInfo::from_device_strings("Adreno (TM) 330", "Qualcomm");
//! assert_eq!(gpu.vendor, GpuVendor::Qualcomm);
//! assert!(gpu.is_adreno());
//! assert!(gpu.adreno.is_adreno3xx());
//!
//! let gpu = GpuInfo::from_device_strings("Mali-G77", "ARM");
//! assert!(gpu.is_mali());
//! ```

use std::fmt;

// ── Vendor classification ──────────────────────────────────────────────────

/// GPU vendor, as far as the queue layer cares.
///
/// Mali is treated as its own family rather than folded into ARM, because
/// the driver workarounds are keyed on the GPU line, not the chip vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Apple,
    Qualcomm,
    Mali,
    PowerVr,
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

impl GpuVendor {
    /// Classify from the device and vendor strings the driver reports.
    ///
    /// Device names are consulted first: some Android drivers report a SoC
    /// vendor string that says nothing about the GPU line.
    pub fn classify(device_name: &str, vendor_name: &str) -> Self {
        let device = device_name.to_ascii_lowercase();
        let vendor = vendor_name.to_ascii_lowercase();

        if device.contains("adreno") || vendor.contains("qualcomm") {
            Self::Qualcomm
        } else if device.contains("mali") || vendor.contains("arm") {
            Self::Mali
        } else if device.contains("powervr") || vendor.contains("imagination") {
            Self::PowerVr
        } else if vendor.contains("nvidia") {
            Self::Nvidia
        } else if vendor.contains("advanced micro devices") || vendor.contains("amd") {
            Self::Amd
        } else if vendor.contains("intel") {
            Self::Intel
        } else if vendor.contains("apple") {
            Self::Apple
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Apple => "Apple",
            Self::Qualcomm => "Qualcomm",
            Self::Mali => "Mali",
            Self::PowerVr => "PowerVR",
            Self::Nvidia => "NVIDIA",
            Self::Amd => "AMD",
            Self::Intel => "Intel",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

// ── Adreno ─────────────────────────────────────────────────────────────────

/// Adreno series bucket, derived from the model number in the device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdrenoSeries {
    Adreno1xx,
    Adreno2xx,
    Adreno3xx,
    Adreno4xx,
    Adreno5xx,
    Adreno6xx,
    Adreno7xx,
    Unknown,
}

/// Parsed Adreno identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdrenoInfo {
    pub series: AdrenoSeries,
    /// Model number as reported (`330` for `"Adreno (TM) 330"`), 0 when the
    /// name carried none.
    pub model: u32,
}

impl AdrenoInfo {
    /// Identity for a device that is not an Adreno at all.
    pub const fn unknown() -> Self {
        Self {
            series: AdrenoSeries::Unknown,
            model: 0,
        }
    }

    /// Parse from a device name such as `"Adreno (TM) 640"`.
    ///
    /// Accepts the marketing variants seen in the wild: with or without the
    /// `(TM)`, with or without a space before the number.
    pub fn from_device_name(device_name: &str) -> Self {
        let lower = device_name.to_ascii_lowercase();
        let Some(pos) = lower.find("adreno") else {
            return Self::unknown();
        };
        let model = first_number(&lower[pos + "adreno".len()..]);
        let series = match model {
            100..=199 => AdrenoSeries::Adreno1xx,
            200..=299 => AdrenoSeries::Adreno2xx,
            300..=399 => AdrenoSeries::Adreno3xx,
            400..=499 => AdrenoSeries::Adreno4xx,
            500..=599 => AdrenoSeries::Adreno5xx,
            600..=699 => AdrenoSeries::Adreno6xx,
            700..=799 => AdrenoSeries::Adreno7xx,
            _ => AdrenoSeries::Unknown,
        };
        Self { series, model }
    }

    /// The 3xx line has event timers that sporadically report garbage; the
    /// tuning search treats its measurements as suspect.
    pub fn is_adreno3xx(&self) -> bool {
        self.series == AdrenoSeries::Adreno3xx
    }
}

// ── Mali ───────────────────────────────────────────────────────────────────

/// Mali architecture generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaliSeries {
    /// T-series (T600..T880).
    Midgard,
    /// First G-series generation (G31..G76).
    Bifrost,
    /// G57/G68/G77/G78 and the three-digit G-series.
    Valhall,
    Unknown,
}

/// Parsed Mali identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaliInfo {
    pub series: MaliSeries,
    /// Product suffix as reported (`"G77"`, `"T760"`), empty when the name
    /// carried none.
    pub product: String,
}

impl MaliInfo {
    /// Identity for a device that is not a Mali at all.
    pub fn unknown() -> Self {
        Self {
            series: MaliSeries::Unknown,
            product: String::new(),
        }
    }

    /// Parse from a device name such as `"Mali-G77"` or `"Mali-T760"`.
    pub fn from_device_name(device_name: &str) -> Self {
        let lower = device_name.to_ascii_lowercase();
        let Some(pos) = lower.find("mali") else {
            return Self::unknown();
        };
        let rest = &lower[pos + "mali".len()..];
        let rest = rest.trim_start_matches(['-', ' ']);
        let is_t = rest.starts_with('t');
        let is_g = rest.starts_with('g');
        let num = first_number(rest);

        let series = if is_t {
            MaliSeries::Midgard
        } else if is_g {
            match num {
                31 | 51 | 52 | 71 | 72 | 76 => MaliSeries::Bifrost,
                57 | 68 | 77 | 78 => MaliSeries::Valhall,
                n if n >= 100 => MaliSeries::Valhall,
                _ => MaliSeries::Unknown,
            }
        } else {
            MaliSeries::Unknown
        };

        let product = if num > 0 {
            let prefix = if is_t { "T" } else if is_g { "G" } else { "" };
            format!("{prefix}{num}")
        } else {
            String::new()
        };

        Self { series, product }
    }
}

/// First run of ASCII digits in `s`, or 0 when there is none.
fn first_number(s: &str) -> u32 {
    let mut value: u32 = 0;
    let mut seen = false;
    for c in s.chars() {
        if let Some(d) = c.to_digit(10) {
            seen = true;
            value = value.saturating_mul(10).saturating_add(d);
        } else if seen {
            break;
        }
    }
    if seen {
        value
    } else {
        0
    }
}

// ── GpuInfo ────────────────────────────────────────────────────────────────

/// Everything the queue layer knows about the GPU it is driving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuInfo {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub adreno: AdrenoInfo,
    pub mali: MaliInfo,
}

impl GpuInfo {
    /// Info for a device nothing is known about.
    pub fn unknown() -> Self {
        Self {
            vendor: GpuVendor::Unknown,
            device_name: String::new(),
            adreno: AdrenoInfo::unknown(),
            mali: MaliInfo::unknown(),
        }
    }

    /// Build from the device and vendor strings the driver reports.
    pub fn from_device_strings(device_name: &str, vendor_name: &str) -> Self {
        let vendor = GpuVendor::classify(device_name, vendor_name);
        let info = Self {
            vendor,
            device_name: device_name.to_string(),
            adreno: AdrenoInfo::from_device_name(device_name),
            mali: MaliInfo::from_device_name(device_name),
        };
        log::debug!(
            "classified device '{device_name}' (vendor '{vendor_name}') as {}",
            info.vendor
        );
        info
    }

    pub fn is_adreno(&self) -> bool {
        self.vendor == GpuVendor::Qualcomm
    }

    pub fn is_mali(&self) -> bool {
        self.vendor == GpuVendor::Mali
    }

    pub fn is_nvidia(&self) -> bool {
        self.vendor == GpuVendor::Nvidia
    }

    pub fn is_amd(&self) -> bool {
        self.vendor == GpuVendor::Amd
    }

    pub fn is_intel(&self) -> bool {
        self.vendor == GpuVendor::Intel
    }

    pub fn is_apple(&self) -> bool {
        self.vendor == GpuVendor::Apple
    }

    pub fn is_powervr(&self) -> bool {
        self.vendor == GpuVendor::PowerVr
    }
}

impl fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.device_name.is_empty() {
            write!(f, "{} GPU", self.vendor)
        } else {
            write!(f, "{} ({})", self.device_name, self.vendor)
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_from_vendor_string() {
        assert_eq!(GpuVendor::classify("", "NVIDIA Corporation"), GpuVendor::Nvidia);
        assert_eq!(
            GpuVendor::classify("", "Advanced Micro Devices, Inc."),
            GpuVendor::Amd
        );
        assert_eq!(GpuVendor::classify("", "Intel(R) Corporation"), GpuVendor::Intel);
        assert_eq!(GpuVendor::classify("", "Apple"), GpuVendor::Apple);
        assert_eq!(GpuVendor::classify("", "Qualcomm"), GpuVendor::Qualcomm);
        assert_eq!(GpuVendor::classify("", "ARM"), GpuVendor::Mali);
        assert_eq!(GpuVendor::classify("", "Imagination Technologies"), GpuVendor::PowerVr);
        assert_eq!(GpuVendor::classify("", "Acme Silicon"), GpuVendor::Unknown);
    }

    #[test]
    fn test_device_name_wins_over_vendor_string() {
        // Some Android drivers report the SoC vendor, not the GPU line.
        assert_eq!(
            GpuVendor::classify("Adreno (TM) 640", "QUALCOMM Technologies"),
            GpuVendor::Qualcomm
        );
        assert_eq!(GpuVendor::classify("Mali-G52", "Amlogic"), GpuVendor::Mali);
        assert_eq!(
            GpuVendor::classify("PowerVR Rogue GE8320", "MediaTek"),
            GpuVendor::PowerVr
        );
    }

    #[test]
    fn test_adreno_parse_variants() {
        for name in ["Adreno (TM) 330", "Adreno(TM) 330", "Adreno 330", "QUALCOMM Adreno 330"] {
            let info = AdrenoInfo::from_device_name(name);
            assert_eq!(info.model, 330, "failed for {name:?}");
            assert_eq!(info.series, AdrenoSeries::Adreno3xx);
            assert!(info.is_adreno3xx());
        }
    }

    #[test]
    fn test_adreno_series_buckets() {
        let cases = [
            (205, AdrenoSeries::Adreno2xx),
            (320, AdrenoSeries::Adreno3xx),
            (430, AdrenoSeries::Adreno4xx),
            (540, AdrenoSeries::Adreno5xx),
            (640, AdrenoSeries::Adreno6xx),
            (740, AdrenoSeries::Adreno7xx),
        ];
        for (model, series) in cases {
            let info = AdrenoInfo::from_device_name(&format!("Adreno (TM) {model}"));
            assert_eq!(info.series, series);
            assert_eq!(info.model, model);
        }
    }

    #[test]
    fn test_adreno_without_number() {
        let info = AdrenoInfo::from_device_name("Adreno");
        assert_eq!(info.series, AdrenoSeries::Unknown);
        assert_eq!(info.model, 0);
        assert!(!info.is_adreno3xx());
    }

    #[test]
    fn test_not_an_adreno() {
        assert_eq!(AdrenoInfo::from_device_name("Mali-G77"), AdrenoInfo::unknown());
        assert_eq!(AdrenoInfo::from_device_name(""), AdrenoInfo::unknown());
    }

    #[test]
    fn test_mali_series() {
        let cases = [
            ("Mali-T760", MaliSeries::Midgard, "T760"),
            ("Mali-T880", MaliSeries::Midgard, "T880"),
            ("Mali-G52", MaliSeries::Bifrost, "G52"),
            ("Mali-G76", MaliSeries::Bifrost, "G76"),
            ("Mali-G57", MaliSeries::Valhall, "G57"),
            ("Mali-G77", MaliSeries::Valhall, "G77"),
            ("Mali-G710", MaliSeries::Valhall, "G710"),
            ("ARM Mali-G78", MaliSeries::Valhall, "G78"),
        ];
        for (name, series, product) in cases {
            let info = MaliInfo::from_device_name(name);
            assert_eq!(info.series, series, "failed for {name:?}");
            assert_eq!(info.product, product);
        }
    }

    #[test]
    fn test_mali_without_product() {
        let info = MaliInfo::from_device_name("Mali");
        assert_eq!(info.series, MaliSeries::Unknown);
        assert!(info.product.is_empty());
    }

    #[test]
    fn test_gpu_info_adreno3xx() {
        let gpu = GpuInfo::from_device_strings("Adreno (TM) 330", "Qualcomm");
        assert!(gpu.is_adreno());
        assert!(gpu.adreno.is_adreno3xx());
        assert!(!gpu.is_mali());
    }

    #[test]
    fn test_gpu_info_mali() {
        let gpu = GpuInfo::from_device_strings("Mali-G77", "ARM");
        assert!(gpu.is_mali());
        assert!(!gpu.is_adreno());
        assert_eq!(gpu.mali.series, MaliSeries::Valhall);
    }

    #[test]
    fn test_gpu_info_desktop() {
        let gpu = GpuInfo::from_device_strings("NVIDIA GeForce RTX 3080", "NVIDIA Corporation");
        assert!(gpu.is_nvidia());
        assert!(!gpu.is_adreno());
        assert!(!gpu.adreno.is_adreno3xx());
        assert!(!gpu.is_mali());
    }

    #[test]
    fn test_gpu_info_unknown() {
        let gpu = GpuInfo::unknown();
        assert_eq!(gpu.vendor, GpuVendor::Unknown);
        assert!(!gpu.is_adreno());
        assert!(!gpu.is_mali());
    }

    #[test]
    fn test_display() {
        let gpu = GpuInfo::from_device_strings("Adreno (TM) 640", "Qualcomm");
        assert_eq!(gpu.to_string(), "Adreno (TM) 640 (Qualcomm)");
        assert_eq!(GpuInfo::unknown().to_string(), "unknown GPU");
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("(tm) 640 gpu"), 640);
        assert_eq!(first_number("no digits"), 0);
        assert_eq!(first_number("g77"), 77);
        assert_eq!(first_number("12a34"), 12);
    }
}
