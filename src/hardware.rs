//! Hardware detection and driver-setup procedures
//!
//! GPU and wireless probing plus the driver installation routines the
//! catalog exposes to the engine as opaque procedure callbacks. Probing
//! shells out to `lspci`; driver-series resolution is a pure prefix table
//! lookup so it stays testable without the hardware.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{LodestarError, Result};
use crate::process_guard::CommandProcessGroup;

/// Driver series required by an NVIDIA chipset generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverSeries {
    /// Pre-8000 hardware; nouveau stays
    Unsupported,
    /// Tesla and earlier unified-naming chips
    Legacy340,
    /// Fermi
    Legacy390,
    /// Kepler
    Legacy470,
    /// Everything newer runs the current driver
    Latest,
}

impl DriverSeries {
    /// Package-name suffix for legacy series, None otherwise.
    pub fn package_suffix(self) -> Option<&'static str> {
        match self {
            Self::Legacy340 => Some("340xx"),
            Self::Legacy390 => Some("390xx"),
            Self::Legacy470 => Some("470xx"),
            Self::Unsupported | Self::Latest => None,
        }
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

impl fmt::Display for DriverSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "unsupported"),
            Self::Latest => write!(f, "latest"),
            other => write!(f, "{}", other.package_suffix().unwrap_or("latest")),
        }
    }
}

/// Chipset-prefix to last-supported-driver table, matched in order.
/// Anything unmatched is assumed to work with the latest driver.
const NVIDIA_PREFIXES: &[(&str, DriverSeries)] = &[
    ("NV", DriverSeries::Unsupported),
    ("MCP", DriverSeries::Unsupported),
    ("G7", DriverSeries::Unsupported),
    ("G8", DriverSeries::Legacy340),
    ("G9", DriverSeries::Legacy340),
    // Tesla
    ("GT", DriverSeries::Legacy340),
    // Fermi
    ("GF", DriverSeries::Legacy390),
    // Kepler
    ("GK", DriverSeries::Legacy470),
];

/// Resolve the driver series for a chipset name like "GK104".
pub fn driver_series_for(chipset: &str) -> DriverSeries {
    for (prefix, series) in NVIDIA_PREFIXES {
        if chipset.starts_with(prefix) {
            return *series;
        }
    }
    DriverSeries::Latest
}

/// True when `lspci` reports an NVIDIA device.
pub fn has_nvidia_gpu() -> bool {
    shell_check("lspci | grep -q -i NVIDIA")
}

/// Chipset name of the first NVIDIA device, e.g. "GP108".
pub fn nvidia_chipset() -> Option<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg("lspci | grep -i NVIDIA | head -n 1")
        .output()
        .ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_chipset(&text)
}

/// Pull the chipset token out of an lspci device line:
/// `01:00.0 VGA compatible controller: NVIDIA Corporation GP108 [GeForce GT 1030] (rev a1)`
fn parse_chipset(lspci_line: &str) -> Option<String> {
    let description = lspci_line.splitn(3, ':').nth(2)?;
    let description = description.split('[').next().unwrap_or(description);
    description.split_whitespace().last().map(str::to_string)
}

/// Packages to install for the detected NVIDIA GPU.
pub fn nvidia_packages() -> Vec<String> {
    let mut packages = vec![
        "nvidia-gpu-firmware".to_string(),
        "libva-nvidia-driver".to_string(),
    ];
    let Some(chipset) = nvidia_chipset() else {
        warn!("could not determine NVIDIA chipset, installing firmware only");
        return packages;
    };
    let series = driver_series_for(&chipset);
    info!("NVIDIA chipset {} resolves to driver series {}", chipset, series);
    match series {
        DriverSeries::Unsupported => {
            warn!("unsupported NVIDIA GPU detected, keeping nouveau drivers");
        }
        DriverSeries::Latest => {
            packages.extend(
                ["akmod-nvidia", "xorg-x11-drv-nvidia", "xorg-x11-drv-nvidia-cuda"]
                    .map(String::from),
            );
        }
        legacy => {
            if let Some(version) = legacy.package_suffix() {
                packages.push(format!("akmod-nvidia-{}", version));
                packages.push(format!("xorg-x11-drv-nvidia-{}", version));
                packages.push(format!("xorg-x11-drv-nvidia-{}-cuda", version));
            }
        }
    }
    packages
}

/// True on an image-based (OSTree) system, which needs the alternate
/// driver installation path.
pub fn is_ostree_system() -> bool {
    Path::new("/ostree").exists()
}

/// TCP reachability check; driver packages come from the network.
pub fn has_internet() -> bool {
    let Ok(mut addrs) = ("fedoraproject.org", 443).to_socket_addrs() else {
        return false;
    };
    let Some(addr) = addrs.next() else {
        return false;
    };
    TcpStream::connect_timeout(&addr, Duration::from_secs(5)).is_ok()
}

const PRIMARY_GPU_SCRIPT: &str = r#"
sudo cp -p /usr/share/X11/xorg.conf.d/nvidia.conf /etc/X11/xorg.conf.d/nvidia.conf
sudo sed -i '10i\	Option "PrimaryGPU" "yes"' /etc/X11/xorg.conf.d/nvidia.conf
"#;

/// Install NVIDIA drivers for the detected GPU, if any.
///
/// `primary_gpu` additionally marks the discrete GPU as primary in the
/// Xorg configuration. On OSTree systems the packages are layered through
/// rpm-ostree and nouveau is blacklisted via kernel arguments instead.
pub fn setup_nvidia(primary_gpu: bool) -> Result<()> {
    if !has_internet() {
        warn!("no internet connection detected, skipping NVIDIA driver setup");
        return Ok(());
    }
    if !has_nvidia_gpu() {
        warn!("no NVIDIA GPU detected, skipping NVIDIA driver setup");
        return Ok(());
    }
    if is_ostree_system() {
        info!("OSTree system detected, using the layered driver setup");
        return setup_nvidia_ostree();
    }

    let packages = nvidia_packages();
    info!("installing NVIDIA packages: {:?}", packages);
    let mut args: Vec<String> = ["sudo", "dnf", "install", "-y", "--allowerasing", "--best"]
        .map(String::from)
        .to_vec();
    args.extend(packages);
    run_host_command(&args)?;

    if primary_gpu {
        info!("marking the NVIDIA GPU as primary");
        run_shell(PRIMARY_GPU_SCRIPT)?;
    }
    Ok(())
}

fn setup_nvidia_ostree() -> Result<()> {
    let packages = nvidia_packages();
    info!("layering NVIDIA packages: {:?}", packages);
    let mut args: Vec<String> = ["rpm-ostree", "install", "-y"].map(String::from).to_vec();
    args.extend(packages);
    run_host_command(&args)?;

    info!("setting OSTree kernel arguments");
    run_shell(
        "sudo rpm-ostree kargs --append=rd.driver.blacklist=nouveau \
         --append=modprobe.blacklist=nouveau --append=nvidia-drm.modeset=1 \
         initcall_blacklist=simpledrm_platform_driver_init",
    )?;
    info!("driver layering complete, reboot to apply");
    Ok(())
}

/// Install Broadcom wifi and bluetooth drivers for detected hardware.
pub fn setup_broadcom(_option: bool) -> Result<()> {
    if shell_check("lspci | grep -i Network | grep -q -i Broadcom") {
        info!("Broadcom wifi detected, installing wifi drivers");
        run_shell("sudo dnf install -y broadcom-wl akmod-wl")?;
    } else {
        warn!("no Broadcom wifi card detected, skipping wifi driver setup");
    }

    if shell_check("lspci | grep -i Bluetooth | grep -q -i Broadcom") {
        info!("Broadcom bluetooth detected, installing bluetooth firmware");
        run_shell("sudo dnf install -y broadcom-bt-firmware")?;
    } else {
        warn!("no Broadcom bluetooth card detected, skipping bluetooth firmware");
    }
    Ok(())
}

fn shell_check(script: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(script)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn run_host_command(args: &[String]) -> Result<()> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| LodestarError::system("empty command line"))?;
    let status = Command::new(program)
        .args(rest)
        .in_new_process_group()
        .status()
        .map_err(|e| LodestarError::system(format!("failed to run {}: {}", program, e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(LodestarError::system(format!(
            "{} exited with status {}",
            program,
            status.code().unwrap_or(-1)
        )))
    }
}

fn run_shell(script: &str) -> Result<()> {
    let status = Command::new("sh")
        .arg("-c")
        .arg(script)
        .in_new_process_group()
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(LodestarError::system(format!(
            "shell command exited with status {}",
            status.code().unwrap_or(-1)
        )))
    }
}
