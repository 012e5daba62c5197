//! DPDK EAL command-line options.

use std::fmt;

use serde::{Deserialize, Serialize};

/// DPDK process type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcType {
    /// Primary process
    Primary,
    /// Secondary process
    Secondary,
    /// Detect automatically
    Auto,
}

impl fmt::Display for ProcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Auto => "auto",
        })
    }
}

/// Interrupt mode for devices bound to VFIO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VfioIntr {
    /// Legacy INTx
    Legacy,
    /// MSI
    Msi,
    /// MSI-X
    Msix,
}

impl fmt::Display for VfioIntr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legacy => "legacy",
            Self::Msi => "msi",
            Self::Msix => "msix",
        })
    }
}

/// DPDK EAL options.
///
/// Formats to the option string passed before `--` on the application
/// command line.
///
/// # Example
/// ```
/// use netexp_pktgen::DpdkConfig;
///
/// let config = DpdkConfig::new([0, 2], 4).with_pci_allow("05:00.0");
/// assert_eq!(config.to_string(), "-l 0,2 -n 4 -a 05:00.0");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DpdkConfig {
    /// Cores to run on
    pub cores: Vec<u32>,
    /// Number of memory channels
    pub mem_channels: u32,
    /// External driver shared objects or directories
    pub drivers: Vec<String>,
    /// Memory to preallocate at startup, in megabytes
    pub mem_alloc: Option<u64>,
    /// Number of memory ranks
    pub mem_ranks: Option<u32>,
    /// Run on Xen Domain0 without hugetlbfs
    pub xen_dom0: bool,
    /// Log to syslog
    pub syslog: bool,
    /// Memory to preallocate per socket, in megabytes
    pub socket_mem: Vec<u64>,
    /// hugetlbfs directory to use instead of the detected one
    pub huge_dir: Option<String>,
    /// Process type
    pub proc_type: Option<ProcType>,
    /// Shared data file prefix
    pub file_prefix: Option<String>,
    /// PCI devices EAL must not probe
    pub pci_block_list: Vec<String>,
    /// PCI devices EAL should probe
    pub pci_allow_list: Vec<String>,
    /// Virtual device, as `<driver><id>[,key=val, ...]`
    pub vdev: Option<String>,
    /// Use the VMware TSC map instead of native RDTSC
    pub vmware_tsc_map: bool,
    /// Starting address for the primary process memory maps
    pub base_virtaddr: Option<String>,
    /// VFIO interrupt mode
    pub vfio_intr: Option<VfioIntr>,
    /// Create `/dev/uioX` files for igb_uio devices
    pub create_uio_dev: bool,
    /// Appended verbatim
    pub extra_opt: Option<String>,
}

impl DpdkConfig {
    /// Options for `cores` with `mem_channels` memory channels.
    pub fn new(cores: impl IntoIterator<Item = u32>, mem_channels: u32) -> Self {
        Self {
            cores: cores.into_iter().collect(),
            mem_channels,
            ..Self::default()
        }
    }

    /// Probe a PCI device.
    pub fn with_pci_allow(mut self, device: impl Into<String>) -> Self {
        self.pci_allow_list.push(device.into());
        self
    }

    /// Skip a PCI device.
    pub fn with_pci_block(mut self, device: impl Into<String>) -> Self {
        self.pci_block_list.push(device.into());
        self
    }

    /// Load an external driver.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.drivers.push(driver.into());
        self
    }

    /// Set the shared data file prefix.
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = Some(prefix.into());
        self
    }

    /// Append raw options.
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra_opt = Some(extra.into());
        self
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl fmt::Display for DpdkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-l {} -n {}", join(&self.cores), self.mem_channels)?;

        for driver in &self.drivers {
            write!(f, " -d {driver}")?;
        }
        if let Some(mem) = self.mem_alloc {
            write!(f, " -m {mem}")?;
        }
        if let Some(ranks) = self.mem_ranks {
            write!(f, " -r {ranks}")?;
        }
        if self.xen_dom0 {
            f.write_str(" --xen-dom0")?;
        }
        if self.syslog {
            f.write_str(" --syslog")?;
        }
        if !self.socket_mem.is_empty() {
            write!(f, " --socket-mem {}", join(&self.socket_mem))?;
        }
        if let Some(dir) = &self.huge_dir {
            write!(f, " --huge-dir {dir}")?;
        }
        if let Some(proc_type) = self.proc_type {
            write!(f, " --proc-type {proc_type}")?;
        }
        if let Some(prefix) = &self.file_prefix {
            write!(f, " --file-prefix {prefix}")?;
        }
        for device in &self.pci_block_list {
            write!(f, " -b {device}")?;
        }
        for device in &self.pci_allow_list {
            write!(f, " -a {device}")?;
        }
        if let Some(vdev) = &self.vdev {
            write!(f, " --vdev {vdev}")?;
        }
        if self.vmware_tsc_map {
            f.write_str(" --vmware-tsc-map")?;
        }
        if let Some(addr) = &self.base_virtaddr {
            write!(f, " --base-virtaddr {addr}")?;
        }
        if let Some(mode) = self.vfio_intr {
            write!(f, " --vfio-intr {mode}")?;
        }
        if self.create_uio_dev {
            f.write_str(" --create-uio-dev")?;
        }
        if let Some(extra) = &self.extra_opt {
            write!(f, " {extra}")?;
        }
        Ok(())
    }
}
