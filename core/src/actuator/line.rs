use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::prelude::{PipelineError, PipelineResult};

/// Hardware seam for one digital output line.
pub trait OutputLine: Send {
    /// Drives the line logically on or off.
    fn set(&mut self, on: bool) -> std::io::Result<()>;
    /// Releases the line. The line must be left logically off.
    fn close(&mut self) -> std::io::Result<()>;
    fn describe(&self) -> String;
}

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Output line driven through the sysfs GPIO interface.
#[derive(Debug)]
pub struct SysfsLine {
    pin: u32,
    active_high: bool,
    root: PathBuf,
    value_path: PathBuf,
}

impl SysfsLine {
    /// Probes the sysfs GPIO tree once and claims the pin as an output,
    /// driven logically off.
    pub fn open(pin: u32, active_high: bool) -> PipelineResult<Self> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin, active_high)
    }

    fn open_at(root: &Path, pin: u32, active_high: bool) -> PipelineResult<Self> {
        if !root.exists() {
            return Err(PipelineError::HardwareUnavailable(format!(
                "gpio sysfs not present at {}",
                root.display()
            )));
        }

        let pin_dir = root.join(format!("gpio{}", pin));
        if !pin_dir.exists() {
            fs::write(root.join("export"), pin.to_string()).map_err(|err| {
                PipelineError::HardwareUnavailable(format!("exporting gpio {}: {}", pin, err))
            })?;
        }
        fs::write(pin_dir.join("direction"), "out").map_err(|err| {
            PipelineError::HardwareUnavailable(format!("configuring gpio {}: {}", pin, err))
        })?;

        let mut line = Self {
            pin,
            active_high,
            root: root.to_path_buf(),
            value_path: pin_dir.join("value"),
        };
        line.set(false).map_err(|err| {
            PipelineError::HardwareUnavailable(format!("initialising gpio {}: {}", pin, err))
        })?;
        Ok(line)
    }
}

impl OutputLine for SysfsLine {
    fn set(&mut self, on: bool) -> std::io::Result<()> {
        let level = if on == self.active_high { "1" } else { "0" };
        fs::write(&self.value_path, level)
    }

    fn close(&mut self) -> std::io::Result<()> {
        let _ = self.set(false);
        fs::write(self.root.join("unexport"), self.pin.to_string())
    }

    fn describe(&self) -> String {
        format!("gpio {}", self.pin)
    }
}

/// In-memory line used when no hardware is present; records every
/// transition for assertions.
#[derive(Clone, Default)]
pub struct MockLine {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    levels: Vec<bool>,
    closed: bool,
}

impl MockLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every logical level the line was driven to, in order.
    pub fn levels(&self) -> Vec<bool> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .levels
            .clone()
    }

    /// Completed on-then-off cycles.
    pub fn pulses(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .levels
            .windows(2)
            .filter(|pair| pair[0] && !pair[1])
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }
}

impl OutputLine for MockLine {
    fn set(&mut self, on: bool) -> std::io::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .levels
            .push(on);
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed = true;
        Ok(())
    }

    fn describe(&self) -> String {
        "mock line".to_string()
    }
}
