//! Memory sampling primitives

use crate::errors::{Error, RecoveryHint, Result};
use parking_lot::Mutex;
use std::fmt::Debug;
use sysinfo::{Pid, System};

/// Raw reading before it is related to a memory budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    pub rss: u64,
    pub virtual_memory: u64,
    pub system_total: u64,
    pub system_available: u64,
}

/// Source of memory readings
pub trait MemorySampler: Send + Sync + Debug {
    fn sample(&self) -> Result<MemorySample>;
}

/// Reads the current process and the host through `sysinfo`
pub struct SystemMemorySampler {
    system: Mutex<System>,
    pid: Pid,
}

impl Debug for SystemMemorySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemorySampler")
            .field("pid", &self.pid)
            .finish()
    }
}

impl SystemMemorySampler {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| Error::MemorySampling {
            message: format!("cannot determine current pid: {e}"),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Memory sampling is unsupported on this platform".to_string(),
            },
        })?;
        Ok(Self {
            system: Mutex::new(System::new()),
            pid,
        })
    }
}

impl MemorySampler for SystemMemorySampler {
    fn sample(&self) -> Result<MemorySample> {
        let mut system = self.system.lock();
        system.refresh_memory();

        if !system.refresh_process(self.pid) {
            return Err(Error::MemorySampling {
                message: format!("process {} not found", self.pid),
                recovery_hint: RecoveryHint::Ignore,
            });
        }

        let (rss, virtual_memory) = match system.process(self.pid) {
            Some(process) => (process.memory(), process.virtual_memory()),
            None => {
                return Err(Error::MemorySampling {
                    message: format!("process {} disappeared", self.pid),
                    recovery_hint: RecoveryHint::Ignore,
                })
            }
        };

        Ok(MemorySample {
            rss,
            virtual_memory,
            system_total: system.total_memory(),
            system_available: system.available_memory(),
        })
    }
}

/// Sampler that reports whatever it was last told, for tests and simulations
#[derive(Debug)]
pub struct ManualMemorySampler {
    reading: Mutex<ManualReading>,
}

#[derive(Debug)]
struct ManualReading {
    sample: MemorySample,
    failure: Option<String>,
}

impl ManualMemorySampler {
    pub fn new(rss: u64, system_total: u64) -> Self {
        Self {
            reading: Mutex::new(ManualReading {
                sample: MemorySample {
                    rss,
                    virtual_memory: rss,
                    system_total,
                    system_available: system_total.saturating_sub(rss),
                },
                failure: None,
            }),
        }
    }

    /// Report `rss` from now on and clear any injected failure
    pub fn set_rss(&self, rss: u64) {
        let mut reading = self.reading.lock();
        reading.sample.rss = rss;
        reading.sample.virtual_memory = reading.sample.virtual_memory.max(rss);
        reading.sample.system_available = reading.sample.system_total.saturating_sub(rss);
        reading.failure = None;
    }

    /// Make the next samples fail with `message`
    pub fn fail(&self, message: impl Into<String>) {
        self.reading.lock().failure = Some(message.into());
    }
}

impl MemorySampler for ManualMemorySampler {
    fn sample(&self) -> Result<MemorySample> {
        let reading = self.reading.lock();
        match &reading.failure {
            Some(message) => Err(Error::MemorySampling {
                message: message.clone(),
                recovery_hint: RecoveryHint::Ignore,
            }),
            None => Ok(reading.sample),
        }
    }
}
