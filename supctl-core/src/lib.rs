pub mod backoff;
pub mod config;
pub mod error;
pub mod policy;
pub mod proc;
pub mod process;
pub mod registry;
pub mod runner;
pub mod supervisor;

pub use backoff::{BackoffConfig, BackoffStrategy};
pub use config::{ConfigLoader, DaemonConfig, RegistryWatcher};
pub use error::{Error, Result};
pub use policy::{Decision, RestartPolicy};
pub use proc::{ExitRecord, ManagedProc, ProcId, ProcSnapshot, ProcState};
pub use process::{ExitStatus, ProcessBuilder, ProcessHandle, Signal};
pub use registry::{ProcessSpec, Registry};
pub use runner::{DiscardRouter, NativeRunner, OutputRouter, ProcessRunner};
pub use supervisor::{ReloadSummary, Supervisor, SupervisorEvent, SupervisorOptions};
