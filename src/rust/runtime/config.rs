// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
};
use ::std::{
    env,
    fs::File,
    io::Read,
    str::FromStr,
    time::Duration,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Runtime options. Every option may be overridden by an environment variable named after the upper-cased option.
mod runtime_config {
    pub const SECTION_NAME: &str = "uthread";
    // Preemption quantum in microseconds.
    pub const TIMER_INTERVAL_US: &str = "timer_interval_us";
    // Size of each thread stack in bytes.
    pub const STACK_SIZE: &str = "stack_size";
    // Number of thread ids that may ever be issued.
    pub const MAX_THREADS: &str = "max_threads";
    // Whether a periodic timer preempts running threads.
    pub const PREEMPTION: &str = "preemption";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    timer_interval: Duration,
    stack_size: usize,
    max_threads: u32,
    preemption: bool,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)?.read_to_string(&mut config_s)?;
        Self::from_yaml_str(&config_s)
    }

    /// Parses a YAML document into a [Config] object. Options missing from the document keep their default values.
    pub fn from_yaml_str(config_s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = match YamlLoader::load_from_str(config_s) {
            Ok(config) => config,
            Err(e) => return Err(Self::invalid(format!("malformed configuration ({})", e))),
        };
        let config_obj: &Yaml = match &config[..] {
            [c] => c,
            _ => return Err(Self::invalid(format!("expected one document (found={:?})", config.len()))),
        };
        let section: &Yaml = Self::section(config_obj, runtime_config::SECTION_NAME)?;

        let mut config: Self = Self::default();
        if let Some(micros) = Self::integer::<u64>(section, runtime_config::TIMER_INTERVAL_US)? {
            config.timer_interval = Duration::from_micros(micros);
        }
        if let Some(stack_size) = Self::integer::<usize>(section, runtime_config::STACK_SIZE)? {
            config.stack_size = stack_size;
        }
        if let Some(max_threads) = Self::integer::<u32>(section, runtime_config::MAX_THREADS)? {
            config.max_threads = max_threads;
        }
        if let Some(preemption) = Self::lookup::<bool>(section, runtime_config::PREEMPTION, Yaml::as_bool)? {
            config.preemption = preemption;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the preemption quantum.
    pub fn with_timer_interval(mut self, timer_interval: Duration) -> Self {
        self.timer_interval = timer_interval;
        self
    }

    /// Sets the size of the stack allocated for every new thread.
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Sets how many thread ids may ever be issued, thread 0 included.
    pub fn with_max_threads(mut self, max_threads: u32) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Enables or disables timer-driven preemption.
    pub fn with_preemption(mut self, preemption: bool) -> Self {
        self.preemption = preemption;
        self
    }

    pub fn timer_interval(&self) -> Duration {
        self.timer_interval
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn max_threads(&self) -> u32 {
        self.max_threads
    }

    pub fn preemption(&self) -> bool {
        self.preemption
    }

    /// Checks that this configuration can drive a runtime.
    pub fn validate(&self) -> Result<(), Fail> {
        if self.timer_interval.is_zero() {
            let cause: String = "timer interval must be non-zero".to_string();
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if self.stack_size < limits::MIN_STACK_SIZE {
            let cause: String = format!(
                "stack size is too small (stack_size={:?}, min={:?})",
                self.stack_size,
                limits::MIN_STACK_SIZE
            );
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if self.max_threads == 0 {
            let cause: String = "max threads must be non-zero".to_string();
            error!("validate(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        Ok(())
    }

    /// Returns the section of `yaml` named `name`.
    fn section<'a>(yaml: &'a Yaml, name: &str) -> Result<&'a Yaml, Fail> {
        let section: &'a Yaml = &yaml[name];
        match section {
            Yaml::Hash(_) => Ok(section),
            Yaml::BadValue => Err(Self::invalid(format!("missing configuration section \"{}\"", name))),
            _ => Err(Self::invalid(format!("section \"{}\" has unexpected type", name))),
        }
    }

    /// Looks `name` up in the environment (upper-cased) and then in `section`. Returns `None` if neither has it.
    fn lookup<T: FromStr>(
        section: &Yaml,
        name: &str,
        from_yaml: impl FnOnce(&Yaml) -> Option<T>,
    ) -> Result<Option<T>, Fail> {
        if let Ok(var) = env::var(name.to_uppercase()) {
            return match var.parse() {
                Ok(value) => Ok(Some(value)),
                Err(_) => Err(Self::invalid(format!("variable {} has unexpected type", name.to_uppercase()))),
            };
        }
        match &section[name] {
            Yaml::BadValue => Ok(None),
            value => match from_yaml(value) {
                Some(value) => Ok(Some(value)),
                None => Err(Self::invalid(format!("option \"{}\" has unexpected type", name))),
            },
        }
    }

    /// Reads an integer option that must fit in `T`.
    fn integer<T: TryFrom<i64>>(section: &Yaml, name: &str) -> Result<Option<T>, Fail> {
        match Self::lookup::<i64>(section, name, Yaml::as_i64)? {
            Some(value) => match T::try_from(value) {
                Ok(value) => Ok(Some(value)),
                Err(_) => Err(Fail::new(
                    libc::ERANGE,
                    &format!("option \"{}\" is out of range (value={:?})", name, value),
                )),
            },
            None => Ok(None),
        }
    }

    fn invalid(cause: String) -> Fail {
        error!("from_yaml_str(): {}", cause);
        Fail::new(libc::EINVAL, &cause)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Config {
    fn default() -> Self {
        Self {
            timer_interval: limits::DEFAULT_TIMER_INTERVAL,
            stack_size: limits::DEFAULT_STACK_SIZE,
            max_threads: limits::DEFAULT_MAX_THREADS,
            preemption: true,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
