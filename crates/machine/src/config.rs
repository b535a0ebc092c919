use hostbridge_devices::{data_channel, syscalls};
use hostbridge_terminal::TerminalOptions;
use thiserror::Error;

/// Largest guest physical address the bridges can be programmed with (32-bit registers).
const ADDRESS_LIMIT: u64 = 1 << 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    /// Guest RAM size in bytes, mapped at physical address zero.
    pub ram_size: u64,
    pub syscalls_base: u64,
    pub channel_base: u64,
    /// Listen address for the data channel's socket terminal.
    pub terminal_addr: String,
    pub emit_telnet_config: bool,
    pub tcp_nodelay: bool,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_size: 1 << 20,
            syscalls_base: 0xF000_0000,
            channel_base: 0xF000_1000,
            terminal_addr: "127.0.0.1:3456".into(),
            emit_telnet_config: true,
            tcp_nodelay: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid RAM size {0:#x}")]
    InvalidRamSize(u64),

    #[error("{name} window at {base:#x} does not fit in the 32-bit address space")]
    WindowOutOfRange { name: &'static str, base: u64 },

    #[error("{name} window at {base:#x} overlaps guest RAM")]
    WindowOverlapsRam { name: &'static str, base: u64 },

    #[error("syscall window at {syscalls:#x} overlaps data channel window at {channel:#x}")]
    WindowsOverlap { syscalls: u64, channel: u64 },
}

impl MachineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("HOSTBRIDGE_RAM_SIZE") {
            cfg.ram_size = parse_number("HOSTBRIDGE_RAM_SIZE", &v)?;
        }
        if let Some(v) = lookup("HOSTBRIDGE_SYSCALLS_BASE") {
            cfg.syscalls_base = parse_number("HOSTBRIDGE_SYSCALLS_BASE", &v)?;
        }
        if let Some(v) = lookup("HOSTBRIDGE_CHANNEL_BASE") {
            cfg.channel_base = parse_number("HOSTBRIDGE_CHANNEL_BASE", &v)?;
        }
        if let Some(v) = lookup("HOSTBRIDGE_TERMINAL_ADDR") {
            let v = v.trim();
            if v.is_empty() {
                return Err(ConfigError::InvalidEnv {
                    var: "HOSTBRIDGE_TERMINAL_ADDR",
                    value: v.to_owned(),
                });
            }
            cfg.terminal_addr = v.to_owned();
        }
        if let Some(v) = lookup("HOSTBRIDGE_TERMINAL_TELNET") {
            cfg.emit_telnet_config = parse_bool("HOSTBRIDGE_TERMINAL_TELNET", &v)?;
        }
        if let Some(v) = lookup("HOSTBRIDGE_TERMINAL_NODELAY") {
            cfg.tcp_nodelay = parse_bool("HOSTBRIDGE_TERMINAL_NODELAY", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ram_size == 0 || self.ram_size > ADDRESS_LIMIT {
            return Err(ConfigError::InvalidRamSize(self.ram_size));
        }

        let windows = [
            ("syscall", self.syscalls_base, syscalls::regs::WINDOW_LEN),
            ("data channel", self.channel_base, data_channel::regs::WINDOW_LEN),
        ];
        for (name, base, len) in windows {
            if base.checked_add(len).map_or(true, |end| end > ADDRESS_LIMIT) {
                return Err(ConfigError::WindowOutOfRange { name, base });
            }
            if base < self.ram_size {
                return Err(ConfigError::WindowOverlapsRam { name, base });
            }
        }

        let (s, c) = (self.syscalls_base, self.channel_base);
        if s < c + data_channel::regs::WINDOW_LEN && c < s + syscalls::regs::WINDOW_LEN {
            return Err(ConfigError::WindowsOverlap {
                syscalls: s,
                channel: c,
            });
        }
        Ok(())
    }

    pub fn terminal_options(&self) -> TerminalOptions {
        TerminalOptions {
            emit_config_bytes: self.emit_telnet_config,
            tcp_nodelay: self.tcp_nodelay,
        }
    }
}

fn parse_number(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    let s = raw.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|_| ConfigError::InvalidEnv {
        var,
        value: raw.to_owned(),
    })
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value: raw.to_owned(),
        }),
    }
}
