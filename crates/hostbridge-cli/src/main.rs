#![forbid(unsafe_code)]

// The syscall bridge needs a POSIX C runtime on the host.
#[cfg(not(unix))]
fn main() {
    eprintln!("hostbridge: only Unix hosts are supported");
    std::process::exit(2);
}

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    native::main()
}

#[cfg(unix)]
mod native {
    use std::io::{self, Write};

    use anyhow::{bail, Context, Result};
    use clap::{Parser, Subcommand};
    use hostbridge_devices::oflag::target;
    use hostbridge_devices::{DataChannel, RxHandle};
    use hostbridge_machine::{GuestChannel, GuestSyscalls, Machine, MachineConfig, SyscallResult};
    use hostbridge_terminal::SocketTerminal;
    use tracing_subscriber::EnvFilter;

    /// Guest RAM used by the drivers to stage paths and data.
    const SCRATCH: u64 = 0x1000;
    const READ_CHUNK: u32 = 4096;

    #[derive(Debug, Parser)]
    #[command(
        name = "hostbridge",
        about = "Drive the syscall and data channel bridges from a guest-side runner"
    )]
    pub struct Args {
        /// Guest RAM size in bytes (overrides HOSTBRIDGE_RAM_SIZE).
        #[arg(long, value_parser = parse_u64)]
        ram_size: Option<u64>,

        /// Syscall bridge base address (overrides HOSTBRIDGE_SYSCALLS_BASE).
        #[arg(long, value_parser = parse_u64)]
        syscalls_base: Option<u64>,

        /// Data channel base address (overrides HOSTBRIDGE_CHANNEL_BASE).
        #[arg(long, value_parser = parse_u64)]
        channel_base: Option<u64>,

        /// Socket terminal listen address (overrides HOSTBRIDGE_TERMINAL_ADDR).
        #[arg(long)]
        terminal: Option<String>,

        /// Do not send telnet negotiation bytes to new terminal clients.
        #[arg(long)]
        no_telnet: bool,

        /// Disable Nagle's algorithm on terminal connections.
        #[arg(long)]
        nodelay: bool,

        #[command(subcommand)]
        command: Command,
    }

    #[derive(Debug, Subcommand)]
    enum Command {
        /// Echo every byte received on the socket terminal back through the data channel.
        Echo {
            /// Exit after echoing this many bytes.
            #[arg(long)]
            count: Option<u64>,
        },
        /// Write a host file to stdout, reading it through the syscall bridge.
        Cat { path: String },
    }

    fn parse_u64(s: &str) -> Result<u64, String> {
        let s = s.replace('_', "");
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        };
        parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
    }

    fn config(args: &Args) -> Result<MachineConfig> {
        let mut cfg = MachineConfig::from_env().context("invalid HOSTBRIDGE_* environment")?;
        if let Some(v) = args.ram_size {
            cfg.ram_size = v;
        }
        if let Some(v) = args.syscalls_base {
            cfg.syscalls_base = v;
        }
        if let Some(v) = args.channel_base {
            cfg.channel_base = v;
        }
        if let Some(v) = &args.terminal {
            cfg.terminal_addr = v.clone();
        }
        if args.no_telnet {
            cfg.emit_telnet_config = false;
        }
        if args.nodelay {
            cfg.tcp_nodelay = true;
        }
        cfg.validate().context("invalid machine configuration")?;
        Ok(cfg)
    }

    pub fn main() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();

        let args = Args::parse();
        let cfg = config(&args)?;

        match args.command {
            Command::Echo { count } => echo(cfg, count),
            Command::Cat { path } => cat(cfg, &path),
        }
    }

    fn echo(cfg: MachineConfig, count: Option<u64>) -> Result<()> {
        let rx = RxHandle::new();
        let producer = rx.clone();
        let terminal = SocketTerminal::start(
            cfg.terminal_addr.as_str(),
            cfg.terminal_options(),
            move |byte| producer.push_byte(byte),
        )
        .context("failed to start socket terminal")?;
        eprintln!("hostbridge: terminal listening on {}", terminal.local_addr());

        let channel = DataChannel::new(rx, Some(Box::new(terminal.sender())));
        let mut machine = Machine::with_libc_host(cfg, channel)?;
        let mut chan = GuestChannel::new(&mut machine, SCRATCH);

        let mut echoed = 0u64;
        while count.map_or(true, |n| echoed < n) {
            let byte = chan.receive(1)?;
            chan.send(&byte)?;
            echoed += 1;
        }
        tracing::info!("echoed {echoed} bytes");
        Ok(())
    }

    fn check(op: &str, path: &str, result: SyscallResult) -> Result<()> {
        if result.is_err() {
            bail!("{op} {path}: {}", io::Error::from_raw_os_error(result.errno));
        }
        Ok(())
    }

    fn cat(cfg: MachineConfig, path: &str) -> Result<()> {
        let mut machine = Machine::with_libc_host(cfg, DataChannel::new(RxHandle::new(), None))?;
        let mut sys = GuestSyscalls::new(&mut machine, SCRATCH);

        let open = sys.open(path, target::O_RDONLY, 0)?;
        check("open", path, open)?;
        let fd = open.value;

        let (st, stat) = sys.fstat(fd)?;
        check("fstat", path, st)?;
        tracing::debug!("{path}: size={} mode={:o}", stat.size, stat.mode);

        let mut out = io::stdout().lock();
        loop {
            let (read, data) = sys.read(fd, READ_CHUNK)?;
            check("read", path, read)?;
            if data.is_empty() {
                break;
            }
            out.write_all(&data).context("failed to write to stdout")?;
        }
        out.flush().context("failed to flush stdout")?;

        check("close", path, sys.close(fd)?)
    }
}
