mod common;

use common::{FakeHost, HostCall};
use hostbridge_devices::oflag::target;
use hostbridge_devices::syscalls::{regs, Call};
use hostbridge_devices::{BridgeError, MmioDevice, SyscallBridge};
use hostbridge_host_io::{Errno, HostStat, Timespec};
use memory::{GuestRam, MemoryBus};

const BUF: u32 = 0x100;
const FAILED: u32 = u32::MAX;

fn setup() -> (SyscallBridge<FakeHost>, GuestRam) {
    (
        SyscallBridge::new(FakeHost::default()),
        GuestRam::new(0x1000).unwrap(),
    )
}

fn set(bridge: &mut SyscallBridge<FakeHost>, ram: &mut GuestRam, offset: u64, value: u32) {
    bridge.mmio_write(ram, offset, value).unwrap();
}

fn call(bridge: &mut SyscallBridge<FakeHost>, ram: &mut GuestRam, call: Call) {
    bridge.mmio_write(ram, regs::CALL, call as u32).unwrap();
}

#[test]
fn register_layout_is_fixed() {
    assert_eq!(regs::POSITION, 0x28);
    assert_eq!(regs::ST_DEV, 0x2C);
    assert_eq!(regs::ST_SIZE, 0x44);
    assert_eq!(regs::ST_ATIM, 0x54);
    assert_eq!(regs::ST_CTIM_NS, 0x68);
    assert_eq!(regs::WINDOW_LEN, 0x6C);
}

#[test]
fn open_reads_path_up_to_nul_and_translates_flags() {
    let (mut bridge, mut ram) = setup();
    bridge.host_mut().open = Ok(7);
    ram.write_physical(u64::from(BUF), b"/tmp/x\0junk");

    set(&mut bridge, &mut ram, regs::BUFFER, BUF);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 11);
    set(&mut bridge, &mut ram, regs::OFLAG, target::O_CREAT | target::O_WRONLY);
    set(&mut bridge, &mut ram, regs::PMODE, 0o644);
    call(&mut bridge, &mut ram, Call::Open);

    assert_eq!(
        bridge.host_mut().calls,
        vec![HostCall::Open {
            path: b"/tmp/x".to_vec(),
            flags: 0o100 | 1,
            mode: 0o644,
        }]
    );
    assert_eq!(bridge.reg(regs::FD), 7);
    assert_eq!(bridge.reg(regs::ERRNO), 0);
    assert_eq!(bridge.reg(regs::CALL), Call::Done as u32);
}

#[test]
fn open_failure_stores_minus_one_and_errno() {
    let (mut bridge, mut ram) = setup();
    bridge.host_mut().open = Err(Errno(2));
    ram.write_physical(u64::from(BUF), b"missing");
    set(&mut bridge, &mut ram, regs::BUFFER, BUF);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 7);
    call(&mut bridge, &mut ram, Call::Open);

    assert_eq!(bridge.reg(regs::FD), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), 2);
    assert_eq!(bridge.reg(regs::CALL), Call::Done as u32);
}

#[test]
fn errno_is_cleared_by_the_next_call() {
    let (mut bridge, mut ram) = setup();
    bridge.host_mut().close = Err(Errno(9));
    set(&mut bridge, &mut ram, regs::FD, 4);
    call(&mut bridge, &mut ram, Call::Close);
    assert_eq!(bridge.reg(regs::STATUS), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), 9);

    bridge.host_mut().close = Ok(0);
    call(&mut bridge, &mut ram, Call::Close);
    assert_eq!(bridge.reg(regs::STATUS), 0);
    assert_eq!(bridge.reg(regs::ERRNO), 0);
}

#[test]
fn write_copies_guest_bytes() {
    let (mut bridge, mut ram) = setup();
    ram.write_physical(u64::from(BUF), b"hello");
    set(&mut bridge, &mut ram, regs::FD, 3);
    set(&mut bridge, &mut ram, regs::BUFFER, BUF);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 5);
    call(&mut bridge, &mut ram, Call::Write);

    assert_eq!(
        bridge.host_mut().calls,
        vec![HostCall::Write {
            fd: 3,
            data: b"hello".to_vec()
        }]
    );
    assert_eq!(bridge.reg(regs::STATUS), 5);
}

#[test]
fn short_read_writes_only_returned_bytes() {
    let (mut bridge, mut ram) = setup();
    bridge.host_mut().read = Ok(b"abc".to_vec());
    ram.as_mut_slice()[BUF as usize..BUF as usize + 8].fill(0xEE);

    set(&mut bridge, &mut ram, regs::FD, 3);
    set(&mut bridge, &mut ram, regs::BUFFER, BUF);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 8);
    call(&mut bridge, &mut ram, Call::Read);

    assert_eq!(bridge.reg(regs::STATUS), 3);
    assert_eq!(
        &ram.as_slice()[BUF as usize..BUF as usize + 8],
        &[b'a', b'b', b'c', 0xEE, 0xEE, 0xEE, 0xEE, 0xEE]
    );
    assert_eq!(
        bridge.host_mut().calls,
        vec![HostCall::Read { fd: 3, len: 8 }]
    );
}

#[test]
fn failed_read_leaves_guest_memory_untouched() {
    let (mut bridge, mut ram) = setup();
    bridge.host_mut().read = Err(Errno(9));
    ram.as_mut_slice()[BUF as usize..BUF as usize + 4].fill(0xEE);

    set(&mut bridge, &mut ram, regs::BUFFER, BUF);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 4);
    call(&mut bridge, &mut ram, Call::Read);

    assert_eq!(bridge.reg(regs::STATUS), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), 9);
    assert_eq!(&ram.as_slice()[BUF as usize..BUF as usize + 4], &[0xEE; 4]);
}

#[test]
fn lseek_sign_extends_offset_and_truncates_position() {
    let (mut bridge, mut ram) = setup();
    bridge.host_mut().lseek = Ok(0x1_0000_0005);
    set(&mut bridge, &mut ram, regs::FD, 3);
    set(&mut bridge, &mut ram, regs::OFFSET, (-4i32) as u32);
    set(&mut bridge, &mut ram, regs::ORIGIN, 2);
    call(&mut bridge, &mut ram, Call::Lseek);

    assert_eq!(
        bridge.host_mut().calls,
        vec![HostCall::Lseek {
            fd: 3,
            offset: -4,
            whence: 2
        }]
    );
    assert_eq!(bridge.reg(regs::POSITION), 5);

    bridge.host_mut().lseek = Err(Errno(22));
    call(&mut bridge, &mut ram, Call::Lseek);
    assert_eq!(bridge.reg(regs::POSITION), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), 22);
}

#[test]
fn fstat_flattens_every_field_in_register_order() {
    let (mut bridge, mut ram) = setup();
    bridge.host_mut().fstat = Ok(HostStat {
        dev: 0x1_0000_0001,
        ino: 2,
        mode: 0o100644,
        nlink: 4,
        uid: 5,
        gid: 6,
        size: 0x2_0000_0007,
        rdev: 8,
        blksize: 9,
        blocks: 10,
        atime: Timespec { sec: 11, nsec: 14 },
        mtime: Timespec { sec: 12, nsec: 15 },
        ctime: Timespec {
            sec: 0x7_0000_000D,
            nsec: 16,
        },
    });
    set(&mut bridge, &mut ram, regs::FD, 3);
    call(&mut bridge, &mut ram, Call::Fstat);

    assert_eq!(bridge.reg(regs::STATUS), 0);
    assert_eq!(
        bridge.stat_regs(),
        [1, 2, 0o100644, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]
    );
    assert_eq!(bridge.reg(regs::ST_SIZE), 7);
    assert_eq!(bridge.reg(regs::ST_MTIM_NS), 15);
}

#[test]
fn failed_fstat_zeroes_the_record() {
    let (mut bridge, mut ram) = setup();
    set(&mut bridge, &mut ram, regs::ST_SIZE, 0xAAAA);
    bridge.host_mut().fstat = Err(Errno(9));
    call(&mut bridge, &mut ram, Call::Fstat);

    assert_eq!(bridge.reg(regs::STATUS), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), 9);
    assert_eq!(bridge.stat_regs(), [0; 16]);
}

#[test]
fn isatty_passes_a_narrow_descriptor() {
    let (mut bridge, mut ram) = setup();
    set(&mut bridge, &mut ram, regs::FD, 0x0001_0003);
    call(&mut bridge, &mut ram, Call::Isatty);
    assert_eq!(bridge.host_mut().calls, vec![HostCall::Isatty(3)]);
    assert_eq!(bridge.reg(regs::STATUS), 1);

    bridge.host_mut().isatty = Err(Errno(25));
    call(&mut bridge, &mut ram, Call::Isatty);
    assert_eq!(bridge.reg(regs::STATUS), 0);
    assert_eq!(bridge.reg(regs::ERRNO), 25);
}

#[test]
fn chdir_uses_the_guest_path() {
    let (mut bridge, mut ram) = setup();
    ram.write_physical(u64::from(BUF), b"/var\0");
    set(&mut bridge, &mut ram, regs::BUFFER, BUF);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 5);
    call(&mut bridge, &mut ram, Call::Chdir);
    assert_eq!(bridge.host_mut().calls, vec![HostCall::Chdir(b"/var".to_vec())]);
    assert_eq!(bridge.reg(regs::STATUS), 0);

    bridge.host_mut().chdir = Err(Errno(2));
    call(&mut bridge, &mut ram, Call::Chdir);
    assert_eq!(bridge.reg(regs::STATUS), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), 2);
}

#[test]
fn unknown_call_kinds_are_faults() {
    let (mut bridge, mut ram) = setup();
    assert_eq!(
        bridge.mmio_write(&mut ram, regs::CALL, 9),
        Err(BridgeError::InvalidCall(9))
    );
    assert_eq!(bridge.reg(regs::CALL), 9);

    assert_eq!(
        bridge.mmio_write(&mut ram, regs::CALL, Call::Done as u32),
        Err(BridgeError::InvalidCall(0))
    );
    assert!(bridge.host_mut().calls.is_empty());
}

#[test]
fn reset_clears_every_register() {
    let (mut bridge, mut ram) = setup();
    set(&mut bridge, &mut ram, regs::FD, 3);
    set(&mut bridge, &mut ram, regs::ST_BLOCKS, 3);
    bridge.host_mut().close = Err(Errno(9));
    call(&mut bridge, &mut ram, Call::Close);

    bridge.reset();
    for offset in (0..regs::WINDOW_LEN).step_by(4) {
        assert_eq!(bridge.mmio_read(&mut ram, offset), 0, "offset {offset:#x}");
    }
}

#[test]
fn unknown_offsets_read_zero_and_ignore_writes() {
    let (mut bridge, mut ram) = setup();
    set(&mut bridge, &mut ram, 0x6C, 0x1234);
    set(&mut bridge, &mut ram, 0x06, 0x1234);
    assert_eq!(bridge.mmio_read(&mut ram, 0x6C), 0);
    assert_eq!(bridge.reg(regs::FD), 0);
}

#[test]
fn write_with_a_buffer_past_guest_memory_fails_with_efault() {
    let mut bridge = SyscallBridge::new(FakeHost::default());
    let mut ram = GuestRam::new(0x100).unwrap();
    set(&mut bridge, &mut ram, regs::FD, 1);
    set(&mut bridge, &mut ram, regs::BUFFER, 0x10);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, u32::MAX);
    call(&mut bridge, &mut ram, Call::Write);

    assert_eq!(bridge.reg(regs::STATUS), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), Errno::EFAULT.raw() as u32);
    assert_eq!(bridge.reg(regs::CALL), Call::Done as u32);
    assert!(bridge.host_mut().calls.is_empty());
}

#[test]
fn read_into_a_buffer_past_guest_memory_fails_with_efault() {
    let mut bridge = SyscallBridge::new(FakeHost::default());
    bridge.host_mut().read = Ok(b"data".to_vec());
    let mut ram = GuestRam::new(0x100).unwrap();
    set(&mut bridge, &mut ram, regs::BUFFER, 0xF0);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 0x20);
    call(&mut bridge, &mut ram, Call::Read);

    assert_eq!(bridge.reg(regs::STATUS), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), Errno::EFAULT.raw() as u32);
    assert!(bridge.host_mut().calls.is_empty());
    assert_eq!(&ram.as_slice()[0xF0..], &[0u8; 0x10]);
}

#[test]
fn open_and_chdir_with_unbacked_paths_fail_with_efault() {
    let (mut bridge, mut ram) = setup();
    set(&mut bridge, &mut ram, regs::BUFFER, 0xFFF);
    set(&mut bridge, &mut ram, regs::BUFFER_SIZE, 0x8000_0000);
    call(&mut bridge, &mut ram, Call::Open);
    assert_eq!(bridge.reg(regs::FD), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), Errno::EFAULT.raw() as u32);

    call(&mut bridge, &mut ram, Call::Chdir);
    assert_eq!(bridge.reg(regs::STATUS), FAILED);
    assert_eq!(bridge.reg(regs::ERRNO), Errno::EFAULT.raw() as u32);
    assert!(bridge.host_mut().calls.is_empty());
}
