//! Open-flag translation between the guest C runtime (newlib/ARM numbering) and the host
//! (Linux numbering).

/// One row of the translation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagMapping {
    pub name: &'static str,
    pub host: i32,
    pub target: u32,
}

const fn map(name: &'static str, host: i32, target: u32) -> FlagMapping {
    FlagMapping { name, host, target }
}

/// Guest-side `open` flag values.
pub mod target {
    pub const O_RDONLY: u32 = 0;
    pub const O_WRONLY: u32 = 1;
    pub const O_RDWR: u32 = 2;
    pub const O_APPEND: u32 = 0x0008;
    pub const O_CREAT: u32 = 0x0200;
    pub const O_TRUNC: u32 = 0x0400;
    pub const O_EXCL: u32 = 0x0800;
    pub const O_SYNC: u32 = 0x2000;
    pub const O_NONBLOCK: u32 = 0x4000;
    pub const O_NOCTTY: u32 = 0x8000;
    /// Second encoding of `O_CREAT` emitted by some guest runtimes.
    pub const O_CREAT_ALT: u32 = 0x1_0000;
    pub const O_NOFOLLOW: u32 = 0x2_0000;
    pub const O_CLOEXEC: u32 = 0x4_0000;
    pub const O_TMPFILE: u32 = 0x80_0000;
    pub const O_NOATIME: u32 = 0x100_0000;
    pub const O_PATH: u32 = 0x200_0000;
}

/// `(host, target)` pairs, applied independently: every row whose target bit is set in the guest
/// flags contributes its host bits. Several rows may share a target bit, and `O_CREAT` appears
/// under two target encodings; both rows are live.
pub const OPEN_FLAGS: &[FlagMapping] = &[
    map("O_RDONLY", 0, target::O_RDONLY),
    map("O_WRONLY", 1, target::O_WRONLY),
    map("O_RDWR", 2, target::O_RDWR),
    map("O_APPEND", 0o2000, target::O_APPEND),
    map("O_CREAT", 0o100, target::O_CREAT),
    map("O_TRUNC", 0o1000, target::O_TRUNC),
    map("O_EXCL", 0o200, target::O_EXCL),
    map("O_SYNC", 0o4010000, target::O_SYNC),
    map("O_DSYNC", 0o10000, target::O_SYNC),
    map("O_RSYNC", 0o4010000, target::O_SYNC),
    map("O_NDELAY", 0o4000, target::O_NONBLOCK),
    map("O_NONBLOCK", 0o4000, target::O_NONBLOCK),
    map("O_NOCTTY", 0o400, target::O_NOCTTY),
    map("O_CLOEXEC", 0o2000000, target::O_CLOEXEC),
    map("O_TMPFILE", 0o20200000, target::O_TMPFILE),
    map("O_NOATIME", 0o1000000, target::O_NOATIME),
    map("O_PATH", 0o10000000, target::O_PATH),
    map("O_NOFOLLOW", 0o400000, target::O_NOFOLLOW),
    map("O_CREAT", 0o100, target::O_CREAT_ALT),
];

/// Translate guest `open` flags to host flags using `table`.
pub fn translate(table: &[FlagMapping], guest_flags: u32) -> i32 {
    table
        .iter()
        .filter(|m| guest_flags & m.target != 0)
        .fold(0, |host, m| host | m.host)
}

/// Translate guest `open` flags to host flags using [`OPEN_FLAGS`].
pub fn to_host(guest_flags: u32) -> i32 {
    translate(OPEN_FLAGS, guest_flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn table_matches_linux_host_constants() {
        assert_eq!(OPEN_FLAGS[4].host, 64);
        assert_eq!(OPEN_FLAGS[3].host, 1024);
        assert_eq!(OPEN_FLAGS[7].host, 1_052_672);
        assert_eq!(OPEN_FLAGS[14].host, 4_259_840);
        assert_eq!(OPEN_FLAGS[16].host, 2_097_152);
    }

    #[test]
    fn both_creat_encodings_are_honoured() {
        assert_eq!(to_host(target::O_CREAT), 0o100);
        assert_eq!(to_host(target::O_CREAT_ALT), 0o100);
        assert_eq!(to_host(target::O_CREAT | target::O_CREAT_ALT), 0o100);
        let creat_rows = OPEN_FLAGS.iter().filter(|m| m.name == "O_CREAT").count();
        assert_eq!(creat_rows, 2);
    }

    #[test]
    fn read_only_is_zero_and_common_combinations_translate() {
        assert_eq!(to_host(target::O_RDONLY), 0);
        assert_eq!(to_host(target::O_CREAT | target::O_WRONLY), 0o100 | 1);
        assert_eq!(
            to_host(target::O_RDWR | target::O_TRUNC | target::O_APPEND),
            2 | 0o1000 | 0o2000
        );
        // The shared sync bit pulls in all three host sync encodings.
        assert_eq!(to_host(target::O_SYNC), 0o4010000 | 0o10000);
    }

    #[test]
    fn unmapped_target_bits_are_ignored() {
        assert_eq!(to_host(0x4 | 0x10 | 0x8000_0000), 0);
    }

    #[test]
    fn every_single_bit_translates_to_its_rows() {
        for bit in 0..32 {
            let flag = 1u32 << bit;
            let expected = OPEN_FLAGS
                .iter()
                .filter(|m| m.target & flag != 0)
                .fold(0, |acc, m| acc | m.host);
            assert_eq!(to_host(flag), expected, "bit {bit}");
        }
    }

    proptest! {
        #[test]
        fn translation_is_the_or_of_per_bit_translations(flags in any::<u32>()) {
            let per_bit = (0..32)
                .map(|bit| flags & (1u32 << bit))
                .filter(|&f| f != 0)
                .fold(0, |acc, f| acc | to_host(f));
            prop_assert_eq!(to_host(flags), per_bit);
        }

        #[test]
        fn translation_is_independent_of_table_order(
            flags in any::<u32>(),
            order in Just((0..OPEN_FLAGS.len()).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            let shuffled: Vec<FlagMapping> = order.iter().map(|&i| OPEN_FLAGS[i]).collect();
            prop_assert_eq!(translate(&shuffled, flags), to_host(flags));
        }
    }
}
