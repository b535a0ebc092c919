use thiserror::Error;

/// Faults raised by a bridge while servicing a guest register access.
///
/// These are protocol violations, not host failures: they mean the guest firmware and the bridge
/// disagree on the register protocol and the machine cannot continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("invalid syscall: {0}")]
    InvalidCall(u32),
}
