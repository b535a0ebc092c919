//! Byte-stream endpoints that peripherals can push bytes to.
//!
//! The receive direction is not part of the trait: backends deliver incoming bytes through a
//! callback supplied when they are started, on whatever thread the backend owns.
#![forbid(unsafe_code)]

pub mod socket;

pub use socket::{SocketTerminal, TerminalError, TerminalOptions, TerminalSender};

use std::sync::{Arc, Mutex};

/// Outbound half of a byte stream.
pub trait ByteStreamEndpoint: Send {
    /// Send a single guest-to-host byte.
    fn send_byte(&mut self, byte: u8);
}

impl<T: ByteStreamEndpoint + ?Sized> ByteStreamEndpoint for Box<T> {
    fn send_byte(&mut self, byte: u8) {
        <T as ByteStreamEndpoint>::send_byte(&mut **self, byte);
    }
}

impl<T: ByteStreamEndpoint + ?Sized> ByteStreamEndpoint for &mut T {
    fn send_byte(&mut self, byte: u8) {
        <T as ByteStreamEndpoint>::send_byte(&mut **self, byte);
    }
}

impl<B: ByteStreamEndpoint> ByteStreamEndpoint for Option<B> {
    fn send_byte(&mut self, byte: u8) {
        if let Some(endpoint) = self.as_mut() {
            endpoint.send_byte(byte);
        }
    }
}

impl ByteStreamEndpoint for () {
    fn send_byte(&mut self, _byte: u8) {}
}

/// Collects every byte; handy as a capture sink.
impl ByteStreamEndpoint for Vec<u8> {
    fn send_byte(&mut self, byte: u8) {
        self.push(byte);
    }
}

impl<T: ByteStreamEndpoint + ?Sized> ByteStreamEndpoint for Arc<Mutex<T>> {
    fn send_byte(&mut self, byte: u8) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .send_byte(byte);
    }
}
