//! RC4 keystream used for both directions of an authenticated link.
//!
//! Each direction owns its own [`CipherState`], keyed with the same session
//! key and primed by discarding [`PRIMING_LEN`] keystream bytes. The state is
//! advanced by every byte that passes through it, so the two ends stay in
//! step only while every line is processed exactly once and in order.

use crate::error::session::SessionError;

use std::fmt;

use zeroize::Zeroize;

/// Keystream bytes discarded after key scheduling.
pub const PRIMING_LEN: usize = 1024;

const STATE_LEN: usize = 256;

pub struct CipherState {
    perm: [u8; STATE_LEN],
    i: u8,
    j: u8,
}

impl CipherState {
    /// Runs key scheduling only. Rejects an empty key.
    #[track_caller]
    pub fn new(key: &[u8]) -> Result<Self, SessionError> {
        if key.is_empty() {
            return Err(SessionError::handshake("Cipher key must not be empty"));
        }

        let mut perm = [0u8; STATE_LEN];
        for (index, slot) in perm.iter_mut().enumerate() {
            *slot = index as u8;
        }

        let mut j: u8 = 0;
        for i in 0..STATE_LEN {
            j = j.wrapping_add(perm[i]).wrapping_add(key[i % key.len()]);
            perm.swap(i, j as usize);
        }

        Ok(Self { perm, i: 0, j: 0 })
    }

    /// Key scheduling followed by the standard priming discard.
    #[track_caller]
    pub fn primed(key: &[u8]) -> Result<Self, SessionError> {
        let mut state = Self::new(key)?;
        state.discard(PRIMING_LEN);
        Ok(state)
    }

    /// Advances the keystream by `count` bytes without producing output.
    pub fn discard(&mut self, count: usize) {
        for _ in 0..count {
            self.next_byte();
        }
    }

    /// XORs `data` in place with the next `data.len()` keystream bytes.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }

    pub fn apply_to_vec(&mut self, data: &[u8]) -> Vec<u8> {
        let mut output = data.to_vec();
        self.apply(&mut output);
        output
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.perm[self.i as usize]);
        self.perm.swap(self.i as usize, self.j as usize);
        let index = self.perm[self.i as usize].wrapping_add(self.perm[self.j as usize]);
        self.perm[index as usize]
    }

    #[cfg(test)]
    pub(crate) fn permutation(&self) -> &[u8; STATE_LEN] {
        &self.perm
    }
}

impl fmt::Debug for CipherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherState").finish_non_exhaustive()
    }
}

impl Drop for CipherState {
    fn drop(&mut self) {
        self.perm.zeroize();
        self.i.zeroize();
        self.j.zeroize();
    }
}
