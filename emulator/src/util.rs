//! Little-endian helpers over raw byte buffers.

use crate::constants::{Address, Word};

/// Reinterpret a word as an address, keeping its bits
#[must_use]
pub const fn as_address(word: Word) -> Address {
    Address::from_le_bytes(word.to_le_bytes())
}

/// Reinterpret an address as a word, keeping its bits
#[must_use]
pub const fn as_word(address: Address) -> Word {
    Word::from_le_bytes(address.to_le_bytes())
}

/// Read a 4-byte little-endian word at `index`.
///
/// Returns `None` if the span `[index, index + 4)` does not fit in the buffer.
#[must_use]
pub fn read_word(data: &[u8], index: usize) -> Option<Word> {
    let end = index.checked_add(4)?;
    let bytes: [u8; 4] = data.get(index..end)?.try_into().ok()?;
    Some(Word::from_le_bytes(bytes))
}

/// Write a 4-byte little-endian word at `index`.
///
/// Returns `false` and leaves the buffer untouched if the span does not fit.
pub fn write_word(data: &mut [u8], index: usize, value: Word) -> bool {
    let Some(end) = index.checked_add(4) else {
        return false;
    };

    match data.get_mut(index..end) {
        Some(span) => {
            span.copy_from_slice(&value.to_le_bytes());
            true
        }
        None => false,
    }
}
